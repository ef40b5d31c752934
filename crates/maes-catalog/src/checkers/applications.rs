//! Application registration checkers

use async_trait::async_trait;
use maes_common::ControlDefinition;
use maes_graph::GraphApi;
use serde_json::{json, Value};

use super::collection;
use crate::checker::{Checker, CheckerError, CheckerOutcome};

/// Registered applications holding app-only (Role) permissions need a
/// human decision on whether the grant is justified, so a hit maps to
/// manual review rather than non-compliance.
pub struct AppPermissionReviewChecker;

fn has_role_grants(app: &Value) -> bool {
    app["requiredResourceAccess"]
        .as_array()
        .map(|resources| {
            resources.iter().any(|r| {
                r["resourceAccess"]
                    .as_array()
                    .map(|grants| grants.iter().any(|g| g["type"].as_str() == Some("Role")))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

#[async_trait]
impl Checker for AppPermissionReviewChecker {
    fn key(&self) -> &'static str {
        "entra.app_permission_review"
    }

    async fn evaluate(
        &self,
        graph: &dyn GraphApi,
        _control: &ControlDefinition,
    ) -> Result<CheckerOutcome, CheckerError> {
        let response = graph
            .get("applications?$select=id,displayName,createdDateTime,requiredResourceAccess")
            .await?;
        let apps = collection(&response);

        let privileged: Vec<Value> = apps
            .iter()
            .filter(|a| has_role_grants(a))
            .map(|a| json!({ "id": a["id"], "displayName": a["displayName"] }))
            .collect();

        if privileged.is_empty() {
            return Ok(CheckerOutcome::compliant(
                json!({ "applications": apps.len(), "withAppOnlyPermissions": 0 }),
                json!({ "applications": [] }),
            ));
        }

        Ok(CheckerOutcome::manual_review(format!(
            "{} application(s) hold app-only permissions; review each grant",
            privileged.len()
        ))
        .with_actual(json!({
            "applications": apps.len(),
            "withAppOnlyPermissions": privileged.len(),
        }))
        .with_evidence(json!({ "applications": privileged })))
    }
}
