//! Conditional-access policy checkers

use async_trait::async_trait;
use maes_common::ControlDefinition;
use maes_graph::GraphApi;
use serde_json::{json, Value};

use super::collection;
use crate::checker::{Checker, CheckerError, CheckerOutcome};

fn string_list(v: &Value) -> Vec<&str> {
    v.as_array()
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn policy_summary(policies: &[Value]) -> Value {
    json!(policies
        .iter()
        .map(|p| json!({
            "displayName": p["displayName"],
            "state": p["state"],
        }))
        .collect::<Vec<_>>())
}

/// An enabled policy must require MFA for all users on all applications.
pub struct CaMfaAllUsersChecker;

#[async_trait]
impl Checker for CaMfaAllUsersChecker {
    fn key(&self) -> &'static str {
        "entra.ca_mfa_all_users"
    }

    async fn evaluate(
        &self,
        graph: &dyn GraphApi,
        _control: &ControlDefinition,
    ) -> Result<CheckerOutcome, CheckerError> {
        let response = graph.get("identity/conditionalAccess/policies").await?;
        let policies = collection(&response);

        let satisfying = policies.iter().find(|p| {
            let enabled = p["state"].as_str() == Some("enabled");
            let requires_mfa =
                string_list(&p["grantControls"]["builtInControls"]).contains(&"mfa");
            let all_users =
                string_list(&p["conditions"]["users"]["includeUsers"]).contains(&"All");
            let apps = &p["conditions"]["applications"]["includeApplications"];
            let all_apps = apps.is_null() || string_list(apps).contains(&"All");
            enabled && requires_mfa && all_users && all_apps
        });

        let evidence = json!({ "policies": policy_summary(policies) });
        match satisfying {
            Some(p) => Ok(CheckerOutcome::compliant(
                json!({ "policy": p["displayName"] }),
                evidence,
            )),
            None => Ok(CheckerOutcome::non_compliant(
                0.0,
                json!({ "policiesEvaluated": policies.len() }),
                evidence,
            )),
        }
    }
}

/// An enabled policy must block legacy authentication clients.
pub struct CaBlockLegacyAuthChecker;

#[async_trait]
impl Checker for CaBlockLegacyAuthChecker {
    fn key(&self) -> &'static str {
        "entra.ca_block_legacy_auth"
    }

    async fn evaluate(
        &self,
        graph: &dyn GraphApi,
        _control: &ControlDefinition,
    ) -> Result<CheckerOutcome, CheckerError> {
        let response = graph.get("identity/conditionalAccess/policies").await?;
        let policies = collection(&response);

        let satisfying = policies.iter().find(|p| {
            let enabled = p["state"].as_str() == Some("enabled");
            let blocks = string_list(&p["grantControls"]["builtInControls"]).contains(&"block");
            let client_types = string_list(&p["conditions"]["clientAppTypes"]);
            let legacy = client_types.contains(&"exchangeActiveSync")
                && client_types.contains(&"other");
            enabled && blocks && legacy
        });

        let evidence = json!({ "policies": policy_summary(policies) });
        match satisfying {
            Some(p) => Ok(CheckerOutcome::compliant(
                json!({ "policy": p["displayName"] }),
                evidence,
            )),
            None => Ok(CheckerOutcome::non_compliant(
                0.0,
                json!({ "policiesEvaluated": policies.len() }),
                evidence,
            )),
        }
    }
}
