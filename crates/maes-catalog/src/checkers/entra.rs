//! Administrative-role checkers

use async_trait::async_trait;
use maes_common::scoring::round2;
use maes_common::ControlDefinition;
use maes_graph::GraphApi;
use serde_json::{json, Value};

use super::collection;
use crate::checker::{Checker, CheckerError, CheckerOutcome};

/// Role template id of Global Administrator.
const GLOBAL_ADMIN_TEMPLATE: &str = "62e90394-69f5-4237-9190-012177145e10";

/// Authentication method types that count as a second factor.
const STRONG_METHODS: &[&str] = &[
    "#microsoft.graph.microsoftAuthenticatorAuthenticationMethod",
    "#microsoft.graph.fido2AuthenticationMethod",
    "#microsoft.graph.windowsHelloForBusinessAuthenticationMethod",
    "#microsoft.graph.phoneAuthenticationMethod",
    "#microsoft.graph.softwareOathAuthenticationMethod",
];

/// Global Administrator members with id and display name.
async fn global_admins(graph: &dyn GraphApi) -> Result<Option<Vec<(String, String)>>, CheckerError> {
    let roles = graph.get("directoryRoles").await?;
    let role = collection(&roles).iter().find(|r| {
        r["roleTemplateId"].as_str() == Some(GLOBAL_ADMIN_TEMPLATE)
            || r["displayName"].as_str() == Some("Global Administrator")
    });
    let Some(role) = role else {
        return Ok(None);
    };
    let role_id = role["id"]
        .as_str()
        .ok_or_else(|| CheckerError::Other("directory role without id".into()))?;

    let members = graph.get(&format!("directoryRoles/{role_id}/members")).await?;
    let admins = collection(&members)
        .iter()
        .filter(|m| {
            // Service principals can hold the role; only users carry MFA state.
            m["@odata.type"]
                .as_str()
                .map(|t| t == "#microsoft.graph.user")
                .unwrap_or(true)
        })
        .filter_map(|m| {
            let id = m["id"].as_str()?;
            let name = m["displayName"].as_str().unwrap_or(id);
            Some((id.to_string(), name.to_string()))
        })
        .collect();
    Ok(Some(admins))
}

/// Every Global Administrator must hold a strong authentication method.
pub struct GlobalAdminMfaChecker;

#[async_trait]
impl Checker for GlobalAdminMfaChecker {
    fn key(&self) -> &'static str {
        "entra.global_admin_mfa"
    }

    async fn evaluate(
        &self,
        graph: &dyn GraphApi,
        _control: &ControlDefinition,
    ) -> Result<CheckerOutcome, CheckerError> {
        let Some(admins) = global_admins(graph).await? else {
            return Ok(CheckerOutcome::not_applicable(
                "global administrator role is not activated",
            ));
        };
        if admins.is_empty() {
            return Ok(CheckerOutcome::not_applicable(
                "no global administrators to evaluate",
            ));
        }

        let mut covered = 0usize;
        let mut evidence = Vec::new();
        for (id, name) in &admins {
            let methods = graph
                .get(&format!("users/{id}/authentication/methods"))
                .await?;
            let strong = collection(&methods).iter().any(|m| {
                m["@odata.type"]
                    .as_str()
                    .map(|t| STRONG_METHODS.contains(&t))
                    .unwrap_or(false)
            });
            if strong {
                covered += 1;
            }
            evidence.push(json!({ "id": id, "displayName": name, "mfa": strong }));
        }

        let total = admins.len();
        let actual = json!({ "totalAdmins": total, "withMfa": covered });
        let evidence = json!({ "admins": evidence });
        if covered == total {
            Ok(CheckerOutcome::compliant(actual, evidence))
        } else {
            let score = round2(100.0 * covered as f64 / total as f64);
            Ok(CheckerOutcome::non_compliant(score, actual, evidence))
        }
    }
}

/// Between two and four Global Administrators should be designated.
pub struct GlobalAdminCountChecker;

#[async_trait]
impl Checker for GlobalAdminCountChecker {
    fn key(&self) -> &'static str {
        "entra.global_admin_count"
    }

    async fn evaluate(
        &self,
        graph: &dyn GraphApi,
        control: &ControlDefinition,
    ) -> Result<CheckerOutcome, CheckerError> {
        let Some(admins) = global_admins(graph).await? else {
            return Ok(CheckerOutcome::not_applicable(
                "global administrator role is not activated",
            ));
        };

        let min = control.expected["min"].as_u64().unwrap_or(2) as usize;
        let max = control.expected["max"].as_u64().unwrap_or(4) as usize;
        let count = admins.len();
        let actual = json!({ "count": count, "min": min, "max": max });
        let evidence = json!({
            "admins": admins.iter().map(|(id, name)| json!({"id": id, "displayName": name})).collect::<Vec<_>>(),
        });

        if (min..=max).contains(&count) {
            Ok(CheckerOutcome::compliant(actual, evidence))
        } else {
            Ok(CheckerOutcome::non_compliant(0.0, actual, evidence))
        }
    }
}
