//! Capability probing against a fresh client

use serde::{Deserialize, Serialize};

use crate::client::GraphApi;

/// Outcome of one probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub name: String,
    pub ok: bool,
    pub error: Option<String>,
}

/// Aggregated capability report recorded on the assessment's parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityReport {
    /// True iff at least two probes succeeded
    pub success: bool,
    pub probes: Vec<ProbeOutcome>,
}

impl CapabilityReport {
    pub fn succeeded(&self) -> usize {
        self.probes.iter().filter(|p| p.ok).count()
    }
}

fn outcome(name: &str, result: Result<serde_json::Value, crate::GraphError>) -> ProbeOutcome {
    match result {
        Ok(_) => ProbeOutcome { name: name.to_string(), ok: true, error: None },
        Err(e) => ProbeOutcome { name: name.to_string(), ok: false, error: Some(e.to_string()) },
    }
}

/// Run the four independent capability probes.
///
/// Probe failures are captured per probe and never propagated; the report
/// is successful when at least two probes pass.
pub async fn test_connection(graph: &dyn GraphApi) -> CapabilityReport {
    let (organization, users, ca_policies, roles) = tokio::join!(
        graph.get("organization"),
        graph.get("users?$select=id,displayName&$top=1"),
        graph.get("identity/conditionalAccess/policies"),
        graph.get("directoryRoles"),
    );

    let probes = vec![
        outcome("organization", organization),
        outcome("users", users),
        outcome("conditionalAccessPolicies", ca_policies),
        outcome("directoryRoles", roles),
    ];
    let success = probes.iter().filter(|p| p.ok).count() >= 2;
    CapabilityReport { success, probes }
}
