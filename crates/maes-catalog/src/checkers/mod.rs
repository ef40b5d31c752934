//! Built-in checkers

pub mod applications;
pub mod conditional_access;
pub mod entra;

use std::sync::Arc;

use crate::checker::Checker;

/// Every built-in checker, ready for registration.
pub fn builtins() -> Vec<Arc<dyn Checker>> {
    vec![
        Arc::new(entra::GlobalAdminMfaChecker),
        Arc::new(entra::GlobalAdminCountChecker),
        Arc::new(conditional_access::CaMfaAllUsersChecker),
        Arc::new(conditional_access::CaBlockLegacyAuthChecker),
        Arc::new(applications::AppPermissionReviewChecker),
    ]
}

/// The `value` array of a Graph collection response.
pub(crate) fn collection(response: &serde_json::Value) -> &[serde_json::Value] {
    response["value"].as_array().map(Vec::as_slice).unwrap_or(&[])
}
