//! Built-in CIS Microsoft 365 benchmark definitions
//!
//! Shipped as code; the catalog is read-only at runtime and updated only
//! through releases.

use maes_common::{Benchmark, ControlDefinition, Severity};
use serde_json::{json, Value};

#[allow(clippy::too_many_arguments)]
fn control(
    benchmark: Benchmark,
    id: &str,
    section: &str,
    title: &str,
    description: &str,
    rationale: &str,
    remediation: &str,
    severity: Severity,
    weight: f64,
    expected: Value,
    checker_key: &str,
) -> ControlDefinition {
    ControlDefinition {
        id: id.into(),
        benchmark,
        section: section.into(),
        title: title.into(),
        description: description.into(),
        rationale: rationale.into(),
        remediation: remediation.into(),
        severity,
        weight,
        expected,
        checker_key: checker_key.into(),
        active: true,
    }
}

/// CIS Microsoft 365 Foundations v4.0.0 controls.
pub fn cis_v4() -> Vec<ControlDefinition> {
    vec![
        control(
            Benchmark::CisV4,
            "1.1.1",
            "1.1 Users with Administrative Roles",
            "Ensure multifactor authentication is enabled for all users in administrative roles",
            "Require a second authentication factor for every member of the Global Administrator role.",
            "Administrative accounts are the highest-value target in the tenant; a stolen password alone must not grant access.",
            "Register a Microsoft Authenticator, FIDO2 key or Windows Hello method for every global administrator, then enforce MFA via conditional access.",
            Severity::Level2,
            1.0,
            json!({ "allAdminsWithMfa": true }),
            "entra.global_admin_mfa",
        ),
        control(
            Benchmark::CisV4,
            "1.1.3",
            "1.1 Users with Administrative Roles",
            "Ensure that between two and four global admins are designated",
            "Keep the Global Administrator role populated by at least two and at most four accounts.",
            "A single admin is a lockout risk; a large set widens the attack surface.",
            "Review the Global Administrator membership and reduce or extend it into the two-to-four range.",
            Severity::Level1,
            1.0,
            json!({ "min": 2, "max": 4 }),
            "entra.global_admin_count",
        ),
        control(
            Benchmark::CisV4,
            "1.2.1",
            "1.2 Conditional Access",
            "Ensure a conditional access policy requires MFA for all users",
            "An enabled conditional access policy must require multifactor authentication for all users on all cloud applications.",
            "Per-user MFA settings are legacy and bypassable; conditional access is the supported enforcement point.",
            "Create a conditional access policy targeting all users and all applications with the 'Require multifactor authentication' grant.",
            Severity::Level1,
            1.0,
            json!({ "policyPresent": true }),
            "entra.ca_mfa_all_users",
        ),
        control(
            Benchmark::CisV4,
            "1.2.2",
            "1.2 Conditional Access",
            "Ensure legacy authentication protocols are blocked",
            "An enabled conditional access policy must block Exchange ActiveSync and other legacy authentication clients.",
            "Legacy protocols cannot perform MFA and are the dominant vector for password-spray attacks.",
            "Create a conditional access policy over client app types 'Exchange ActiveSync clients' and 'Other clients' with the Block grant.",
            Severity::Level1,
            1.0,
            json!({ "legacyAuthBlocked": true }),
            "entra.ca_block_legacy_auth",
        ),
        control(
            Benchmark::CisV4,
            "2.1.1",
            "2.1 Application Registrations",
            "Ensure application registrations with app-only permissions are reviewed",
            "Registered applications holding application (app-only) Graph permissions must be inventoried and justified.",
            "App-only permissions act without a signed-in user and outlive credential resets.",
            "Review each listed application's requiredResourceAccess and remove grants without a documented owner.",
            Severity::Level1,
            0.5,
            json!({ "unreviewedAppOnlyGrants": 0 }),
            "entra.app_permission_review",
        ),
        control(
            Benchmark::CisV4,
            "5.1.1",
            "5.1 Exchange Online Auditing",
            "Ensure mailbox auditing is enabled for all users",
            "Mailbox auditing must be enabled organization-wide so mailbox actions are recorded.",
            "Without mailbox audit records, business email compromise cannot be reconstructed.",
            "Run Set-OrganizationConfig -AuditDisabled $false and verify per-mailbox overrides.",
            Severity::Level1,
            1.0,
            json!({ "auditDisabled": false }),
            "exchange.mailbox_auditing",
        ),
        control(
            Benchmark::CisV4,
            "8.2.2",
            "8.2 Teams External Access",
            "Ensure external domains in Teams are restricted to an allow list",
            "External federation in Teams must be limited to explicitly allowed domains.",
            "Open federation enables phishing and data exfiltration through chat with arbitrary tenants.",
            "In the Teams admin center, set external access to 'Allow only specific external domains'.",
            Severity::Level1,
            0.5,
            json!({ "externalAccessRestricted": true }),
            "teams.external_access",
        ),
    ]
}

/// CIS Microsoft 365 Foundations v3.0.0 controls.
///
/// The v3 listing is the subset that survived into v4 unchanged, kept for
/// tenants still tracking the older benchmark.
pub fn cis_v3() -> Vec<ControlDefinition> {
    cis_v4()
        .into_iter()
        .filter(|c| c.id != "2.1.1")
        .map(|mut c| {
            c.benchmark = Benchmark::CisV3;
            c
        })
        .collect()
}
