//! Flat CSV export, RFC 4180 quoting

use crate::model::ReportModel;

/// Fixed header row.
pub const HEADER: &str =
    "Control ID,Section,Title,Severity,Weight,Status,Score,Remediation,Error,CheckedAt";

/// Quote a field when it carries a comma, quote or line break.
pub fn field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

/// One data row per control result.
pub fn render(model: &ReportModel) -> Vec<u8> {
    let mut out = String::with_capacity(256 + model.entries.len() * 128);
    out.push_str(HEADER);
    out.push_str("\r\n");
    for entry in &model.entries {
        let row = [
            field(&entry.control_id),
            field(&entry.section),
            field(&entry.title),
            field(entry.severity.as_str()),
            format!("{}", entry.weight),
            field(entry.status.as_str()),
            format!("{:.2}", entry.score),
            field(entry.remediation.as_deref().unwrap_or("")),
            field(entry.error_message.as_deref().unwrap_or("")),
            entry.checked_at.to_rfc3339(),
        ];
        out.push_str(&row.join(","));
        out.push_str("\r\n");
    }
    out.into_bytes()
}
