//! Self-contained HTML report

use maes_common::{ControlStatus, ReportKind};
use std::fmt::Write;

use crate::model::ReportModel;

const STYLE: &str = "\
body{font-family:'Segoe UI',Arial,sans-serif;margin:0;background:#f4f6f8;color:#1f2933}\
.wrap{max-width:1080px;margin:0 auto;padding:24px}\
header{background:#102a43;color:#fff;padding:24px;border-radius:8px}\
header h1{margin:0 0 4px;font-size:22px}\
header .meta{color:#bcccdc;font-size:13px}\
.cards{display:flex;gap:16px;margin:24px 0;flex-wrap:wrap}\
.card{flex:1;min-width:150px;background:#fff;border-radius:8px;padding:16px;box-shadow:0 1px 3px rgba(0,0,0,.1)}\
.card .value{font-size:28px;font-weight:600}\
.card .label{color:#627d98;font-size:12px;text-transform:uppercase}\
table{width:100%;border-collapse:collapse;background:#fff;border-radius:8px;overflow:hidden}\
th{background:#243b53;color:#fff;text-align:left;padding:8px 12px;font-size:13px}\
td{padding:8px 12px;border-bottom:1px solid #e4e7eb;font-size:13px;vertical-align:top}\
.section{margin:24px 0}\
.section h2{font-size:16px;color:#102a43}\
.bar{background:#e4e7eb;border-radius:4px;height:14px;overflow:hidden}\
.bar span{display:block;height:100%;background:#2f8132}\
.status-compliant{color:#2f8132;font-weight:600}\
.status-nonCompliant{color:#ba2525;font-weight:600}\
.status-manualReview{color:#b44d12;font-weight:600}\
.status-notApplicable{color:#627d98}\
.status-error{color:#ba2525}\
.rec{background:#fff;border-left:4px solid #b44d12;border-radius:4px;padding:12px 16px;margin-bottom:8px}\
.rec.critical{border-color:#ba2525}\
";

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn status_label(status: ControlStatus) -> String {
    format!(
        "<span class=\"status-{}\">{}</span>",
        status.as_str(),
        status.as_str()
    )
}

/// Render a single self-contained document with inline styles.
pub fn render(model: &ReportModel, kind: ReportKind) -> Vec<u8> {
    let a = &model.assessment;
    let mut out = String::with_capacity(16 * 1024);

    let _ = write!(
        out,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
         <title>Compliance Report - {name}</title><style>{STYLE}</style></head><body>\
         <div class=\"wrap\">\
         <header><h1>{name}</h1>\
         <div class=\"meta\">Benchmark {benchmark} · assessment {id} · generated {generated}</div>\
         </header>",
        name = escape(&a.name),
        benchmark = a.benchmark,
        id = a.id,
        generated = model.generated_at.format("%Y-%m-%d %H:%M UTC"),
    );

    // Summary cards.
    let _ = write!(
        out,
        "<div class=\"cards\">\
         <div class=\"card\"><div class=\"value\">{:.2}%</div><div class=\"label\">Overall score</div></div>\
         <div class=\"card\"><div class=\"value\">{:.2}%</div><div class=\"label\">Weighted score</div></div>\
         <div class=\"card\"><div class=\"value\">{}</div><div class=\"label\">Controls</div></div>\
         <div class=\"card\"><div class=\"value\">{}</div><div class=\"label\">Compliant</div></div>\
         <div class=\"card\"><div class=\"value\">{}</div><div class=\"label\">Non-compliant</div></div>\
         <div class=\"card\"><div class=\"value\">{}</div><div class=\"label\">Manual review</div></div>\
         <div class=\"card\"><div class=\"value\">{}</div><div class=\"label\">Errors</div></div>\
         </div>",
        a.overall_score,
        a.weighted_score,
        a.totals.total,
        a.totals.compliant,
        a.totals.non_compliant,
        a.totals.manual_review,
        a.totals.error,
    );

    // Critical findings.
    let critical = model.critical_findings();
    if !critical.is_empty() {
        out.push_str("<div class=\"section\"><h2>Critical findings</h2><table>\
                      <tr><th>Control</th><th>Title</th><th>Score</th><th>Remediation</th></tr>");
        for finding in critical {
            let _ = write!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{}</td></tr>",
                escape(&finding.control_id),
                escape(&finding.title),
                finding.score,
                escape(finding.remediation.as_deref().unwrap_or("")),
            );
        }
        out.push_str("</table></div>");
    }

    // Per-section compliance bars.
    if !model.sections.is_empty() {
        out.push_str("<div class=\"section\"><h2>Compliance by section</h2><table>");
        for section in &model.sections {
            let _ = write!(
                out,
                "<tr><td>{}</td><td style=\"width:50%\"><div class=\"bar\">\
                 <span style=\"width:{:.0}%\"></span></div></td><td>{:.2}% ({}/{})</td></tr>",
                escape(&section.section),
                section.compliance_pct,
                section.compliance_pct,
                section.compliant,
                section.total,
            );
        }
        out.push_str("</table></div>");
    }

    // Full results table, skipped on the executive cut.
    if kind == ReportKind::Full {
        out.push_str(
            "<div class=\"section\"><h2>Results</h2><table id=\"results\">\
             <tr><th>Control</th><th>Title</th><th>Severity</th><th>Status</th>\
             <th>Score</th><th>Checked</th></tr>",
        );
        for entry in &model.entries {
            let _ = write!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{}</td></tr>",
                escape(&entry.control_id),
                escape(&entry.title),
                entry.severity.as_str(),
                status_label(entry.status),
                entry.score,
                entry.checked_at.format("%Y-%m-%d %H:%M"),
            );
        }
        out.push_str("</table></div>");
    }

    // Recommendations.
    if !model.recommendations.is_empty() {
        out.push_str("<div class=\"section\"><h2>Recommendations</h2>");
        for rec in &model.recommendations {
            let class = match rec.priority {
                crate::model::RecommendationPriority::Critical => "rec critical",
                _ => "rec",
            };
            let _ = write!(
                out,
                "<div class=\"{}\"><strong>{}</strong> ({} item{})<br>{}</div>",
                class,
                escape(&rec.title),
                rec.count,
                if rec.count == 1 { "" } else { "s" },
                escape(&rec.detail),
            );
        }
        out.push_str("</div>");
    }

    out.push_str("</div></body></html>");
    out.into_bytes()
}
