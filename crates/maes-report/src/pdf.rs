//! PDF rendering via headless Chromium
//!
//! A separable capability: when no browser binary is present the
//! generator falls back to the HTML artifact with an explanatory note.

use std::path::{Path, PathBuf};

use crate::ReportError;

const CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "headless-shell",
];

/// Locates and drives a headless browser.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    browser: Option<PathBuf>,
}

impl PdfRenderer {
    /// Look for a browser binary on PATH.
    pub fn detect() -> Self {
        let path = std::env::var_os("PATH").unwrap_or_default();
        for dir in std::env::split_paths(&path) {
            for name in CANDIDATES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    tracing::debug!(browser = %candidate.display(), "pdf renderer available");
                    return Self { browser: Some(candidate) };
                }
            }
        }
        tracing::debug!("no headless browser found, pdf falls back to html");
        Self { browser: None }
    }

    /// Renderer that always falls back; used in tests.
    pub fn disabled() -> Self {
        Self { browser: None }
    }

    pub fn is_available(&self) -> bool {
        self.browser.is_some()
    }

    /// Print `html` to `pdf`. Errors indicate fallback, not failure of the
    /// whole generation.
    pub async fn render(&self, html: &Path, pdf: &Path) -> Result<(), ReportError> {
        let Some(browser) = &self.browser else {
            return Err(ReportError::PdfUnavailable);
        };
        let status = tokio::process::Command::new(browser)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg(format!("--print-to-pdf={}", pdf.display()))
            .arg(html)
            .status()
            .await
            .map_err(|_| ReportError::PdfUnavailable)?;
        if !status.success() || !pdf.is_file() {
            return Err(ReportError::PdfUnavailable);
        }
        Ok(())
    }
}

impl Default for PdfRenderer {
    fn default() -> Self {
        Self::detect()
    }
}
