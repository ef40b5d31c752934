//! Environment configuration

use std::path::PathBuf;

/// Runtime configuration shared by the API, worker and scheduler binaries.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Postgres connection string; the `maes` schema lives here
    pub database_url: Option<String>,
    /// Static bearer token required on every non-health endpoint
    pub service_token: String,
    /// HTTP listen port for the core API
    pub port: u16,
    /// Directory report artifacts are written to
    pub reports_dir: PathBuf,
    /// Parallel assessments per worker process
    pub worker_concurrency: usize,
    /// Default PEM material for certificate auth
    pub cert_key_path: PathBuf,
    pub cert_path: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            service_token: String::new(),
            port: 3002,
            reports_dir: PathBuf::from("reports"),
            worker_concurrency: 2,
            cert_key_path: PathBuf::from("certs/app.key"),
            cert_path: PathBuf::from("certs/app.crt"),
        }
    }
}

impl CoreConfig {
    /// Load from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            service_token: std::env::var("SERVICE_AUTH_TOKEN").unwrap_or_default(),
            port: std::env::var("COMPLIANCE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            reports_dir: std::env::var("REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.reports_dir),
            worker_concurrency: std::env::var("WORKER_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.worker_concurrency),
            cert_key_path: defaults.cert_key_path,
            cert_path: defaults.cert_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let c = CoreConfig::default();
        assert_eq!(c.port, 3002);
        assert_eq!(c.worker_concurrency, 2);
        assert_eq!(c.reports_dir, PathBuf::from("reports"));
        assert_eq!(c.cert_key_path, PathBuf::from("certs/app.key"));
    }
}
