//! Authenticated request surface over Microsoft Graph

use async_trait::async_trait;
use maes_common::Credentials;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::factory::TokenCache;
use crate::GraphError;

/// Graph v1.0 API base.
pub const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
/// Retry budget for 5xx/429 responses.
pub const MAX_ATTEMPTS: u32 = 3;

/// The thin Graph query surface checkers are written against.
///
/// Paths are relative to the v1.0 base, query string included, e.g.
/// `users?$select=id&$top=1` or `directoryRoles/{id}/members`.
#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn get(&self, path: &str) -> Result<Value, GraphError>;
}

enum TokenSource {
    Cached {
        cache: Arc<TokenCache>,
        tenant_id: Uuid,
        directory_tenant_id: String,
        credentials: Credentials,
    },
    #[allow(dead_code)]
    Fixed(String),
}

/// Authenticated per-tenant Graph client.
///
/// Owned by one worker task; the cancellation token is observed around
/// every HTTP call and during backoff sleeps.
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    source: TokenSource,
    cancel: CancellationToken,
}

impl GraphClient {
    pub(crate) fn cached(
        http: reqwest::Client,
        cache: Arc<TokenCache>,
        tenant_id: Uuid,
        directory_tenant_id: String,
        credentials: Credentials,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http,
            base_url: GRAPH_BASE.to_string(),
            source: TokenSource::Cached { cache, tenant_id, directory_tenant_id, credentials },
            cancel,
        }
    }

    /// Token for the next request; `force` bypasses the cache after a 401.
    async fn bearer(&self, force: bool) -> Result<String, GraphError> {
        match &self.source {
            TokenSource::Cached { cache, tenant_id, directory_tenant_id, credentials } => {
                cache
                    .bearer(*tenant_id, directory_tenant_id, credentials, force)
                    .await
            }
            TokenSource::Fixed(token) => Ok(token.clone()),
        }
    }

    fn backoff(attempt: u32) -> Duration {
        let base = Duration::from_millis(500) * 2u32.saturating_pow(attempt.saturating_sub(1));
        base + Duration::from_millis(rand::thread_rng().gen_range(0..250))
    }

    fn retry_after(response: &reqwest::Response) -> Option<Duration> {
        response
            .headers()
            .get("retry-after")?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }

    async fn sleep_cancellable(&self, delay: Duration) -> Result<(), GraphError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(GraphError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

#[async_trait]
impl GraphApi for GraphClient {
    async fn get(&self, path: &str) -> Result<Value, GraphError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut attempt: u32 = 0;
        let mut refreshed = false;
        let mut force_refresh = false;

        loop {
            if self.cancel.is_cancelled() {
                return Err(GraphError::Cancelled);
            }
            let token = self.bearer(force_refresh).await?;
            force_refresh = false;
            let request = self.http.get(&url).bearer_auth(token).send();
            let response = tokio::select! {
                _ = self.cancel.cancelled() => return Err(GraphError::Cancelled),
                r = request => r,
            };

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(GraphError::Transient(format!("{url}: {e}")));
                    }
                    self.sleep_cancellable(Self::backoff(attempt)).await?;
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 401 {
                // One forced refresh, then propagate.
                if refreshed {
                    return Err(GraphError::TokenExpired);
                }
                refreshed = true;
                force_refresh = true;
                continue;
            }
            if status.as_u16() == 429 {
                attempt += 1;
                if attempt >= MAX_ATTEMPTS {
                    return Err(GraphError::RateLimited);
                }
                let delay = Self::retry_after(&response).unwrap_or_else(|| Self::backoff(attempt));
                tracing::debug!(%url, attempt, ?delay, "graph throttled, backing off");
                self.sleep_cancellable(delay).await?;
                continue;
            }
            if status.is_server_error() {
                attempt += 1;
                if attempt >= MAX_ATTEMPTS {
                    return Err(GraphError::Transient(format!("{url} returned {status}")));
                }
                self.sleep_cancellable(Self::backoff(attempt)).await?;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GraphError::Status { status: status.as_u16(), body });
            }

            return response
                .json::<Value>()
                .await
                .map_err(|e| GraphError::Decode(format!("{url}: {e}")));
        }
    }
}

#[cfg(test)]
impl GraphClient {
    /// Client with a fixed bearer token against an alternate base.
    fn fixed(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            source: TokenSource::Fixed(token.into()),
            cancel: CancellationToken::new(),
        }
    }
}
