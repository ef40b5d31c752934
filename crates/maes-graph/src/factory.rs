//! Per-tenant client construction and token caching

use maes_common::{Credentials, Tenant};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::GraphClient;
use crate::token::{self, AccessToken};
use crate::GraphError;

/// Graph calls get this long before the transport gives up.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Token cache keyed by (tenant id, directory tenant id).
///
/// Owned by one worker process; eviction is lazy on expiry or a forced
/// refresh after a 401.
pub(crate) struct TokenCache {
    http: reqwest::Client,
    tokens: RwLock<HashMap<(Uuid, String), AccessToken>>,
}

impl TokenCache {
    fn new(http: reqwest::Client) -> Self {
        Self { http, tokens: RwLock::new(HashMap::new()) }
    }

    pub(crate) async fn bearer(
        &self,
        tenant_id: Uuid,
        directory_tenant_id: &str,
        credentials: &Credentials,
        force: bool,
    ) -> Result<String, GraphError> {
        let key = (tenant_id, directory_tenant_id.to_string());
        if !force {
            let tokens = self.tokens.read();
            if let Some(cached) = tokens.get(&key) {
                if cached.is_fresh(chrono::Utc::now()) {
                    return Ok(cached.token.clone());
                }
            }
        }

        let fresh = token::acquire_token(&self.http, directory_tenant_id, credentials).await?;
        let bearer = fresh.token.clone();
        self.tokens.write().insert(key, fresh);
        Ok(bearer)
    }

    #[cfg(test)]
    fn preload(&self, tenant_id: Uuid, directory_tenant_id: &str, token: AccessToken) {
        self.tokens
            .write()
            .insert((tenant_id, directory_tenant_id.to_string()), token);
    }
}

/// Builds authenticated [`GraphClient`]s, sharing one token cache per
/// worker process.
pub struct GraphClientFactory {
    http: reqwest::Client,
    cache: Arc<TokenCache>,
}

impl GraphClientFactory {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        let cache = Arc::new(TokenCache::new(http.clone()));
        Self { http, cache }
    }

    /// Client for one tenant; token acquisition is deferred to the first
    /// request so construction never blocks on the network.
    pub fn client_for(&self, tenant: &Tenant, cancel: CancellationToken) -> GraphClient {
        GraphClient::cached(
            self.http.clone(),
            self.cache.clone(),
            tenant.id,
            tenant.directory_tenant_id.clone(),
            tenant.credentials.clone(),
            cancel,
        )
    }
}

impl Default for GraphClientFactory {
    fn default() -> Self {
        Self::new()
    }
}
