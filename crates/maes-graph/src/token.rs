//! OAuth2 client-credentials token acquisition

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use maes_common::{AuthCause, Credentials};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::GraphError;

/// Scope requested for every client-credentials grant.
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// A cached bearer token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Tokens are refreshed when expiry is this close.
    pub const REFRESH_MARGIN_MINUTES: i64 = 5;

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > Duration::minutes(Self::REFRESH_MARGIN_MINUTES)
    }
}

fn token_endpoint(directory_tenant_id: &str) -> String {
    format!("https://login.microsoftonline.com/{directory_tenant_id}/oauth2/v2.0/token")
}

/// SHA-1 thumbprint of DER certificate bytes, uppercase hex.
pub fn thumbprint(der: &[u8]) -> String {
    let digest = Sha1::digest(der);
    hex::encode_upper(digest)
}

#[derive(Deserialize)]
struct TokenOk {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct TokenErr {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Map a token endpoint error body onto a cause class.
pub fn classify_auth_failure(error: &str, description: &str) -> AuthCause {
    let description = description.to_ascii_lowercase();
    if description.contains("aadsts90002") || description.contains("tenant") && description.contains("not found") {
        AuthCause::TenantNotFound
    } else if description.contains("aadsts65001") || description.contains("consent") {
        AuthCause::ConsentMissing
    } else if description.contains("aadsts700027") || description.contains("certificate") {
        AuthCause::CertificateInvalid
    } else if error == "invalid_client" {
        AuthCause::InvalidClient
    } else {
        AuthCause::Unknown
    }
}

/// Build the signed RS256 client assertion for certificate auth.
///
/// The assertion header carries the certificate thumbprint (`x5t`,
/// base64url) and the DER body (`x5c`, base64). Malformed PEM material in
/// either file yields `AuthCause::CertificateInvalid`.
pub async fn certificate_assertion(
    client_id: &str,
    key_path: &str,
    cert_path: &str,
    directory_tenant_id: &str,
) -> Result<String, GraphError> {
    let cert_invalid =
        |m: String| GraphError::auth(AuthCause::CertificateInvalid, m);

    let key_pem = tokio::fs::read(key_path)
        .await
        .map_err(|e| cert_invalid(format!("cannot read private key {key_path}: {e}")))?;
    let cert_pem = tokio::fs::read(cert_path)
        .await
        .map_err(|e| cert_invalid(format!("cannot read certificate {cert_path}: {e}")))?;

    let cert_der = pem::parse(&cert_pem)
        .map_err(|e| cert_invalid(format!("malformed certificate pem: {e}")))?
        .into_contents();
    let encoding_key = EncodingKey::from_rsa_pem(&key_pem)
        .map_err(|e| cert_invalid(format!("malformed private key pem: {e}")))?;

    let digest = Sha1::digest(&cert_der);
    let mut header = Header::new(Algorithm::RS256);
    header.x5t = Some(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest));
    header.x5c = Some(vec![base64::engine::general_purpose::STANDARD.encode(&cert_der)]);

    let now = Utc::now();
    let claims = serde_json::json!({
        "aud": token_endpoint(directory_tenant_id),
        "iss": client_id,
        "sub": client_id,
        "jti": Uuid::new_v4().to_string(),
        "nbf": now.timestamp(),
        "iat": now.timestamp(),
        "exp": (now + Duration::minutes(10)).timestamp(),
    });

    jsonwebtoken::encode(&header, &claims, &encoding_key)
        .map_err(|e| cert_invalid(format!("assertion signing failed: {e}")))
}

/// Acquire a token for one tenant via the client-credentials grant.
pub async fn acquire_token(
    http: &reqwest::Client,
    directory_tenant_id: &str,
    credentials: &Credentials,
) -> Result<AccessToken, GraphError> {
    let endpoint = token_endpoint(directory_tenant_id);

    let mut form: Vec<(&str, String)> = vec![
        ("client_id", credentials.client_id().to_string()),
        ("scope", GRAPH_SCOPE.to_string()),
        ("grant_type", "client_credentials".to_string()),
    ];
    match credentials {
        Credentials::Secret { client_secret, .. } => {
            form.push(("client_secret", client_secret.clone()));
        }
        Credentials::Certificate { client_id, key_path, cert_path } => {
            let assertion =
                certificate_assertion(client_id, key_path, cert_path, directory_tenant_id).await?;
            form.push((
                "client_assertion_type",
                "urn:ietf:params:oauth:client-assertion-type:jwt-bearer".to_string(),
            ));
            form.push(("client_assertion", assertion));
        }
    }

    let response = http
        .post(&endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| GraphError::Transient(format!("token endpoint unreachable: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| GraphError::Transient(format!("token endpoint read failed: {e}")))?;

    if status.is_success() {
        let ok: TokenOk = serde_json::from_str(&body)
            .map_err(|e| GraphError::Decode(format!("token response: {e}")))?;
        tracing::debug!(tenant = directory_tenant_id, "acquired graph token");
        return Ok(AccessToken {
            token: ok.access_token,
            expires_at: Utc::now() + Duration::seconds(ok.expires_in),
        });
    }

    match serde_json::from_str::<TokenErr>(&body) {
        Ok(err) => {
            let cause = classify_auth_failure(&err.error, &err.error_description);
            Err(GraphError::auth(
                cause,
                format!("{}: {}", err.error, err.error_description),
            ))
        }
        Err(_) if status.is_server_error() => {
            Err(GraphError::Transient(format!("token endpoint returned {status}")))
        }
        Err(_) => Err(GraphError::auth(
            AuthCause::Unknown,
            format!("token endpoint returned {status}"),
        )),
    }
}
