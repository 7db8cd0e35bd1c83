use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{Config, CredentialMode};
use crate::error::ConnectorError;
use crate::worker_pool::WorkerPool;

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

/// Fields of a service-account JSON key that the JWT flow needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, ConnectorError> {
        serde_json::from_str(json).map_err(|e| {
            ConnectorError::Configuration(format!("invalid service account key: {}", e))
        })
    }

    /// Blocking read; call from the worker pool.
    pub fn load(path: &Path) -> Result<Self, ConnectorError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::Configuration(format!(
                "cannot read service account key {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// RS256-sign a token request assertion. CPU bound.
pub fn sign_assertion(
    key: &ServiceAccountKey,
    scope: &str,
    issued_at: u64,
) -> Result<String, ConnectorError> {
    let claims = JwtClaims {
        iss: &key.client_email,
        scope,
        aud: &key.token_uri,
        iat: issued_at,
        exp: issued_at + ASSERTION_LIFETIME_SECS,
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    Ok(encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

async fn post_token_form(
    http: &reqwest::Client,
    url: &str,
    form: &[(&str, String)],
    what: &str,
) -> Result<OAuthTokens, ConnectorError> {
    let resp = http
        .post(url)
        .form(form)
        .send()
        .await
        .map_err(ConnectorError::HttpRequest)?;
    let status = resp.status();
    let v = resp
        .json::<serde_json::Value>()
        .await
        .map_err(|e| ConnectorError::Authentication(format!("{} returned non-JSON: {}", what, e)))?;
    if !status.is_success() {
        let reason = v
            .get("error_description")
            .or_else(|| v.get("error"))
            .and_then(|s| s.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| v.to_string());
        return Err(ConnectorError::Authentication(format!(
            "{} failed ({}): {}",
            what,
            status.as_u16(),
            reason
        )));
    }
    let access_token = v
        .get("access_token")
        .and_then(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ConnectorError::Authentication(format!("{} response had no access_token", what))
        })?;
    Ok(OAuthTokens {
        access_token: access_token.to_string(),
        refresh_token: v
            .get("refresh_token")
            .and_then(|s| s.as_str())
            .map(|s| s.to_string()),
        expires_in: v.get("expires_in").and_then(|i| i.as_i64()),
        scope: v
            .get("scope")
            .and_then(|s| s.as_str())
            .map(|s| s.to_string()),
        token_type: v
            .get("token_type")
            .and_then(|s| s.as_str())
            .map(|s| s.to_string()),
    })
}

pub async fn google_refresh_token(
    http: &reqwest::Client,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<OAuthTokens, ConnectorError> {
    let body = [
        ("grant_type", "refresh_token".to_string()),
        ("client_id", client_id.to_string()),
        ("client_secret", client_secret.to_string()),
        ("refresh_token", refresh_token.to_string()),
    ];
    post_token_form(http, GOOGLE_TOKEN_URL, &body, "token refresh").await
}

pub async fn exchange_jwt_assertion(
    http: &reqwest::Client,
    token_uri: &str,
    assertion: String,
) -> Result<OAuthTokens, ConnectorError> {
    let body = [
        ("grant_type", JWT_BEARER_GRANT.to_string()),
        ("assertion", assertion),
    ];
    post_token_form(http, token_uri, &body, "service account token exchange").await
}

/// Where access tokens come from, resolved once from the configuration.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    ServiceAccount(Arc<ServiceAccountKey>),
    OAuth {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

impl CredentialSource {
    /// Reads the key file on the worker pool in service-account mode.
    pub async fn resolve(config: &Config, pool: &WorkerPool) -> Result<Self, ConnectorError> {
        match config.credential_mode() {
            CredentialMode::ServiceAccount => {
                let path = config.credentials_path.clone().ok_or_else(|| {
                    ConnectorError::Configuration("service account key path missing".into())
                })?;
                let key = pool.run(move || ServiceAccountKey::load(&path)).await?;
                info!(client_email = %key.client_email, "Loaded service account credentials");
                Ok(CredentialSource::ServiceAccount(Arc::new(key)))
            }
            CredentialMode::OAuth => {
                let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
                    config.oauth_client_id.clone(),
                    config.oauth_client_secret.clone(),
                    config.oauth_refresh_token.clone(),
                ) else {
                    return Err(ConnectorError::Configuration(
                        "OAuth mode needs OAUTH_CLIENT_ID, OAUTH_CLIENT_SECRET and OAUTH_REFRESH_TOKEN"
                            .into(),
                    ));
                };
                Ok(CredentialSource::OAuth {
                    client_id,
                    client_secret,
                    refresh_token,
                })
            }
            CredentialMode::None => Err(ConnectorError::Configuration(
                "No valid credentials configured. Set GOOGLE_APPLICATION_CREDENTIALS or the OAUTH_* variables."
                    .into(),
            )),
        }
    }
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now + EXPIRY_SKEW
    }
}

/// Caches an access token for one OAuth scope and refreshes it on expiry.
pub struct TokenProvider {
    source: CredentialSource,
    scope: &'static str,
    http: reqwest::Client,
    pool: Arc<WorkerPool>,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(
        source: CredentialSource,
        scope: &'static str,
        http: reqwest::Client,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            source,
            scope,
            http,
            pool,
            cached: RwLock::new(None),
        }
    }

    pub async fn access_token(&self) -> Result<String, ConnectorError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if token.is_fresh(Instant::now()) {
                    return Ok(token.token.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.token.clone());
            }
        }
        let fresh = self.fetch().await?;
        let lifetime = fresh
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs as u64))
            .unwrap_or(Duration::from_secs(55 * 60));
        debug!(scope = self.scope, lifetime_secs = lifetime.as_secs(), "Access token refreshed");
        *cached = Some(CachedToken {
            token: fresh.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(fresh.access_token)
    }

    /// Drop the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn fetch(&self) -> Result<OAuthTokens, ConnectorError> {
        match &self.source {
            CredentialSource::ServiceAccount(key) => {
                let issued_at = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_err(|e| ConnectorError::Other(format!("system clock error: {}", e)))?
                    .as_secs();
                let signing_key = Arc::clone(key);
                let scope = self.scope;
                let assertion = self
                    .pool
                    .run(move || sign_assertion(&signing_key, scope, issued_at))
                    .await?;
                exchange_jwt_assertion(&self.http, &key.token_uri, assertion).await
            }
            CredentialSource::OAuth {
                client_id,
                client_secret,
                refresh_token,
            } => google_refresh_token(&self.http, client_id, client_secret, refresh_token).await,
        }
    }
}
