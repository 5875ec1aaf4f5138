use crate::domain::ports::TokenProvider;
use crate::utils::error::PublishError;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// 到期前提早更新
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// 服務帳戶 JSON 金鑰中需要的欄位
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, PublishError> {
        serde_json::from_str(json)
            .map_err(|e| PublishError::Credentials(format!("Invalid service account file: {}", e)))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// 以服務帳戶簽署 JWT 換取 OAuth2 存取權杖，並快取至到期前
pub struct ServiceAccountTokenProvider {
    key: ServiceAccountKey,
    client: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenProvider {
    pub fn new(key: ServiceAccountKey) -> Self {
        Self {
            key,
            client: Client::new(),
            cached: Mutex::new(None),
        }
    }

    fn signed_assertion(&self) -> Result<String, PublishError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| PublishError::Credentials(format!("Invalid private key: {}", e)))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| PublishError::Credentials(format!("Failed to sign assertion: {}", e)))
    }

    async fn exchange(&self) -> Result<TokenResponse, PublishError> {
        let assertion = self.signed_assertion()?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| PublishError::Transient(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(PublishError::Transient(format!("Token endpoint returned {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Credentials(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PublishError::Credentials(format!("Invalid token response: {}", e)))
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    async fn access_token(&self) -> Result<String, PublishError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!("🔑 Requesting access token for {}", self.key.client_email);
        let fresh = self.exchange().await?;
        let value = fresh.access_token.clone();
        *cached = Some(CachedToken {
            value: fresh.access_token,
            expires_at: Instant::now() + Duration::from_secs(fresh.expires_in),
        });
        Ok(value)
    }
}

/// 直接使用外部提供的權杖（例如 `GOOGLE_ACCESS_TOKEN`）
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, PublishError> {
        if self.token.trim().is_empty() {
            return Err(PublishError::Credentials("access token is empty".to_string()));
        }
        Ok(self.token.clone())
    }
}
