//! Bearer token suppliers.
//!
//! `ConsentClient` asks its `TokenProvider` for a token before every call
//! and never interprets or retries token failures.
//! `ClientCredentialsTokenProvider` performs the OAuth2 client-credentials
//! grant through the same `HttpTransport` as the consent calls and reuses
//! the token until shortly before it expires.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::TokenError;
use crate::http::{HttpMethod, HttpRequest, HttpTransport};

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Assumed lifetime when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Longer `expires_in` values are capped to this.
const MAX_TOKEN_LIFETIME_SECS: u64 = 24 * 60 * 60;

/// Supplies bearer tokens for the `authorization` header.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, TokenError>;
}

/// Always returns the same token.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, TokenError> {
        Ok(self.token.clone())
    }
}

/// Settings for the client-credentials grant.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientCredentialsOptions {
    /// Token endpoint of the authorization server.
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    /// Requested scope, sent verbatim when present.
    pub scope: Option<String>,
}

impl fmt::Debug for ClientCredentialsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentialsOptions")
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

impl ClientCredentialsOptions {
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.token_endpoint.trim().is_empty() {
            return Err(TokenError::Config("token_endpoint is required".into()));
        }
        url::Url::parse(&self.token_endpoint)
            .map_err(|e| TokenError::Config(format!("invalid token_endpoint: {e}")))?;
        if self.client_id.trim().is_empty() {
            return Err(TokenError::Config("client_id is required".into()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(TokenError::Config("client_secret is required".into()));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: Option<String>,
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// OAuth2 client-credentials token provider with an expiry-aware cache.
pub struct ClientCredentialsTokenProvider {
    transport: Arc<dyn HttpTransport>,
    options: ClientCredentialsOptions,
    cache: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for ClientCredentialsTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentialsTokenProvider")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ClientCredentialsTokenProvider {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        options: ClientCredentialsOptions,
    ) -> Result<Self, TokenError> {
        options.validate()?;
        Ok(Self {
            transport,
            options,
            cache: Mutex::new(None),
        })
    }

    async fn request_token(&self) -> Result<CachedToken, TokenError> {
        // The serializer is not Send; it must be gone before the await below.
        let body = {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            form.append_pair("grant_type", "client_credentials")
                .append_pair("client_id", &self.options.client_id)
                .append_pair("client_secret", &self.options.client_secret);
            if let Some(scope) = self.options.scope.as_deref().filter(|s| !s.is_empty()) {
                form.append_pair("scope", scope);
            }
            form.finish()
        };

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.options.token_endpoint.clone(),
            headers: vec![
                (
                    "content-type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                ),
                ("accept".to_string(), "application/json".to_string()),
            ],
            body: Some(body),
        };

        let response = self.transport.execute(request).await?;
        if !(200..300).contains(&response.status) {
            return Err(TokenError::Rejected {
                status: response.status,
                body: response.body,
            });
        }

        let token: TokenResponse = serde_json::from_str(&response.body)
            .map_err(|e| TokenError::InvalidResponse(e.to_string()))?;
        if let Some(token_type) = token.token_type.as_deref() {
            if !token_type.eq_ignore_ascii_case("bearer") {
                return Err(TokenError::UnsupportedTokenType(token_type.to_string()));
            }
        }
        if token.access_token.is_empty() {
            return Err(TokenError::InvalidResponse("empty access_token".into()));
        }

        let lifetime = Duration::from_secs(
            token
                .expires_in
                .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
                .min(MAX_TOKEN_LIFETIME_SECS),
        );
        tracing::debug!(
            client_id = %self.options.client_id,
            lifetime_secs = lifetime.as_secs(),
            "acquired access token"
        );
        Ok(CachedToken {
            value: token.access_token,
            refresh_at: Instant::now() + refresh_after(lifetime),
        })
    }
}

/// How long a token with `lifetime` may be reused.
fn refresh_after(lifetime: Duration) -> Duration {
    if lifetime > REFRESH_MARGIN {
        lifetime - REFRESH_MARGIN
    } else {
        lifetime / 2
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsTokenProvider {
    async fn access_token(&self) -> Result<String, TokenError> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.as_ref().filter(|t| Instant::now() < t.refresh_at) {
            return Ok(token.value.clone());
        }
        let fresh = self.request_token().await?;
        let value = fresh.value.clone();
        *cache = Some(fresh);
        Ok(value)
    }
}
