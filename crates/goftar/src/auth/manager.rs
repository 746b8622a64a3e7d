//! Session/token lifecycle against the upstream auth API
//!
//! The manager is an explicit service object (injected config + HTTP
//! client) rather than ambient module state, so tests can construct
//! isolated instances pointed at mock endpoints.
//!
//! Failure semantics are deliberate: `authorize` answers `None` on any
//! denial, and `refresh_access_token` never errors - a failed refresh
//! returns the original credentials with the error flag set, and the
//! caller decides what to do (in practice: force a sign-out). Refreshes
//! are never retried here.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, UpstreamConfig};
use crate::error::{GoftarError, Result};

use super::token::{AuthUser, REFRESH_ERROR, SessionToken, SessionView, now_ms};

/// Credentials accepted by [`SessionTokenManager::authorize`]
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Phone + password, exchanged with the upstream login endpoint
    Password { mobile: String, pass: String },
    /// Tokens obtained by a client that performed its own OTP exchange;
    /// accepted as-is
    Passthrough {
        user_id: String,
        username: String,
        access_token: String,
        refresh_token: String,
        /// Epoch-millisecond expiry; defaulted when absent
        expires_at: Option<i64>,
    },
}

/// Login request body for the upstream auth API
#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    mobile: &'a str,
    pass: &'a str,
}

/// Login response from the upstream auth API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    need_user_data: Option<NeedUserData>,
}

/// Identity block nested in the login response
#[derive(Debug, Deserialize)]
struct NeedUserData {
    #[serde(rename = "ID", default)]
    id: Option<Value>,
    #[serde(default)]
    username: Option<String>,
}

/// Refresh request body for the upstream auth API
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Refresh response from the upstream auth API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Manages session tokens: sign-in, expiry-checked reads, refresh
#[derive(Debug, Clone)]
pub struct SessionTokenManager {
    client: Client,
    auth_api_url: String,
    default_access_ttl_secs: u64,
}

impl SessionTokenManager {
    /// Create a manager for the given upstream auth API
    pub fn new(upstream: &UpstreamConfig, session: &SessionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(upstream.request_timeout_secs))
            .build()
            .map_err(|e| GoftarError::Auth(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            auth_api_url: upstream.auth_api_url.trim_end_matches('/').to_string(),
            default_access_ttl_secs: session.default_access_ttl_secs,
        })
    }

    /// Authorize a sign-in attempt
    ///
    /// Returns `None` on any denial or failure (non-2xx, missing fields,
    /// network error) - authentication failures are answers, not errors.
    pub async fn authorize(&self, credentials: Credentials) -> Option<AuthUser> {
        match credentials {
            Credentials::Passthrough {
                user_id,
                username,
                access_token,
                refresh_token,
                expires_at,
            } => {
                if access_token.is_empty() {
                    warn!("Passthrough sign-in rejected: empty access token");
                    return None;
                }
                let expires_at = expires_at
                    .unwrap_or_else(|| now_ms() + (self.default_access_ttl_secs as i64) * 1000);
                Some(AuthUser {
                    id: user_id,
                    name: username,
                    access_token,
                    refresh_token,
                    expires_at,
                })
            }
            Credentials::Password { mobile, pass } => self.login(&mobile, &pass).await,
        }
    }

    /// Exchange phone + password at the upstream login endpoint
    async fn login(&self, mobile: &str, pass: &str) -> Option<AuthUser> {
        let url = format!("{}/login", self.auth_api_url);
        let response = match self
            .client
            .post(&url)
            .json(&LoginRequest { mobile, pass })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Login request failed: {e}");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Login rejected with status {}", response.status());
            return None;
        }

        let body: LoginResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Login response was not valid JSON: {e}");
                return None;
            }
        };

        let access_token = match body.access_token {
            Some(token) if !token.is_empty() => token,
            _ => {
                warn!("Login response missing access token");
                return None;
            }
        };
        let Some(user_data) = body.need_user_data else {
            warn!("Login response missing user data");
            return None;
        };

        let expires_in = body
            .expires_in
            .unwrap_or(self.default_access_ttl_secs as i64);

        let user = AuthUser {
            id: user_data.id.as_ref().map(id_string).unwrap_or_default(),
            name: user_data.username.unwrap_or_default(),
            access_token,
            refresh_token: body.refresh_token.unwrap_or_default(),
            expires_at: now_ms() + expires_in * 1000,
        };
        info!(user_id = %user.id, "User signed in");
        Some(user)
    }

    /// Build the persisted session token on initial sign-in
    ///
    /// Copies identity and credential fields and clears any stale error.
    pub fn on_sign_in(&self, user: &AuthUser) -> SessionToken {
        SessionToken {
            id: user.id.clone(),
            name: user.name.clone(),
            access_token: user.access_token.clone(),
            refresh_token: user.refresh_token.clone(),
            expires_at: user.expires_at,
            error: None,
        }
    }

    /// Materialize the session token, refreshing once if it has expired
    ///
    /// Tokens still within their expiry are returned unchanged; expired
    /// tokens trigger exactly one refresh attempt.
    pub async fn ensure_fresh(&self, token: SessionToken) -> SessionToken {
        if !token.is_expired(now_ms()) {
            return token;
        }
        debug!(user_id = %token.id, "Access token expired, refreshing");
        self.refresh_access_token(token).await
    }

    /// Renew the access token at the upstream refresh endpoint
    ///
    /// On success the refresh token rotates when the upstream supplies a
    /// replacement, falling back to the prior value otherwise. On any
    /// failure the original credentials are left untouched and the error
    /// flag is set; this method never returns an `Err` and never retries.
    pub async fn refresh_access_token(&self, mut token: SessionToken) -> SessionToken {
        let url = format!("{}/refresh-token", self.auth_api_url);
        let response = match self
            .client
            .post(&url)
            .json(&RefreshRequest {
                refresh_token: &token.refresh_token,
            })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(user_id = %token.id, "Token refresh request failed: {e}");
                token.error = Some(REFRESH_ERROR.to_string());
                return token;
            }
        };

        if !response.status().is_success() {
            warn!(
                user_id = %token.id,
                status = %response.status(),
                "Token refresh rejected"
            );
            token.error = Some(REFRESH_ERROR.to_string());
            return token;
        }

        let body: RefreshResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(user_id = %token.id, "Token refresh response was not valid JSON: {e}");
                token.error = Some(REFRESH_ERROR.to_string());
                return token;
            }
        };

        let Some(access_token) = body.access_token.filter(|t| !t.is_empty()) else {
            warn!(user_id = %token.id, "Token refresh response missing access token");
            token.error = Some(REFRESH_ERROR.to_string());
            return token;
        };

        let expires_in = body
            .expires_in
            .unwrap_or(self.default_access_ttl_secs as i64);

        token.access_token = access_token;
        if let Some(rotated) = body.refresh_token.filter(|t| !t.is_empty()) {
            token.refresh_token = rotated;
        }
        token.expires_at = now_ms() + expires_in * 1000;
        token.error = None;
        debug!(user_id = %token.id, "Access token refreshed");
        token
    }

    /// Project the token onto the client-visible session object
    pub fn session_view(&self, token: &SessionToken) -> SessionView {
        SessionView::from(token)
    }
}

/// Render the upstream's `ID` field (number or string) as a string
fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionTokenManager {
        let upstream = UpstreamConfig {
            auth_api_url: "http://127.0.0.1:9".to_string(),
            ..UpstreamConfig::default()
        };
        SessionTokenManager::new(&upstream, &SessionConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_passthrough_accepted_as_is() {
        let user = manager()
            .authorize(Credentials::Passthrough {
                user_id: "7".to_string(),
                username: "sara".to_string(),
                access_token: "access".to_string(),
                refresh_token: "refresh".to_string(),
                expires_at: Some(1234),
            })
            .await
            .unwrap();

        assert_eq!(user.id, "7");
        assert_eq!(user.name, "sara");
        assert_eq!(user.access_token, "access");
        assert_eq!(user.refresh_token, "refresh");
        assert_eq!(user.expires_at, 1234);
    }

    #[tokio::test]
    async fn test_passthrough_defaults_expiry() {
        let before = now_ms();
        let user = manager()
            .authorize(Credentials::Passthrough {
                user_id: "7".to_string(),
                username: "sara".to_string(),
                access_token: "access".to_string(),
                refresh_token: "refresh".to_string(),
                expires_at: None,
            })
            .await
            .unwrap();

        // Default TTL is 3600s
        assert!(user.expires_at >= before + 3_600_000);
        assert!(user.expires_at <= now_ms() + 3_600_000);
    }

    #[tokio::test]
    async fn test_passthrough_rejects_empty_access_token() {
        let result = manager()
            .authorize(Credentials::Passthrough {
                user_id: "7".to_string(),
                username: "sara".to_string(),
                access_token: String::new(),
                refresh_token: "refresh".to_string(),
                expires_at: None,
            })
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_login_network_error_returns_none() {
        // Port 9 (discard) is not listening; the request fails fast
        let result = manager()
            .authorize(Credentials::Password {
                mobile: "09120000000".to_string(),
                pass: "secret".to_string(),
            })
            .await;
        assert!(result.is_none());
    }

    #[test]
    fn test_on_sign_in_clears_error() {
        let m = manager();
        let user = AuthUser {
            id: "1".to_string(),
            name: "nima".to_string(),
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: 99,
        };
        let token = m.on_sign_in(&user);
        assert_eq!(token.id, "1");
        assert_eq!(token.expires_at, 99);
        assert!(token.error.is_none());
    }

    #[tokio::test]
    async fn test_ensure_fresh_skips_valid_token() {
        let m = manager();
        let token = SessionToken {
            id: "1".to_string(),
            name: "nima".to_string(),
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: now_ms() + 60_000,
            error: None,
        };
        // No upstream is reachable, so this passes only if no call is made
        let fresh = m.ensure_fresh(token.clone()).await;
        assert_eq!(fresh, token);
    }

    #[tokio::test]
    async fn test_refresh_failure_is_flagged_not_thrown() {
        let m = manager();
        let token = SessionToken {
            id: "1".to_string(),
            name: "nima".to_string(),
            access_token: "stale-access".to_string(),
            refresh_token: "stale-refresh".to_string(),
            expires_at: 0,
            error: None,
        };
        let result = m.refresh_access_token(token).await;
        assert_eq!(result.access_token, "stale-access");
        assert_eq!(result.refresh_token, "stale-refresh");
        assert_eq!(result.error.as_deref(), Some(REFRESH_ERROR));
    }

    #[test]
    fn test_id_string_handles_numbers_and_strings() {
        assert_eq!(id_string(&serde_json::json!("abc")), "abc");
        assert_eq!(id_string(&serde_json::json!(42)), "42");
    }
}
