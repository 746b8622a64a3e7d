//! Signed session cookie encoding
//!
//! The session token travels inside an HS256-signed JWT cookie. The JWT
//! `exp` claim bounds the cookie's own lifetime; access-token expiry is
//! tracked separately via `expires_at` inside the payload.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::{GoftarError, Result};

use super::token::{SessionToken, now_ms};

/// Claims wrapping the session token for the signed cookie
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    /// Cookie expiry (seconds since epoch), required by JWT validation
    exp: i64,
    #[serde(flatten)]
    token: SessionToken,
}

/// Encodes and decodes the signed session cookie
#[derive(Clone)]
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    cookie_ttl_secs: u64,
}

impl SessionCodec {
    /// Create a codec from the session configuration
    pub fn new(config: &SessionConfig) -> Result<Self> {
        if config.secret.is_empty() {
            return Err(GoftarError::Config(
                "Session secret must not be empty".to_string(),
            ));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            cookie_ttl_secs: config.cookie_ttl_secs,
        })
    }

    /// Sign a session token into a cookie value
    pub fn encode(&self, token: &SessionToken) -> Result<String> {
        let claims = SessionClaims {
            exp: now_ms() / 1000 + self.cookie_ttl_secs as i64,
            token: token.clone(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| GoftarError::Auth(format!("Failed to sign session cookie: {e}")))
    }

    /// Verify and decode a cookie value; any failure means "no session"
    pub fn decode(&self, value: &str) -> Option<SessionToken> {
        decode::<SessionClaims>(value, &self.decoding_key, &Validation::default())
            .map(|data| data.claims.token)
            .ok()
    }
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec")
            .field("cookie_ttl_secs", &self.cookie_ttl_secs)
            .finish_non_exhaustive()
    }
}
