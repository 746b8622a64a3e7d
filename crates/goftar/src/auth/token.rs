//! Session token types
//!
//! The session token is the server-side view of one signed-in user: identity
//! fields plus the opaque bearer credentials issued by the upstream auth
//! service and their absolute expiry. It travels inside a signed cookie and
//! is re-materialized on every protected request.

use serde::{Deserialize, Serialize};

/// Error marker set on the session when a refresh attempt fails.
///
/// This is a signal, not an exception: the surrounding session machinery
/// keeps working, and the client reacts by forcing a sign-out.
pub const REFRESH_ERROR: &str = "RefreshAccessTokenError";

/// Current wall-clock time as epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Server-side session token carried in the signed cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// User ID as issued by the upstream auth service
    pub id: String,
    /// Display name / username
    pub name: String,
    /// Opaque bearer credential for upstream calls
    pub access_token: String,
    /// Opaque credential used to renew the access token
    pub refresh_token: String,
    /// Absolute epoch-millisecond expiry of `access_token`
    pub expires_at: i64,
    /// Set when a refresh attempt failed (see [`REFRESH_ERROR`])
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl SessionToken {
    /// Whether the access token has expired at the given instant
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at
    }

    /// Whether a refresh attempt has failed for this token
    pub fn has_refresh_error(&self) -> bool {
        self.error.as_deref() == Some(REFRESH_ERROR)
    }
}

/// Identity + credentials produced by a successful authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub name: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Client-facing projection of the session token
///
/// Includes the `error` flag so UI code can detect a failed refresh and
/// force a sign-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: String,
    pub name: String,
    pub access_token: String,
    pub expires_at: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl From<&SessionToken> for SessionView {
    fn from(token: &SessionToken) -> Self {
        Self {
            id: token.id.clone(),
            name: token.name.clone(),
            access_token: token.access_token.clone(),
            expires_at: token.expires_at,
            error: token.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: i64) -> SessionToken {
        SessionToken {
            id: "42".to_string(),
            name: "roya".to_string(),
            access_token: "access-abc".to_string(),
            refresh_token: "refresh-xyz".to_string(),
            expires_at,
            error: None,
        }
    }

    #[test]
    fn test_is_expired_strictly_after_expiry() {
        let t = token(1000);
        assert!(!t.is_expired(999));
        // expires_at itself is still usable
        assert!(!t.is_expired(1000));
        assert!(t.is_expired(1001));
    }

    #[test]
    fn test_has_refresh_error() {
        let mut t = token(0);
        assert!(!t.has_refresh_error());
        t.error = Some("SomethingElse".to_string());
        assert!(!t.has_refresh_error());
        t.error = Some(REFRESH_ERROR.to_string());
        assert!(t.has_refresh_error());
    }

    #[test]
    fn test_session_view_projects_error() {
        let mut t = token(5);
        t.error = Some(REFRESH_ERROR.to_string());
        let view = SessionView::from(&t);
        assert_eq!(view.id, "42");
        assert_eq!(view.name, "roya");
        assert_eq!(view.access_token, "access-abc");
        assert_eq!(view.expires_at, 5);
        assert_eq!(view.error.as_deref(), Some(REFRESH_ERROR));
    }

    #[test]
    fn test_session_view_serializes_camel_case() {
        let view = SessionView::from(&token(7));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["accessToken"], "access-abc");
        assert_eq!(json["expiresAt"], 7);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_token_error_omitted_when_none() {
        let json = serde_json::to_value(token(1)).unwrap();
        assert!(json.get("error").is_none());
    }
}
