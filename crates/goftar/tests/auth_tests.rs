//! Integration tests for the session/token lifecycle
//!
//! Exercises sign-in and refresh against a mocked upstream auth API, and
//! the signed-cookie codec roundtrips.

use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use goftar::auth::{
    Credentials, REFRESH_ERROR, SessionCodec, SessionToken, SessionTokenManager, now_ms,
};
use goftar::config::{SessionConfig, UpstreamConfig};

fn manager(auth_api_url: String) -> SessionTokenManager {
    let upstream = UpstreamConfig {
        auth_api_url,
        ..UpstreamConfig::default()
    };
    SessionTokenManager::new(&upstream, &SessionConfig::default()).unwrap()
}

fn token(expires_at: i64) -> SessionToken {
    SessionToken {
        id: "42".to_string(),
        name: "roya".to_string(),
        access_token: "old-access".to_string(),
        refresh_token: "old-refresh".to_string(),
        expires_at,
        error: None,
    }
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_json(serde_json::json!({
            "mobile": "09120000000",
            "pass": "secret"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": "fresh-access",
            "refreshToken": "fresh-refresh",
            "expiresIn": 900,
            "needUserData": {"ID": 42, "username": "roya"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let before = now_ms();
    let user = manager(server.uri())
        .authorize(Credentials::Password {
            mobile: "09120000000".to_string(),
            pass: "secret".to_string(),
        })
        .await
        .expect("login should succeed");

    assert_eq!(user.id, "42");
    assert_eq!(user.name, "roya");
    assert_eq!(user.access_token, "fresh-access");
    assert_eq!(user.refresh_token, "fresh-refresh");
    assert!(user.expires_at >= before + 900_000);
    assert!(user.expires_at <= now_ms() + 900_000);
}

#[tokio::test]
async fn test_login_rejected_status_returns_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = manager(server.uri())
        .authorize(Credentials::Password {
            mobile: "09120000000".to_string(),
            pass: "wrong".to_string(),
        })
        .await;
    assert!(result.is_none());
}

#[tokio::test]
async fn test_login_missing_access_token_returns_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "needUserData": {"ID": 42, "username": "roya"}
        })))
        .mount(&server)
        .await;

    let result = manager(server.uri())
        .authorize(Credentials::Password {
            mobile: "09120000000".to_string(),
            pass: "secret".to_string(),
        })
        .await;
    assert!(result.is_none());
}

#[tokio::test]
async fn test_login_missing_user_data_returns_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": "fresh-access"
        })))
        .mount(&server)
        .await;

    let result = manager(server.uri())
        .authorize(Credentials::Password {
            mobile: "09120000000".to_string(),
            pass: "secret".to_string(),
        })
        .await;
    assert!(result.is_none());
}

// =============================================================================
// Refresh
// =============================================================================

#[tokio::test]
async fn test_refresh_rotates_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/refresh-token"))
        .and(body_json(serde_json::json!({"refreshToken": "old-refresh"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": "new-access",
            "refreshToken": "new-refresh",
            "expiresIn": 600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let before = now_ms();
    let refreshed = manager(server.uri())
        .refresh_access_token(token(0))
        .await;

    assert_eq!(refreshed.access_token, "new-access");
    assert_eq!(refreshed.refresh_token, "new-refresh");
    assert!(refreshed.expires_at >= before + 600_000);
    assert!(refreshed.error.is_none());
}

#[tokio::test]
async fn test_refresh_keeps_old_refresh_token_when_not_rotated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": "new-access",
            "expiresIn": 600
        })))
        .mount(&server)
        .await;

    let refreshed = manager(server.uri())
        .refresh_access_token(token(0))
        .await;

    assert_eq!(refreshed.access_token, "new-access");
    assert_eq!(refreshed.refresh_token, "old-refresh");
}

#[tokio::test]
async fn test_refresh_failure_flags_token_and_keeps_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/refresh-token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let refreshed = manager(server.uri())
        .refresh_access_token(token(0))
        .await;

    assert_eq!(refreshed.access_token, "old-access");
    assert_eq!(refreshed.refresh_token, "old-refresh");
    assert_eq!(refreshed.error.as_deref(), Some(REFRESH_ERROR));
}

#[tokio::test]
async fn test_refresh_clears_previous_error_flag_on_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": "new-access",
            "expiresIn": 600
        })))
        .mount(&server)
        .await;

    let mut stale = token(0);
    stale.error = Some(REFRESH_ERROR.to_string());
    let refreshed = manager(server.uri()).refresh_access_token(stale).await;
    assert!(refreshed.error.is_none());
}

// =============================================================================
// Refresh-on-read
// =============================================================================

#[tokio::test]
async fn test_ensure_fresh_does_not_refresh_valid_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/refresh-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let valid = token(now_ms() + 60_000);
    let result = manager(server.uri()).ensure_fresh(valid.clone()).await;
    assert_eq!(result, valid);
}

#[tokio::test]
async fn test_ensure_fresh_refreshes_expired_token_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": "new-access",
            "expiresIn": 600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = manager(server.uri()).ensure_fresh(token(0)).await;
    assert_eq!(result.access_token, "new-access");
}

// =============================================================================
// Cookie codec
// =============================================================================

#[test]
fn test_cookie_roundtrip_through_codec() {
    let config = SessionConfig {
        secret: "integration-test-secret-key".to_string(),
        ..SessionConfig::default()
    };
    let codec = SessionCodec::new(&config).unwrap();

    let original = token(now_ms() + 60_000);
    let cookie = codec.encode(&original).unwrap();
    assert_eq!(codec.decode(&cookie).unwrap(), original);
}

#[test]
fn test_cookie_cross_secret_rejected() {
    let encode_config = SessionConfig {
        secret: "secret-one".to_string(),
        ..SessionConfig::default()
    };
    let decode_config = SessionConfig {
        secret: "secret-two".to_string(),
        ..SessionConfig::default()
    };
    let cookie = SessionCodec::new(&encode_config)
        .unwrap()
        .encode(&token(now_ms() + 60_000))
        .unwrap();
    assert!(SessionCodec::new(&decode_config)
        .unwrap()
        .decode(&cookie)
        .is_none());
}
