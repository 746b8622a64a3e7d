//! HTTP server: session endpoints and the streaming chat relay
//!
//! Routes:
//! - `GET  /health`             - liveness probe
//! - `POST /api/auth/login`     - phone + password sign-in
//! - `POST /api/auth/token`     - passthrough sign-in with existing tokens
//! - `GET  /api/auth/session`   - read the session, refreshing if expired
//! - `POST /api/auth/logout`    - clear the session cookie
//! - `POST /api/chat/stream`    - relay one chat completion as SSE

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::Response,
    routing::{get, post},
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;

use crate::auth::{Credentials, SessionCodec, SessionToken, SessionTokenManager, SessionView};
use crate::config::Config;
use crate::error::{GoftarError, Result};
use crate::relay::{ClientFrame, HttpUpstream, Relay, StreamRequest, UpstreamClient, messages};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Full daemon configuration
    pub config: Config,
    /// Session lifecycle against the upstream auth API
    pub manager: SessionTokenManager,
    /// Signed-cookie codec
    pub codec: SessionCodec,
    /// Streaming upstream connection factory
    pub upstream: Arc<dyn UpstreamClient>,
}

impl AppState {
    /// Build the state with an injected upstream client
    pub fn with_upstream(config: Config, upstream: Arc<dyn UpstreamClient>) -> Result<Self> {
        let manager = SessionTokenManager::new(&config.upstream, &config.session)?;
        let codec = SessionCodec::new(&config.session)?;
        Ok(Self {
            config,
            manager,
            codec,
            upstream,
        })
    }
}

/// The relay daemon
pub struct RelayServer {
    config: Config,
}

impl RelayServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Start the server and listen for requests
    pub async fn serve(&self) -> Result<()> {
        let upstream = Arc::new(HttpUpstream::new(&self.config.upstream)?);
        let state = Arc::new(AppState::with_upstream(self.config.clone(), upstream)?);

        let app = create_router(state);

        let addr: SocketAddr = self
            .config
            .server
            .listen_addr
            .parse()
            .map_err(|e| GoftarError::Config(format!("Invalid listen address: {e}")))?;

        tracing::info!("Starting relay server on {addr}");
        tracing::info!("Upstream completion API: {}", self.config.upstream.base_api_url);
        tracing::info!("Upstream auth API: {}", self.config.upstream.auth_api_url);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GoftarError::Relay(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GoftarError::Relay(format!("Server error: {e}")))?;

        tracing::info!("Relay server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/token", post(token_handler))
        .route("/api/auth/session", get(session_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint - returns JSON status
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Phone + password sign-in body
#[derive(Debug, Deserialize)]
struct LoginBody {
    mobile: String,
    pass: String,
}

/// Passthrough sign-in body: tokens the client obtained on its own
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBody {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    username: String,
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginBody>,
) -> Response<Body> {
    let credentials = Credentials::Password {
        mobile: body.mobile,
        pass: body.pass,
    };
    sign_in(&state, credentials).await
}

async fn token_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenBody>,
) -> Response<Body> {
    let credentials = Credentials::Passthrough {
        user_id: body.user_id,
        username: body.username,
        access_token: body.access_token,
        refresh_token: body.refresh_token,
        expires_at: body.expires_at,
    };
    sign_in(&state, credentials).await
}

/// Shared sign-in flow: authorize, build the token, set the cookie
async fn sign_in(state: &AppState, credentials: Credentials) -> Response<Body> {
    let Some(user) = state.manager.authorize(credentials).await else {
        return create_error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            messages::INVALID_CREDENTIALS,
        );
    };
    let token = state.manager.on_sign_in(&user);
    session_response(state, &token)
}

/// Read the session, refreshing the access token once if it has expired
///
/// A failed refresh still answers 200: the view carries the error flag and
/// the client reacts by signing the user out.
async fn session_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response<Body> {
    let Some(token) = extract_session(&state, &headers) else {
        return create_error_response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            messages::UNAUTHORIZED,
        );
    };
    let token = state.manager.ensure_fresh(token).await;
    session_response(&state, &token)
}

async fn logout_handler(State(state): State<Arc<AppState>>) -> Response<Body> {
    let cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        state.config.session.cookie_name
    );
    json_response(
        StatusCode::OK,
        serde_json::json!({"status": "ok"}),
        Some(cookie),
    )
}

/// Client request body for one chat completion
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatStreamBody {
    text: String,
    chat_id: String,
    model_type: String,
    #[serde(default)]
    sub_model: Option<String>,
    /// Stable per-conversation code; generated when the client omits it
    #[serde(default)]
    chat_code: Option<String>,
    #[serde(default)]
    web_search: bool,
    #[serde(default)]
    reasoning: bool,
}

/// Relay one chat completion to the client as SSE
async fn chat_stream_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatStreamBody>,
) -> Response<Body> {
    let Some(token) = extract_session(&state, &headers) else {
        return create_error_response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            messages::UNAUTHORIZED,
        );
    };
    let token = state.manager.ensure_fresh(token).await;
    if token.has_refresh_error() {
        return create_error_response(
            StatusCode::UNAUTHORIZED,
            "session_expired",
            messages::UNAUTHORIZED,
        );
    }

    let request = StreamRequest {
        prompt: body.text,
        chat_id: body.chat_id,
        chat_code: body
            .chat_code
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        model_type: body.model_type,
        sub_model: body.sub_model,
        web_search: body.web_search,
        reasoning: body.reasoning,
        stream: true,
        continue_from: None,
        is_continuation: None,
    };

    // Headers are still uncommitted here, so a refresh performed above
    // (possibly rotating the refresh token) can ride back on the response
    let session_cookie = match build_session_cookie(&state, &token) {
        Ok(cookie) => Some(cookie),
        Err(e) => {
            tracing::error!("Failed to sign session cookie: {e}");
            None
        }
    };

    let relay = Relay::new(state.upstream.clone(), state.config.retry.clone());
    let access_token = token.access_token.clone();
    let (tx, rx) = mpsc::channel::<ClientFrame>(32);
    tokio::spawn(async move {
        let outcome = relay.run(request, &access_token, tx).await;
        tracing::debug!(?outcome, "Relay run finished");
    });

    let body_stream =
        ReceiverStream::new(rx).map(|frame| Ok::<Bytes, Infallible>(frame.to_sse()));

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive");
    if let Some(cookie) = session_cookie {
        builder = builder.header(header::SET_COOKIE, cookie);
    }
    builder
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| fallback_500())
}

/// Locate the session token: cookie first, then a bearer header carrying
/// the same signed value
fn extract_session(state: &AppState, headers: &HeaderMap) -> Option<SessionToken> {
    if let Some(value) = cookie_value(headers, &state.config.session.cookie_name) {
        if let Some(token) = state.codec.decode(&value) {
            return Some(token);
        }
    }
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let value = auth.strip_prefix("Bearer ")?;
    state.codec.decode(value)
}

/// Extract one cookie's value from the Cookie header
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Sign the token into a Set-Cookie header value
fn build_session_cookie(state: &AppState, token: &SessionToken) -> crate::error::Result<String> {
    let value = state.codec.encode(token)?;
    Ok(format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        state.config.session.cookie_name, value, state.config.session.cookie_ttl_secs
    ))
}

/// 200 response carrying the session view and a refreshed cookie
fn session_response(state: &AppState, token: &SessionToken) -> Response<Body> {
    let cookie = match build_session_cookie(state, token) {
        Ok(cookie) => cookie,
        Err(e) => {
            tracing::error!("Failed to sign session cookie: {e}");
            return create_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "session_encoding_failed",
                "Failed to encode session",
            );
        }
    };
    let view = SessionView::from(token);
    match serde_json::to_value(&view) {
        Ok(body) => json_response(StatusCode::OK, body, Some(cookie)),
        Err(e) => {
            tracing::error!("Failed to serialize session view: {e}");
            fallback_500()
        }
    }
}

fn json_response(
    status: StatusCode,
    body: serde_json::Value,
    set_cookie: Option<String>,
) -> Response<Body> {
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = set_cookie {
        builder = builder.header(header::SET_COOKIE, cookie);
    }
    builder
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| fallback_500())
}

fn create_error_response(status: StatusCode, error_type: &str, message: &str) -> Response<Body> {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
        }
    });
    json_response(status, body, None)
}

fn fallback_500() -> Response<Body> {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(Body::empty())
        .unwrap_or_default()
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
