//! Upstream connection seam
//!
//! The relay state machine drives an [`UpstreamClient`], which hides the
//! HTTP details of `POST {base_api_url}/process-text-stream` and turns
//! transport failures into typed [`FaultKind`]s. A trait seam keeps the
//! machine testable without a network.

use std::error::Error as StdError;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::config::UpstreamConfig;
use crate::error::{GoftarError, Result};

use super::messages;

/// Typed transport fault classification
///
/// Faults are classified from the error values the HTTP client reports,
/// never by sniffing error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The attempt exceeded its deadline
    Timeout,
    /// TCP/TLS connection establishment failed
    Connect,
    /// The peer reset or closed the socket mid-transfer
    SocketReset,
    /// The transfer was aborted before completion
    Aborted,
    /// Anything else; not retried mid-stream
    Other,
}

impl FaultKind {
    /// Whether a mid-stream reconnection attempt is worthwhile
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FaultKind::Timeout | FaultKind::Connect | FaultKind::SocketReset | FaultKind::Aborted
        )
    }

    /// The `errorType` tag reported when connection establishment fails
    pub fn connect_error_type(&self) -> &'static str {
        match self {
            FaultKind::Timeout => "timeout",
            FaultKind::Connect | FaultKind::SocketReset => "network_error",
            FaultKind::Aborted | FaultKind::Other => "connection_error",
        }
    }

    /// The Persian message paired with [`connect_error_type`](Self::connect_error_type)
    pub fn connect_message(&self) -> &'static str {
        match self {
            FaultKind::Timeout => messages::TIMEOUT,
            FaultKind::Connect | FaultKind::SocketReset => messages::NETWORK_ERROR,
            FaultKind::Aborted | FaultKind::Other => messages::CONNECTION_ERROR,
        }
    }
}

/// One transport fault, carrying its classification
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct StreamFault {
    pub kind: FaultKind,
    pub message: String,
}

impl StreamFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for StreamFault {
    fn from(err: reqwest::Error) -> Self {
        Self {
            kind: classify_reqwest_error(&err),
            message: err.to_string(),
        }
    }
}

/// Map a reqwest error onto a [`FaultKind`] via its typed predicates and
/// the `io::Error` buried in its source chain
pub fn classify_reqwest_error(err: &reqwest::Error) -> FaultKind {
    if err.is_timeout() {
        return FaultKind::Timeout;
    }
    if err.is_connect() {
        return FaultKind::Connect;
    }
    if let Some(kind) = io_error_kind(err) {
        return match kind {
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe => {
                FaultKind::SocketReset
            }
            std::io::ErrorKind::ConnectionAborted | std::io::ErrorKind::UnexpectedEof => {
                FaultKind::Aborted
            }
            std::io::ErrorKind::TimedOut => FaultKind::Timeout,
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotConnected => {
                FaultKind::Connect
            }
            _ => FaultKind::Other,
        };
    }
    FaultKind::Other
}

fn io_error_kind(err: &dyn StdError) -> Option<std::io::ErrorKind> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = cause.source();
    }
    None
}

/// Body of `POST /process-text-stream`
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    pub prompt: String,
    pub chat_id: String,
    pub chat_code: String,
    pub model_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_model: Option<String>,
    pub web_search: bool,
    pub reasoning: bool,
    /// Always true; the upstream serves this endpoint in streaming mode only
    pub stream: bool,
    /// Answer text the client already holds; set on reconnects so the
    /// upstream resumes generation instead of restarting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_continuation: Option<bool>,
}

/// Raw byte stream of one upstream connection
pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, StreamFault>> + Send>>;

/// Result of one connection attempt that reached the upstream
pub enum ConnectOutcome {
    /// 2xx response; body follows as a byte stream
    Stream(ByteStream),
    /// Non-2xx response; terminal, never retried
    Rejected { status: u16, body: String },
}

/// Transport seam the relay state machine drives
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Open one streaming connection for `request`
    async fn connect(
        &self,
        request: &StreamRequest,
        access_token: &str,
    ) -> std::result::Result<ConnectOutcome, StreamFault>;
}

/// Production client for the completion API
pub struct HttpUpstream {
    client: reqwest::Client,
    stream_url: String,
    stream_timeout: Duration,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        if config.base_api_url.is_empty() {
            return Err(GoftarError::Config(
                "upstream.base_api_url is not set".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GoftarError::Upstream(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            stream_url: format!(
                "{}/process-text-stream",
                config.base_api_url.trim_end_matches('/')
            ),
            stream_timeout: Duration::from_secs(config.stream_timeout_secs),
        })
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn connect(
        &self,
        request: &StreamRequest,
        access_token: &str,
    ) -> std::result::Result<ConnectOutcome, StreamFault> {
        let response = self
            .client
            .post(&self.stream_url)
            .bearer_auth(access_token)
            .json(request)
            .timeout(self.stream_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(ConnectOutcome::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let stream = response.bytes_stream().map_err(StreamFault::from);
        Ok(ConnectOutcome::Stream(Box::pin(stream)))
    }
}

/// Parse the body of a rejected connection into a JSON value, if it is one
pub fn parse_rejection_body(body: &str) -> Option<Value> {
    serde_json::from_str(body).ok()
}
