//! Relay state machine
//!
//! One client request is served by one run of this machine:
//!
//! ```text
//! Connecting -> Streaming -> Done
//!      |            |
//!      |            +-> Reconnecting -> Streaming (continuation)
//!      v            |
//!    Failed <-------+
//! ```
//!
//! Connection establishment retries every transport fault with linear
//! backoff. Mid-stream faults reconnect with exponential backoff and ask
//! the upstream to continue from the content the client already holds.
//! Business errors and upstream rejections are terminal and never retried.
//! Every run ends by emitting the `[DONE]` sentinel exactly once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryConfig;

use super::classify::{UpstreamEvent, classify};
use super::frames::ClientFrame;
use super::messages;
use super::sse::{JsonAccumulator, LineBuffer, SseLine, parse_line};
use super::upstream::{
    ByteStream, ConnectOutcome, FaultKind, StreamFault, StreamRequest, UpstreamClient,
    parse_rejection_body,
};

use futures::StreamExt;

/// Lifecycle of one relayed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Connecting,
    Streaming,
    Reconnecting,
    Done,
    Failed,
}

/// Mutable bookkeeping for one run
#[derive(Debug, Default)]
pub struct StreamSession {
    /// Answer text successfully delivered to the client so far; the
    /// continuation cursor on reconnect
    pub last_successful_chunk: Option<String>,
    /// Mid-stream reconnection attempts consumed so far
    pub streaming_retry_count: u32,
}

/// What one connection produced before it ended
enum PumpOutcome {
    /// The `[DONE]` sentinel arrived, or the body ended cleanly
    Done,
    /// A business error ended the stream; the error frame was already sent
    Terminal,
    /// The transport failed mid-body
    Fault(StreamFault),
}

/// Drives one upstream stream and forwards normalized frames
pub struct Relay {
    upstream: Arc<dyn UpstreamClient>,
    retry: RetryConfig,
}

impl Relay {
    pub fn new(upstream: Arc<dyn UpstreamClient>, retry: RetryConfig) -> Self {
        Self { upstream, retry }
    }

    /// Run the machine to completion, emitting frames on `frames`
    ///
    /// Send failures on `frames` mean the client went away; they are
    /// ignored and the run winds down on its own.
    pub async fn run(
        &self,
        mut request: StreamRequest,
        access_token: &str,
        frames: mpsc::Sender<ClientFrame>,
    ) -> RelayState {
        let mut session = StreamSession::default();

        let mut stream = match self.establish(&request, access_token).await {
            Establish::Stream(stream) => stream,
            Establish::Rejected { status, body } => {
                self.emit_rejection(&frames, status, &body).await;
                return RelayState::Failed;
            }
            Establish::Exhausted(kind) => {
                let _ = frames
                    .send(ClientFrame::error(
                        kind.connect_message(),
                        kind.connect_error_type(),
                    ))
                    .await;
                let _ = frames.send(ClientFrame::Done).await;
                return RelayState::Failed;
            }
        };

        loop {
            match self.pump(&mut stream, &mut session, &frames).await {
                PumpOutcome::Done => {
                    let _ = frames.send(ClientFrame::Done).await;
                    return RelayState::Done;
                }
                PumpOutcome::Terminal => {
                    let _ = frames.send(ClientFrame::Done).await;
                    return RelayState::Failed;
                }
                PumpOutcome::Fault(fault) => {
                    if !fault.kind.is_retryable() {
                        warn!(message = %fault, "Stream failed with non-retryable fault");
                        let _ = frames
                            .send(ClientFrame::error(messages::STREAM_ERROR, "stream_error"))
                            .await;
                        let _ = frames.send(ClientFrame::Done).await;
                        return RelayState::Failed;
                    }

                    if session.streaming_retry_count >= self.retry.stream_attempts {
                        warn!(
                            attempts = session.streaming_retry_count,
                            "Reconnection attempts exhausted"
                        );
                        let _ = frames
                            .send(ClientFrame::error(
                                messages::STREAMING_FAILED,
                                "streaming_failed",
                            ))
                            .await;
                        let _ = frames.send(ClientFrame::Done).await;
                        return RelayState::Failed;
                    }

                    session.streaming_retry_count += 1;
                    let delay = self.reconnect_delay(session.streaming_retry_count, fault.kind);
                    debug!(
                        attempt = session.streaming_retry_count,
                        delay_ms = delay.as_millis() as u64,
                        kind = ?fault.kind,
                        "Reconnecting after mid-stream fault"
                    );
                    sleep(delay).await;

                    request.continue_from = session.last_successful_chunk.clone();
                    request.is_continuation = Some(true);

                    match self.upstream.connect(&request, access_token).await {
                        Ok(ConnectOutcome::Stream(next)) => {
                            stream = next;
                        }
                        Ok(ConnectOutcome::Rejected { status, body }) => {
                            self.emit_rejection(&frames, status, &body).await;
                            return RelayState::Failed;
                        }
                        Err(fault) => {
                            // Counts against the same mid-stream budget
                            let failed: ByteStream =
                                Box::pin(futures::stream::once(async move { Err(fault) }));
                            stream = failed;
                        }
                    }
                }
            }
        }
    }

    /// Initial connection with bounded linear-backoff retries
    async fn establish(&self, request: &StreamRequest, access_token: &str) -> Establish {
        let mut last_kind = FaultKind::Other;
        for attempt in 1..=self.retry.connect_attempts {
            match self.upstream.connect(request, access_token).await {
                Ok(ConnectOutcome::Stream(stream)) => return Establish::Stream(stream),
                Ok(ConnectOutcome::Rejected { status, body }) => {
                    return Establish::Rejected { status, body };
                }
                Err(fault) => {
                    warn!(
                        attempt,
                        max_attempts = self.retry.connect_attempts,
                        message = %fault,
                        "Connection attempt failed"
                    );
                    last_kind = fault.kind;
                    if attempt < self.retry.connect_attempts {
                        sleep(Duration::from_millis(
                            self.retry.connect_backoff_ms * attempt as u64,
                        ))
                        .await;
                    }
                }
            }
        }
        Establish::Exhausted(last_kind)
    }

    /// Read one connection's body, forwarding frames as payloads complete
    async fn pump(
        &self,
        stream: &mut ByteStream,
        session: &mut StreamSession,
        frames: &mpsc::Sender<ClientFrame>,
    ) -> PumpOutcome {
        let mut lines = LineBuffer::new();
        let mut json = JsonAccumulator::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(fault) => return PumpOutcome::Fault(fault),
            };
            for line in lines.push(&chunk) {
                match parse_line(&line) {
                    SseLine::Done => return PumpOutcome::Done,
                    SseLine::Data(data) => {
                        if let Some(value) = json.feed(&data) {
                            if let Some(outcome) =
                                self.forward(&value, session, frames).await
                            {
                                return outcome;
                            }
                        }
                    }
                    SseLine::Ignored => {}
                }
            }
        }

        // Clean EOF without [DONE]; flush any final unterminated line
        if let Some(line) = lines.take_remainder() {
            if let SseLine::Data(data) = parse_line(&line) {
                if let Some(value) = json.feed(&data) {
                    if let Some(outcome) = self.forward(&value, session, frames).await {
                        return outcome;
                    }
                }
            }
        }
        PumpOutcome::Done
    }

    /// Forward one classified payload; Some(_) ends the connection
    async fn forward(
        &self,
        value: &serde_json::Value,
        session: &mut StreamSession,
        frames: &mpsc::Sender<ClientFrame>,
    ) -> Option<PumpOutcome> {
        match classify(value) {
            UpstreamEvent::Content(text) => {
                session
                    .last_successful_chunk
                    .get_or_insert_with(String::new)
                    .push_str(&text);
                let _ = frames.send(ClientFrame::Content(text)).await;
                None
            }
            UpstreamEvent::Reasoning(text) => {
                let _ = frames.send(ClientFrame::Reasoning(text)).await;
                None
            }
            UpstreamEvent::BusinessError {
                message,
                error_type,
                details,
                remaining_credit,
            } => {
                let _ = frames
                    .send(ClientFrame::Error {
                        message,
                        error_type,
                        details,
                        remaining_credit,
                    })
                    .await;
                Some(PumpOutcome::Terminal)
            }
            UpstreamEvent::Ignored => None,
        }
    }

    /// Exponential backoff, with extra settling time after a socket reset
    fn reconnect_delay(&self, attempt: u32, kind: FaultKind) -> Duration {
        let base = self.retry.stream_base_delay_ms * (1u64 << (attempt - 1).min(16));
        let extra = if kind == FaultKind::SocketReset {
            self.retry.socket_reset_extra_delay_ms
        } else {
            0
        };
        Duration::from_millis(base + extra)
    }

    /// Rejection bodies that carry a business error are surfaced as one;
    /// anything else becomes a generic upstream failure
    async fn emit_rejection(
        &self,
        frames: &mpsc::Sender<ClientFrame>,
        status: u16,
        body: &str,
    ) {
        warn!(status, "Upstream rejected the stream request");
        let frame = parse_rejection_body(body)
            .map(|value| classify(&value))
            .and_then(|event| match event {
                UpstreamEvent::BusinessError {
                    message,
                    error_type,
                    details,
                    remaining_credit,
                } => Some(ClientFrame::Error {
                    message,
                    error_type,
                    details,
                    remaining_credit,
                }),
                _ => None,
            })
            .unwrap_or_else(|| {
                ClientFrame::error(messages::UPSTREAM_FAILURE, "upstream_error")
            });
        let _ = frames.send(frame).await;
        let _ = frames.send(ClientFrame::Done).await;
    }
}

enum Establish {
    Stream(ByteStream),
    Rejected { status: u16, body: String },
    Exhausted(FaultKind),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn relay_with(retry: RetryConfig) -> Relay {
        Relay::new(Arc::new(crate::testing::MockUpstream::new()), retry)
    }

    #[test]
    fn test_reconnect_delay_doubles() {
        let relay = relay_with(RetryConfig {
            stream_base_delay_ms: 100,
            socket_reset_extra_delay_ms: 2000,
            ..RetryConfig::default()
        });
        assert_eq!(
            relay.reconnect_delay(1, FaultKind::Timeout),
            Duration::from_millis(100)
        );
        assert_eq!(
            relay.reconnect_delay(2, FaultKind::Timeout),
            Duration::from_millis(200)
        );
        assert_eq!(
            relay.reconnect_delay(3, FaultKind::Timeout),
            Duration::from_millis(400)
        );
    }

    #[test]
    fn test_reconnect_delay_socket_reset_extra() {
        let relay = relay_with(RetryConfig {
            stream_base_delay_ms: 100,
            socket_reset_extra_delay_ms: 2000,
            ..RetryConfig::default()
        });
        assert_eq!(
            relay.reconnect_delay(1, FaultKind::SocketReset),
            Duration::from_millis(2100)
        );
    }

    #[test]
    fn test_reconnect_delay_exponent_is_capped() {
        let relay = relay_with(RetryConfig {
            stream_base_delay_ms: 1,
            socket_reset_extra_delay_ms: 0,
            ..RetryConfig::default()
        });
        // Large attempt numbers must not overflow the shift
        let _ = relay.reconnect_delay(64, FaultKind::Timeout);
    }
}
