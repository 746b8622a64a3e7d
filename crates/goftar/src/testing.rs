//! In-process test double for the upstream completion API
//!
//! [`MockUpstream`] replays a scripted queue of connection outcomes and
//! records every request it receives, so tests can assert on retry counts
//! and continuation bodies without a network.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::relay::{ConnectOutcome, FaultKind, StreamFault, StreamRequest, UpstreamClient};

/// One scripted body element
#[derive(Debug, Clone)]
pub enum StreamItem {
    /// Raw bytes delivered as one network read; may end mid-line or even
    /// mid-character
    Chunk(Bytes),
    /// Transport fault raised mid-body
    Fault(FaultKind),
}

/// One scripted connection outcome
#[derive(Debug, Clone)]
enum Connection {
    Stream(Vec<StreamItem>),
    Rejected { status: u16, body: String },
    ConnectFault(FaultKind),
}

/// Scripted [`UpstreamClient`] for tests
#[derive(Default)]
pub struct MockUpstream {
    connections: Mutex<VecDeque<Connection>>,
    requests: Mutex<Vec<StreamRequest>>,
    bearers: Mutex<Vec<String>>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful connection whose body is the given SSE lines,
    /// each delivered as its own read with a trailing blank line
    pub fn push_sse(&self, payloads: &[&str]) {
        let items = payloads
            .iter()
            .map(|p| StreamItem::Chunk(Bytes::from(format!("data: {p}\n\n"))))
            .collect();
        self.push_items(items);
    }

    /// Queue a successful connection with explicit body items
    pub fn push_items(&self, items: Vec<StreamItem>) {
        self.lock_connections().push_back(Connection::Stream(items));
    }

    /// Queue a non-2xx response
    pub fn push_rejected(&self, status: u16, body: &str) {
        self.lock_connections().push_back(Connection::Rejected {
            status,
            body: body.to_string(),
        });
    }

    /// Queue a connection attempt that fails outright
    pub fn push_connect_fault(&self, kind: FaultKind) {
        self.lock_connections()
            .push_back(Connection::ConnectFault(kind));
    }

    /// Every request received so far, in order
    pub fn recorded_requests(&self) -> Vec<StreamRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Bearer token presented with each request, in order
    pub fn recorded_bearers(&self) -> Vec<String> {
        self.bearers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_connections(&self) -> std::sync::MutexGuard<'_, VecDeque<Connection>> {
        self.connections.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn connect(
        &self,
        request: &StreamRequest,
        access_token: &str,
    ) -> Result<ConnectOutcome, StreamFault> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        self.bearers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(access_token.to_string());

        let next = self.lock_connections().pop_front();
        match next {
            Some(Connection::Stream(items)) => {
                let stream = futures::stream::iter(items.into_iter().map(|item| match item {
                    StreamItem::Chunk(bytes) => Ok(bytes),
                    StreamItem::Fault(kind) => {
                        Err(StreamFault::new(kind, "scripted transport fault"))
                    }
                }));
                Ok(ConnectOutcome::Stream(Box::pin(stream)))
            }
            Some(Connection::Rejected { status, body }) => {
                Ok(ConnectOutcome::Rejected { status, body })
            }
            Some(Connection::ConnectFault(kind)) => {
                Err(StreamFault::new(kind, "scripted connect fault"))
            }
            None => Err(StreamFault::new(
                FaultKind::Connect,
                "mock connection queue is empty",
            )),
        }
    }
}
