//! Normalized frames emitted to the client
//!
//! The relay shields the browser from upstream payload variety by emitting
//! a small closed set of frame shapes over SSE:
//!
//! ```text
//! data: {"content":"..."}
//! data: {"type":"reasoning","content":"..."}
//! data: {"error":"...","errorType":"...","details":...,"remainingCredit":...}
//! data: [DONE]
//! ```

use bytes::Bytes;
use serde_json::{Value, json};

/// One frame on the client-facing SSE channel
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Incremental answer text
    Content(String),
    /// Incremental chain-of-thought text, rendered separately by the client
    Reasoning(String),
    /// Terminal error; always followed by the [DONE] sentinel
    Error {
        message: String,
        error_type: String,
        details: Option<Value>,
        remaining_credit: Option<i64>,
    },
    /// Terminal sentinel
    Done,
}

impl ClientFrame {
    /// Shorthand for a terminal error frame without extras
    pub fn error(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        ClientFrame::Error {
            message: message.into(),
            error_type: error_type.into(),
            details: None,
            remaining_credit: None,
        }
    }

    /// Encode this frame as one SSE event
    pub fn to_sse(&self) -> Bytes {
        match self {
            ClientFrame::Done => Bytes::from_static(b"data: [DONE]\n\n"),
            ClientFrame::Content(text) => sse_data(&json!({ "content": text })),
            ClientFrame::Reasoning(text) => {
                sse_data(&json!({ "type": "reasoning", "content": text }))
            }
            ClientFrame::Error {
                message,
                error_type,
                details,
                remaining_credit,
            } => {
                let mut payload = json!({ "error": message, "errorType": error_type });
                if let Some(details) = details {
                    payload["details"] = details.clone();
                }
                if let Some(credit) = remaining_credit {
                    payload["remainingCredit"] = json!(credit);
                }
                sse_data(&payload)
            }
        }
    }
}

fn sse_data(payload: &Value) -> Bytes {
    Bytes::from(format!("data: {payload}\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_frame_encoding() {
        let frame = ClientFrame::Content("سلام".to_string());
        let sse = String::from_utf8(frame.to_sse().to_vec()).unwrap();
        assert!(sse.starts_with("data: "));
        assert!(sse.ends_with("\n\n"));
        let payload: Value = serde_json::from_str(sse.trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(payload["content"], "سلام");
    }

    #[test]
    fn test_reasoning_frame_encoding() {
        let frame = ClientFrame::Reasoning("thinking".to_string());
        let sse = String::from_utf8(frame.to_sse().to_vec()).unwrap();
        let payload: Value = serde_json::from_str(sse.trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(payload["type"], "reasoning");
        assert_eq!(payload["content"], "thinking");
    }

    #[test]
    fn test_error_frame_minimal() {
        let frame = ClientFrame::error("oops", "stream_error");
        let sse = String::from_utf8(frame.to_sse().to_vec()).unwrap();
        let payload: Value = serde_json::from_str(sse.trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(payload["error"], "oops");
        assert_eq!(payload["errorType"], "stream_error");
        assert!(payload.get("details").is_none());
        assert!(payload.get("remainingCredit").is_none());
    }

    #[test]
    fn test_error_frame_with_extras() {
        let frame = ClientFrame::Error {
            message: "no credit".to_string(),
            error_type: "no_credit".to_string(),
            details: Some(json!({"plan": "free"})),
            remaining_credit: Some(0),
        };
        let sse = String::from_utf8(frame.to_sse().to_vec()).unwrap();
        let payload: Value = serde_json::from_str(sse.trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(payload["remainingCredit"], 0);
        assert_eq!(payload["details"]["plan"], "free");
    }

    #[test]
    fn test_done_sentinel_is_literal() {
        assert_eq!(&ClientFrame::Done.to_sse()[..], b"data: [DONE]\n\n");
    }
}
