//! Classification of parsed upstream payloads
//!
//! The upstream emits several payload shapes on one stream: custom
//! `{content}` deltas, OpenAI-style `choices[0].delta.content` deltas,
//! `{type:"reasoning"}` chain-of-thought deltas, and in-band business
//! errors (including credit exhaustion). Classification maps each parsed
//! JSON value onto one event; anything unrecognized is ignored.

use serde_json::Value;

use super::messages;

/// Internal error type tag for credit exhaustion
pub const NO_CREDIT: &str = "no_credit";

/// Internal error type tag for generic upstream business failures
pub const UPSTREAM_ERROR: &str = "upstream_error";

/// One classified upstream payload
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// Incremental answer text
    Content(String),
    /// Incremental reasoning text
    Reasoning(String),
    /// In-band business error; terminal, never retried
    BusinessError {
        message: String,
        error_type: String,
        details: Option<Value>,
        remaining_credit: Option<i64>,
    },
    /// Unrecognized payload, skipped without aborting the stream
    Ignored,
}

/// Classify one parsed upstream payload
pub fn classify(value: &Value) -> UpstreamEvent {
    if let Some(event) = classify_business_error(value) {
        return event;
    }

    if value.get("type").and_then(Value::as_str) == Some("reasoning") {
        let text = value
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return UpstreamEvent::Reasoning(text.to_string());
    }

    if let Some(text) = value.get("content").and_then(Value::as_str) {
        return UpstreamEvent::Content(text.to_string());
    }

    if let Some(text) = openai_delta_content(value) {
        return UpstreamEvent::Content(text);
    }

    UpstreamEvent::Ignored
}

/// Detect explicit errors, `success:false`, and credit-exhaustion markers
fn classify_business_error(value: &Value) -> Option<UpstreamEvent> {
    let success_false = value.get("success").and_then(Value::as_bool) == Some(false);
    let error_value = value.get("error").filter(|v| is_truthy(v));
    if error_value.is_none() && !success_false {
        return None;
    }

    let remaining_credit = value.get("remainingCredit").and_then(Value::as_i64);

    if is_credit_exhaustion(value, remaining_credit) {
        return Some(UpstreamEvent::BusinessError {
            message: messages::NO_CREDIT.to_string(),
            error_type: NO_CREDIT.to_string(),
            details: Some(value.clone()),
            remaining_credit: remaining_credit.or(Some(0)),
        });
    }

    let message = error_value
        .and_then(error_text)
        .or_else(|| value.get("message").and_then(error_text))
        .unwrap_or_else(|| messages::UPSTREAM_FAILURE.to_string());

    Some(UpstreamEvent::BusinessError {
        message,
        error_type: UPSTREAM_ERROR.to_string(),
        details: Some(value.clone()),
        remaining_credit,
    })
}

/// Credit exhaustion is marked by an explicit tag or a depleted balance
fn is_credit_exhaustion(value: &Value, remaining_credit: Option<i64>) -> bool {
    let tagged = [value.get("errorType"), value.get("code")]
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .any(|tag| tag == NO_CREDIT);
    tagged || remaining_credit.is_some_and(|credit| credit <= 0)
}

/// Whether an `error` field actually signals an error
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Human-readable text of an error value, if it carries any
fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(_) => value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(value.to_string())),
        _ => None,
    }
}

/// Walk the OpenAI streaming shape: `choices[0].delta.content`
fn openai_delta_content(value: &Value) -> Option<String> {
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}
