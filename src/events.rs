//! Unified event vocabulary and SSE framing
//!
//! Every backend's raw stream is normalized into this single event
//! vocabulary at the adapter boundary. The HTTP layer frames each event as an
//! SSE data record (`data: <json>\n\n`), regardless of which backend produced
//! it.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::ProviderKind;

/// Outcome of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Completed,
    Error,
}

/// Token usage normalized from each backend's distinct field names.
///
/// Fields the backend does not report are left absent, never defaulted to
/// zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_creation_tokens: Option<u64>,
}

impl UsageSummary {
    pub fn is_empty(&self) -> bool {
        self.input_tokens.is_none()
            && self.output_tokens.is_none()
            && self.cached_input_tokens.is_none()
            && self.cache_creation_tokens.is_none()
    }
}

/// The closed set of normalized event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    /// The backend revealed its session identifier.
    #[serde(rename = "session.start")]
    SessionStart {
        session_id: String,
        provider: ProviderKind,
    },

    /// An incremental assistant text fragment. Order-preserving; consumers
    /// concatenate fragments in receipt order.
    #[serde(rename = "text")]
    Text { content: String },

    /// A tool or command invocation began.
    #[serde(rename = "tool.start")]
    ToolStart {
        tool_id: String,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        input: Option<serde_json::Value>,
    },

    /// A tool invocation finished. Always correlated to a prior
    /// `tool.start` with the same `tool_id`.
    #[serde(rename = "tool.done")]
    ToolDone {
        tool_id: String,
        output: String,
        status: ToolStatus,
    },

    /// Terminal-of-turn marker with provider-dependent metrics.
    #[serde(rename = "turn.done")]
    TurnDone {
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_api_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cost_usd: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        num_turns: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<UsageSummary>,
    },

    /// Terminal error for the stream.
    #[serde(rename = "error")]
    Error { message: String },
}

/// A normalized event plus the timestamp at which normalization happened.
///
/// The timestamp is assigned by the gateway, not taken from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl UnifiedEvent {
    /// Stamp a payload with the current time.
    pub fn now(payload: EventPayload) -> Self {
        Self {
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.payload,
            EventPayload::TurnDone { .. } | EventPayload::Error { .. }
        )
    }

    /// Short tag for metrics labels.
    pub fn kind(&self) -> &'static str {
        match self.payload {
            EventPayload::SessionStart { .. } => "session.start",
            EventPayload::Text { .. } => "text",
            EventPayload::ToolStart { .. } => "tool.start",
            EventPayload::ToolDone { .. } => "tool.done",
            EventPayload::TurnDone { .. } => "turn.done",
            EventPayload::Error { .. } => "error",
        }
    }
}

/// Format a unified event as an SSE data frame: `data: {json}\n\n`.
pub fn format_sse_event(event: &UnifiedEvent) -> Bytes {
    // UnifiedEvent contains only serializable data; failure here would be a
    // programming error, so fall back to a generic error frame.
    match serde_json::to_string(event) {
        Ok(json) => Bytes::from(format!("data: {json}\n\n")),
        Err(_) => Bytes::from_static(b"data: {\"type\":\"error\",\"message\":\"serialization failure\"}\n\n"),
    }
}

/// Stringify a tool output value: pass strings through, JSON-encode
/// everything else.
pub fn stringify_output(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_sse_frame_shape() {
        let event = UnifiedEvent::now(EventPayload::Text {
            content: "Hello".to_string(),
        });
        let bytes = format_sse_event(&event);
        let output = std::str::from_utf8(&bytes).unwrap();

        assert!(output.starts_with("data: "), "Should start with 'data: '");
        assert!(output.ends_with("\n\n"), "Should end with double newline");

        let json_str = output.trim_start_matches("data: ").trim_end();
        let parsed: serde_json::Value = serde_json::from_str(json_str).unwrap();
        assert_eq!(parsed["type"], "text");
        assert_eq!(parsed["content"], "Hello");
        assert!(parsed["timestamp"].is_string());
    }

    #[test]
    fn test_event_tags() {
        let event = UnifiedEvent::now(EventPayload::SessionStart {
            session_id: "s1".to_string(),
            provider: ProviderKind::Claude,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "session.start");
        assert_eq!(value["session_id"], "s1");
        assert_eq!(value["provider"], "claude");
    }

    #[test]
    fn test_turn_done_omits_absent_fields() {
        let event = UnifiedEvent::now(EventPayload::TurnDone {
            duration_ms: Some(1500),
            duration_api_ms: None,
            cost_usd: None,
            num_turns: None,
            usage: None,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["duration_ms"], 1500);
        assert!(value.get("cost_usd").is_none());
        assert!(value.get("usage").is_none());
    }

    #[test]
    fn test_usage_summary_never_defaults_to_zero() {
        let usage = UsageSummary {
            input_tokens: Some(10),
            output_tokens: None,
            cached_input_tokens: None,
            cache_creation_tokens: None,
        };
        let value = serde_json::to_value(&usage).unwrap();
        assert_eq!(value["input_tokens"], 10);
        assert!(value.get("output_tokens").is_none());
    }

    #[test]
    fn test_tool_done_status_serialization() {
        let event = UnifiedEvent::now(EventPayload::ToolDone {
            tool_id: "t1".to_string(),
            output: "out".to_string(),
            status: ToolStatus::Error,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool.done");
        assert_eq!(value["status"], "error");
    }

    #[test]
    fn test_terminal_detection() {
        assert!(UnifiedEvent::now(EventPayload::Error {
            message: "boom".to_string()
        })
        .is_terminal());
        assert!(UnifiedEvent::now(EventPayload::TurnDone {
            duration_ms: None,
            duration_api_ms: None,
            cost_usd: None,
            num_turns: None,
            usage: None,
        })
        .is_terminal());
        assert!(!UnifiedEvent::now(EventPayload::Text {
            content: "hi".to_string()
        })
        .is_terminal());
    }

    #[test]
    fn test_stringify_output_passes_strings_through() {
        assert_eq!(stringify_output(&json!("plain text")), "plain text");
    }

    #[test]
    fn test_stringify_output_encodes_structures() {
        assert_eq!(stringify_output(&json!({"code": 1})), r#"{"code":1}"#);
    }
}
