//! Claude CLI stream-json wire types
//!
//! The CLI emits newline-delimited JSON events in `--output-format
//! stream-json` mode. Only the fields the gateway consumes are modeled;
//! unknown event types and blocks deserialize into catch-all variants so new
//! CLI releases cannot break the stream.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CliEvent {
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    Assistant {
        message: CliMessage,
    },
    User {
        message: CliMessage,
    },
    Result(ResultEvent),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct CliMessage {
    #[serde(default)]
    pub content: Vec<CliContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CliContentBlock {
    Text {
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Option<Value>,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
        /// Older CLI builds put the correlation id here.
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        content: Option<Value>,
        #[serde(default)]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct ResultEvent {
    pub subtype: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub duration_api_ms: Option<u64>,
    #[serde(default)]
    pub num_turns: Option<u32>,
    #[serde(default)]
    pub usage: Option<CliUsage>,
}

#[derive(Debug, Deserialize)]
pub struct CliUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_init_event() {
        let json = r#"{"type":"system","subtype":"init","session_id":"abc-123","model":"sonnet"}"#;
        let event: CliEvent = serde_json::from_str(json).unwrap();
        match event {
            CliEvent::System { subtype, session_id } => {
                assert_eq!(subtype.as_deref(), Some("init"));
                assert_eq!(session_id.as_deref(), Some("abc-123"));
            }
            other => panic!("expected system event, got {other:?}"),
        }
    }

    #[test]
    fn test_parses_assistant_blocks() {
        let json = r#"{"type":"assistant","message":{"content":[
            {"type":"text","text":"hello"},
            {"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}},
            {"type":"thinking","thinking":"hmm"}
        ]}}"#;
        let event: CliEvent = serde_json::from_str(json).unwrap();
        let CliEvent::Assistant { message } = event else {
            panic!("expected assistant event");
        };
        assert_eq!(message.content.len(), 3);
        assert!(matches!(message.content[1], CliContentBlock::ToolUse { .. }));
    }

    #[test]
    fn test_parses_tool_result_with_either_id_field() {
        let json = r#"{"type":"user","message":{"content":[
            {"type":"tool_result","tool_use_id":"t1","content":"ok","is_error":false}
        ]}}"#;
        let CliEvent::User { message } = serde_json::from_str(json).unwrap() else {
            panic!("expected user event");
        };
        let CliContentBlock::ToolResult { tool_use_id, .. } = &message.content[0] else {
            panic!("expected tool_result block");
        };
        assert_eq!(tool_use_id.as_deref(), Some("t1"));
    }

    #[test]
    fn test_parses_result_event() {
        let json = r#"{"type":"result","subtype":"success","result":"done","cost_usd":0.05,
            "duration_ms":4200,"duration_api_ms":3100,"num_turns":2,
            "usage":{"input_tokens":100,"output_tokens":50,"cache_read_input_tokens":20}}"#;
        let CliEvent::Result(result) = serde_json::from_str(json).unwrap() else {
            panic!("expected result event");
        };
        assert_eq!(result.subtype, "success");
        assert_eq!(result.cost_usd, Some(0.05));
        assert_eq!(result.usage.unwrap().cache_read_input_tokens, Some(20));
    }

    #[test]
    fn test_unknown_event_type_is_tolerated() {
        let json = r#"{"type":"stream_event","whatever":true}"#;
        let event: CliEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, CliEvent::Unknown));
    }
}
