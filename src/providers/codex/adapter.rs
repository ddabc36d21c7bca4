//! Codex JSONL normalization
//!
//! Command executions map onto the tool lifecycle with the shell command as
//! input. File reads and writes have no started/completed pair on the wire
//! worth waiting for, so a completed file item becomes a synthetic
//! start-then-done pair. Reasoning items stay internal.

use std::collections::HashSet;

use serde_json::json;

use crate::events::{EventPayload, ToolStatus, UnifiedEvent, UsageSummary};
use crate::providers::{ProviderKind, TurnNormalizer};

use super::protocol::{CodexEvent, CodexItem};

#[derive(Debug, Default)]
pub struct CodexNormalizer {
    pending_commands: HashSet<String>,
}

impl CodexNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn file_tool_pair(
        &self,
        name: &str,
        id: String,
        path: Option<String>,
    ) -> Vec<UnifiedEvent> {
        let input = path.as_ref().map(|p| json!({ "path": p }));
        vec![
            UnifiedEvent::now(EventPayload::ToolStart {
                tool_id: id.clone(),
                name: name.to_string(),
                input,
            }),
            UnifiedEvent::now(EventPayload::ToolDone {
                tool_id: id,
                output: path.unwrap_or_default(),
                status: ToolStatus::Completed,
            }),
        ]
    }
}

impl TurnNormalizer for CodexNormalizer {
    fn feed(&mut self, line: &str) -> Vec<UnifiedEvent> {
        let event: CodexEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unparseable backend line");
                return vec![];
            }
        };

        match event {
            CodexEvent::ThreadStarted { thread_id } => {
                vec![UnifiedEvent::now(EventPayload::SessionStart {
                    session_id: thread_id,
                    provider: ProviderKind::Codex,
                })]
            }

            CodexEvent::ItemStarted { item } => match item {
                CodexItem::CommandExecution { id, command, .. } => {
                    self.pending_commands.insert(id.clone());
                    vec![UnifiedEvent::now(EventPayload::ToolStart {
                        tool_id: id,
                        name: "shell".to_string(),
                        input: Some(json!({ "command": command })),
                    })]
                }
                _ => vec![],
            },

            CodexEvent::ItemCompleted { item } => match item {
                CodexItem::AgentMessage { text, .. } => text
                    .filter(|text| !text.is_empty())
                    .map(|text| vec![UnifiedEvent::now(EventPayload::Text { content: text })])
                    .unwrap_or_default(),

                CodexItem::CommandExecution {
                    id,
                    aggregated_output,
                    exit_code,
                    status,
                    ..
                } => {
                    if !self.pending_commands.remove(&id) {
                        tracing::debug!(tool_id = %id, "Dropping command completion without start");
                        return vec![];
                    }
                    let failed = exit_code.map(|code| code != 0).unwrap_or(false)
                        || status.as_deref() == Some("failed");
                    vec![UnifiedEvent::now(EventPayload::ToolDone {
                        tool_id: id,
                        output: aggregated_output.unwrap_or_default(),
                        status: if failed {
                            ToolStatus::Error
                        } else {
                            ToolStatus::Completed
                        },
                    })]
                }

                CodexItem::FileWrite { id, path } => self.file_tool_pair("file_write", id, path),
                CodexItem::FileRead { id, path } => self.file_tool_pair("file_read", id, path),

                CodexItem::Reasoning { .. } | CodexItem::Unknown => vec![],
            },

            CodexEvent::TurnCompleted { usage } => {
                vec![UnifiedEvent::now(EventPayload::TurnDone {
                    duration_ms: None,
                    duration_api_ms: None,
                    cost_usd: None,
                    num_turns: None,
                    usage: usage.map(|usage| UsageSummary {
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                        cached_input_tokens: usage.cached_input_tokens,
                        cache_creation_tokens: None,
                    }),
                })]
            }

            CodexEvent::TurnFailed { error } => {
                vec![UnifiedEvent::now(EventPayload::Error {
                    message: error
                        .and_then(|e| e.message)
                        .unwrap_or_else(|| "Turn failed".to_string()),
                })]
            }

            CodexEvent::Error { message } => {
                vec![UnifiedEvent::now(EventPayload::Error { message })]
            }

            CodexEvent::TurnStarted | CodexEvent::Unknown => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_thread_started_becomes_session_start() {
        let mut n = CodexNormalizer::new();
        let events = n.feed(r#"{"type":"thread.started","thread_id":"th-9"}"#);
        assert!(matches!(
            &events[0].payload,
            EventPayload::SessionStart { session_id, provider: ProviderKind::Codex }
                if session_id == "th-9"
        ));
    }

    #[test]
    fn test_command_lifecycle() {
        let mut n = CodexNormalizer::new();
        let start = n.feed(
            r#"{"type":"item.started","item":{"item_type":"command_execution","id":"c1","command":"cargo check"}}"#,
        );
        assert!(matches!(
            &start[0].payload,
            EventPayload::ToolStart { tool_id, name, input }
                if tool_id == "c1" && name == "shell"
                    && input.as_ref().unwrap()["command"] == "cargo check"
        ));

        let done = n.feed(
            r#"{"type":"item.completed","item":{"item_type":"command_execution","id":"c1","command":"cargo check","aggregated_output":"ok","exit_code":0}}"#,
        );
        assert!(matches!(
            &done[0].payload,
            EventPayload::ToolDone { tool_id, output, status: ToolStatus::Completed }
                if tool_id == "c1" && output == "ok"
        ));
    }

    #[test]
    fn test_nonzero_exit_maps_to_error_status() {
        let mut n = CodexNormalizer::new();
        n.feed(
            r#"{"type":"item.started","item":{"item_type":"command_execution","id":"c2","command":"false"}}"#,
        );
        let done = n.feed(
            r#"{"type":"item.completed","item":{"item_type":"command_execution","id":"c2","command":"false","exit_code":1}}"#,
        );
        assert!(matches!(
            &done[0].payload,
            EventPayload::ToolDone { status: ToolStatus::Error, .. }
        ));
    }

    #[test]
    fn test_orphan_command_completion_dropped() {
        let mut n = CodexNormalizer::new();
        let events = n.feed(
            r#"{"type":"item.completed","item":{"item_type":"command_execution","id":"ghost","command":"ls","exit_code":0}}"#,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_file_write_synthesizes_pair() {
        let mut n = CodexNormalizer::new();
        let events = n.feed(
            r#"{"type":"item.completed","item":{"item_type":"file_write","id":"f1","path":"src/main.rs"}}"#,
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0].payload,
            EventPayload::ToolStart { name, .. } if name == "file_write"
        ));
        assert!(matches!(
            &events[1].payload,
            EventPayload::ToolDone { tool_id, status: ToolStatus::Completed, .. }
                if tool_id == "f1"
        ));
    }

    #[test]
    fn test_agent_message_becomes_text() {
        let mut n = CodexNormalizer::new();
        let events = n.feed(
            r#"{"type":"item.completed","item":{"item_type":"agent_message","id":"m1","text":"done!"}}"#,
        );
        assert!(matches!(
            &events[0].payload,
            EventPayload::Text { content } if content == "done!"
        ));
    }

    #[test]
    fn test_turn_completed_maps_usage() {
        let mut n = CodexNormalizer::new();
        let events = n.feed(
            r#"{"type":"turn.completed","usage":{"input_tokens":9,"cached_input_tokens":4,"output_tokens":2}}"#,
        );
        let EventPayload::TurnDone { usage, cost_usd, .. } = &events[0].payload else {
            panic!("expected turn.done");
        };
        let usage = usage.as_ref().unwrap();
        assert_eq!(usage.cached_input_tokens, Some(4));
        assert_eq!(usage.cache_creation_tokens, None);
        assert_eq!(*cost_usd, None);
    }

    #[test]
    fn test_error_event_passes_through() {
        let mut n = CodexNormalizer::new();
        let events = n.feed(r#"{"type":"error","message":"quota exceeded"}"#);
        assert!(matches!(
            &events[0].payload,
            EventPayload::Error { message } if message == "quota exceeded"
        ));
    }

    #[test]
    fn test_reasoning_is_suppressed() {
        let mut n = CodexNormalizer::new();
        let events = n.feed(
            r#"{"type":"item.completed","item":{"item_type":"reasoning","id":"r1"}}"#,
        );
        assert!(events.is_empty());
    }
}
