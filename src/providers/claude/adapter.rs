//! Claude stream-json normalization
//!
//! Maps CLI events onto the unified vocabulary. Tool results are correlated
//! against pending tool starts; a result that matches no pending start is
//! dropped rather than surfaced.

use std::collections::HashSet;

use crate::events::{stringify_output, EventPayload, ToolStatus, UnifiedEvent};
use crate::providers::{ProviderKind, TurnNormalizer};

use super::protocol::{CliContentBlock, CliEvent, ResultEvent};

#[derive(Debug, Default)]
pub struct ClaudeNormalizer {
    pending_tools: HashSet<String>,
    announced: bool,
}

impl ClaudeNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn on_result(&mut self, result: ResultEvent) -> UnifiedEvent {
        if result.subtype == "success" {
            UnifiedEvent::now(EventPayload::TurnDone {
                duration_ms: result.duration_ms,
                duration_api_ms: result.duration_api_ms,
                cost_usd: result.cost_usd,
                num_turns: result.num_turns,
                usage: result.usage.map(|usage| crate::events::UsageSummary {
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    cached_input_tokens: usage.cache_read_input_tokens,
                    cache_creation_tokens: usage.cache_creation_input_tokens,
                }),
            })
        } else {
            UnifiedEvent::now(EventPayload::Error {
                message: result
                    .result
                    .unwrap_or_else(|| format!("Backend reported {}", result.subtype)),
            })
        }
    }
}

impl TurnNormalizer for ClaudeNormalizer {
    fn feed(&mut self, line: &str) -> Vec<UnifiedEvent> {
        let event: CliEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unparseable backend line");
                return vec![];
            }
        };

        let mut out = Vec::new();
        match event {
            CliEvent::System { subtype, session_id } => {
                if !self.announced && subtype.as_deref() == Some("init") {
                    if let Some(id) = session_id {
                        self.announced = true;
                        out.push(UnifiedEvent::now(EventPayload::SessionStart {
                            session_id: id,
                            provider: ProviderKind::Claude,
                        }));
                    }
                }
            }
            CliEvent::Assistant { message } => {
                for block in message.content {
                    match block {
                        CliContentBlock::Text { text } => {
                            out.push(UnifiedEvent::now(EventPayload::Text { content: text }));
                        }
                        CliContentBlock::ToolUse { id, name, input } => {
                            self.pending_tools.insert(id.clone());
                            out.push(UnifiedEvent::now(EventPayload::ToolStart {
                                tool_id: id,
                                name,
                                input,
                            }));
                        }
                        // Thinking stays internal to the backend.
                        CliContentBlock::Thinking { .. } => {}
                        _ => {}
                    }
                }
            }
            CliEvent::User { message } => {
                for block in message.content {
                    if let CliContentBlock::ToolResult {
                        tool_use_id,
                        id,
                        content,
                        is_error,
                    } = block
                    {
                        let Some(tool_id) = tool_use_id.or(id) else {
                            continue;
                        };
                        if !self.pending_tools.remove(&tool_id) {
                            tracing::debug!(tool_id = %tool_id, "Dropping orphan tool result");
                            continue;
                        }
                        out.push(UnifiedEvent::now(EventPayload::ToolDone {
                            tool_id,
                            output: content.as_ref().map(stringify_output).unwrap_or_default(),
                            status: if is_error.unwrap_or(false) {
                                ToolStatus::Error
                            } else {
                                ToolStatus::Completed
                            },
                        }));
                    }
                }
            }
            CliEvent::Result(result) => {
                out.push(self.on_result(result));
            }
            CliEvent::Unknown => {}
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn feed_all(normalizer: &mut ClaudeNormalizer, lines: &[&str]) -> Vec<UnifiedEvent> {
        lines
            .iter()
            .flat_map(|line| normalizer.feed(line))
            .collect()
    }

    #[test]
    fn test_init_becomes_session_start_once() {
        let mut n = ClaudeNormalizer::new();
        let events = feed_all(
            &mut n,
            &[
                r#"{"type":"system","subtype":"init","session_id":"s1"}"#,
                r#"{"type":"system","subtype":"init","session_id":"s1"}"#,
            ],
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0].payload,
            EventPayload::SessionStart { session_id, provider: ProviderKind::Claude }
                if session_id == "s1"
        ));
    }

    #[test]
    fn test_tool_lifecycle_correlates() {
        let mut n = ClaudeNormalizer::new();
        let events = feed_all(
            &mut n,
            &[
                r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}}]}}"#,
                r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"file.txt","is_error":false}]}}"#,
            ],
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0].payload,
            EventPayload::ToolStart { tool_id, name, .. } if tool_id == "t1" && name == "Bash"
        ));
        assert!(matches!(
            &events[1].payload,
            EventPayload::ToolDone { tool_id, output, status: ToolStatus::Completed }
                if tool_id == "t1" && output == "file.txt"
        ));
    }

    #[test]
    fn test_orphan_tool_result_is_dropped() {
        let mut n = ClaudeNormalizer::new();
        let events = n.feed(
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"ghost","content":"x"}]}}"#,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_tool_result_falls_back_to_id_field() {
        let mut n = ClaudeNormalizer::new();
        n.feed(
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t2","name":"Read"}]}}"#,
        );
        let events = n.feed(
            r#"{"type":"user","message":{"content":[{"type":"tool_result","id":"t2","content":"body"}]}}"#,
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0].payload,
            EventPayload::ToolDone { tool_id, .. } if tool_id == "t2"
        ));
    }

    #[test]
    fn test_structured_tool_output_is_stringified() {
        let mut n = ClaudeNormalizer::new();
        n.feed(
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t3","name":"Bash"}]}}"#,
        );
        let events = n.feed(
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t3","content":[{"type":"text","text":"hi"}]}]}}"#,
        );
        let EventPayload::ToolDone { output, .. } = &events[0].payload else {
            panic!("expected tool.done");
        };
        assert_eq!(output, r#"[{"type":"text","text":"hi"}]"#);
    }

    #[test]
    fn test_success_result_becomes_turn_done() {
        let mut n = ClaudeNormalizer::new();
        let events = n.feed(
            r#"{"type":"result","subtype":"success","cost_usd":0.01,"duration_ms":900,"num_turns":1,"usage":{"input_tokens":5,"output_tokens":7}}"#,
        );
        let EventPayload::TurnDone {
            cost_usd,
            duration_ms,
            usage,
            ..
        } = &events[0].payload
        else {
            panic!("expected turn.done");
        };
        assert_eq!(*cost_usd, Some(0.01));
        assert_eq!(*duration_ms, Some(900));
        assert_eq!(usage.as_ref().unwrap().input_tokens, Some(5));
    }

    #[test]
    fn test_error_result_becomes_error_event() {
        let mut n = ClaudeNormalizer::new();
        let events =
            n.feed(r#"{"type":"result","subtype":"error_during_execution","result":"boom"}"#);
        assert!(matches!(
            &events[0].payload,
            EventPayload::Error { message } if message == "boom"
        ));
    }

    #[test]
    fn test_thinking_blocks_are_suppressed() {
        let mut n = ClaudeNormalizer::new();
        let events = n.feed(
            r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"private"},{"type":"text","text":"public"}]}}"#,
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0].payload,
            EventPayload::Text { content } if content == "public"
        ));
    }

    #[test]
    fn test_garbage_line_is_skipped() {
        let mut n = ClaudeNormalizer::new();
        assert!(n.feed("not json at all").is_empty());
    }
}
