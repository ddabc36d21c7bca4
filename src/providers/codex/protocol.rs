//! Codex CLI JSONL wire types
//!
//! `codex exec --json` emits thread/turn lifecycle events plus item events
//! for messages, command executions, and file touches. Unknown event and
//! item types are tolerated.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum CodexEvent {
    #[serde(rename = "thread.started")]
    ThreadStarted { thread_id: String },

    #[serde(rename = "turn.started")]
    TurnStarted,

    #[serde(rename = "turn.completed")]
    TurnCompleted {
        #[serde(default)]
        usage: Option<CodexUsage>,
    },

    #[serde(rename = "turn.failed")]
    TurnFailed {
        #[serde(default)]
        error: Option<CodexError>,
    },

    #[serde(rename = "item.started")]
    ItemStarted { item: CodexItem },

    #[serde(rename = "item.completed")]
    ItemCompleted { item: CodexItem },

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct CodexUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub cached_input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CodexError {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "item_type", rename_all = "snake_case")]
pub enum CodexItem {
    AgentMessage {
        id: String,
        #[serde(default)]
        text: Option<String>,
    },
    Reasoning {
        #[serde(default)]
        id: Option<String>,
    },
    CommandExecution {
        id: String,
        command: String,
        #[serde(default)]
        aggregated_output: Option<String>,
        #[serde(default)]
        exit_code: Option<i32>,
        #[serde(default)]
        status: Option<String>,
    },
    FileWrite {
        id: String,
        #[serde(default)]
        path: Option<String>,
    },
    FileRead {
        id: String,
        #[serde(default)]
        path: Option<String>,
    },
    #[serde(other)]
    Unknown,
}
