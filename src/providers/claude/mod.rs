//! Claude CLI provider
//!
//! Drives `claude -p` in stream-json mode. The message travels as a JSON
//! line on stdin, which carries inline image blocks; continuations pass
//! `--resume` with the backend session id. Reasoning levels become a
//! thinking-token budget in the environment.

mod adapter;
mod protocol;

pub use adapter::ClaudeNormalizer;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::config::Config;
use crate::credentials::{ensure_ambient, CredentialScope};
use crate::error::{GatewayError, GatewayResult};
use crate::message::{ContentBlock, MessageContent};
use crate::process::ProcessSpec;
use crate::reasoning::{self, ReasoningUnit};
use crate::registry::SessionRegistry;

use super::{
    run_turn, select_host, EventStream, Provider, ProviderKind, SessionOptions, TurnSetup,
};

pub struct ClaudeProvider {
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
}

impl ClaudeProvider {
    pub fn new(registry: Arc<SessionRegistry>, config: Arc<Config>) -> Self {
        Self { registry, config }
    }

    fn build_setup(
        &self,
        content: &MessageContent,
        options: &SessionOptions,
        resume: Option<&str>,
    ) -> GatewayResult<TurnSetup> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.config.claude_model.clone());

        if content.is_empty() {
            return Err(GatewayError::Validation("Message content is empty".to_string()));
        }
        reasoning::validate(ProviderKind::Claude, &model, options.reasoning_level)?;

        let scope = match &options.tokens {
            Some(tokens) => Some(Arc::new(CredentialScope::materialize(
                ProviderKind::Claude,
                tokens,
            )?)),
            None => {
                let registered = resume.and_then(|id| self.registry.scope_of(id));
                if registered.is_none() {
                    ensure_ambient(ProviderKind::Claude, self.config.claude_ambient_credentials)?;
                }
                registered
            }
        };

        let mut env: HashMap<String, String> = options.env.clone();
        if let Some(scope) = scope.as_deref() {
            env.extend(scope.env_overrides().clone());
        }
        if let Some(ReasoningUnit::TokenBudget(budget)) =
            reasoning::resolve(ProviderKind::Claude, &model, options.reasoning_level)
        {
            env.insert("MAX_THINKING_TOKENS".to_string(), budget.to_string());
        }

        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--input-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--model".to_string(),
            model,
        ];
        if let Some(session_id) = resume {
            args.push("--resume".to_string());
            args.push(session_id.to_string());
        }

        Ok(TurnSetup {
            spec: ProcessSpec {
                program: self.config.claude_bin.clone(),
                args,
                env,
                working_dir: options
                    .working_dir
                    .clone()
                    .unwrap_or_else(|| self.config.working_dir.clone()),
            },
            stdin_payload: Some(stdin_message(content)?),
            scope,
            resuming: resume.map(str::to_string),
            attachments: vec![],
        })
    }
}

/// Render the message as one stream-json user event line.
fn stdin_message(content: &MessageContent) -> GatewayResult<Vec<u8>> {
    let blocks: Vec<serde_json::Value> = content
        .blocks
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => json!({"type": "text", "text": text}),
            ContentBlock::Image { data, media_type } => json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": media_type,
                    "data": data,
                }
            }),
        })
        .collect();

    let message = json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": blocks,
        }
    });
    let mut line = serde_json::to_vec(&message)?;
    line.push(b'\n');
    Ok(line)
}

#[async_trait]
impl Provider for ClaudeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    async fn start(
        &self,
        content: MessageContent,
        options: SessionOptions,
    ) -> GatewayResult<EventStream> {
        let host = select_host(options.sandbox.clone(), self.config.sandbox.as_ref());
        let setup = self.build_setup(&content, &options, None)?;
        run_turn(
            self.registry.clone(),
            ProviderKind::Claude,
            host,
            setup,
            Box::new(ClaudeNormalizer::new()),
        )
        .await
    }

    async fn resume(
        &self,
        session_id: &str,
        content: MessageContent,
        options: SessionOptions,
    ) -> GatewayResult<EventStream> {
        let host = select_host(options.sandbox.clone(), self.config.sandbox.as_ref());
        let setup = self.build_setup(&content, &options, Some(session_id))?;
        run_turn(
            self.registry.clone(),
            ProviderKind::Claude,
            host,
            setup,
            Box::new(ClaudeNormalizer::new()),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_config() -> Config {
        Config {
            host: "0.0.0.0".to_string(),
            port: 0,
            working_dir: std::env::temp_dir(),
            claude_bin: "claude".to_string(),
            codex_bin: "codex".to_string(),
            claude_model: "sonnet".to_string(),
            codex_model: "gpt-5-codex".to_string(),
            claude_ambient_credentials: true,
            codex_ambient_credentials: true,
            sandbox: None,
        }
    }

    fn provider() -> ClaudeProvider {
        ClaudeProvider::new(Arc::new(SessionRegistry::new()), Arc::new(test_config()))
    }

    #[test]
    fn test_spec_carries_stream_json_flags() {
        let provider = provider();
        let setup = provider
            .build_setup(
                &MessageContent::from_text("hi"),
                &SessionOptions::default(),
                None,
            )
            .unwrap();

        assert_eq!(setup.spec.program, "claude");
        assert!(setup.spec.args.contains(&"stream-json".to_string()));
        assert!(setup.spec.args.contains(&"--verbose".to_string()));
        assert!(!setup.spec.args.contains(&"--resume".to_string()));
    }

    #[test]
    fn test_resume_adds_flag() {
        let provider = provider();
        let setup = provider
            .build_setup(
                &MessageContent::from_text("hi"),
                &SessionOptions::default(),
                Some("sess-9"),
            )
            .unwrap();
        let args = &setup.spec.args;
        let pos = args.iter().position(|a| a == "--resume").unwrap();
        assert_eq!(args[pos + 1], "sess-9");
        assert_eq!(setup.resuming.as_deref(), Some("sess-9"));
    }

    #[test]
    fn test_reasoning_level_sets_thinking_budget() {
        let provider = provider();
        let options = SessionOptions {
            reasoning_level: 2,
            ..Default::default()
        };
        let setup = provider
            .build_setup(&MessageContent::from_text("hi"), &options, None)
            .unwrap();
        assert_eq!(
            setup.spec.env.get("MAX_THINKING_TOKENS").map(String::as_str),
            Some("10000")
        );
    }

    #[test]
    fn test_scope_env_wins_over_request_env() {
        let provider = provider();
        let mut options = SessionOptions {
            tokens: Some(crate::credentials::CredentialTokens {
                access_token: "tok".to_string(),
                id_token: None,
            }),
            ..Default::default()
        };
        options
            .env
            .insert("CLAUDE_CONFIG_DIR".to_string(), "/attacker".to_string());
        options.env.insert("RUST_LOG".to_string(), "debug".to_string());

        let setup = provider
            .build_setup(&MessageContent::from_text("hi"), &options, None)
            .unwrap();
        assert_ne!(
            setup.spec.env.get("CLAUDE_CONFIG_DIR").map(String::as_str),
            Some("/attacker")
        );
        assert_eq!(
            setup.spec.env.get("RUST_LOG").map(String::as_str),
            Some("debug")
        );
    }

    #[test]
    fn test_validation_runs_before_credential_check() {
        // A request that fails both validation and credentials must report
        // the validation failure.
        let config = Config {
            claude_ambient_credentials: false,
            ..test_config()
        };
        let provider = ClaudeProvider::new(Arc::new(SessionRegistry::new()), Arc::new(config));
        let options = SessionOptions {
            reasoning_level: 3,
            model: Some("haiku".to_string()),
            ..Default::default()
        };
        let err = provider
            .build_setup(&MessageContent::from_text("hi"), &options, None)
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn test_resume_reuses_registered_scope() {
        use crate::credentials::CredentialTokens;
        use tokio_util::sync::CancellationToken;

        // No ambient fallback: reuse of the registered scope is the only
        // way this setup can succeed.
        let mut config = test_config();
        config.claude_ambient_credentials = false;

        let registry = Arc::new(SessionRegistry::new());
        let tokens = CredentialTokens {
            access_token: "tok".to_string(),
            id_token: None,
        };
        let scope = Arc::new(
            crate::credentials::CredentialScope::materialize(ProviderKind::Claude, &tokens)
                .unwrap(),
        );
        registry.register(
            "sess-5",
            ProviderKind::Claude,
            CancellationToken::new(),
            Some(scope.clone()),
        );

        let provider = ClaudeProvider::new(registry, Arc::new(config));
        let setup = provider
            .build_setup(
                &MessageContent::from_text("more"),
                &SessionOptions::default(),
                Some("sess-5"),
            )
            .unwrap();

        // Same store, no new directory.
        assert!(Arc::ptr_eq(setup.scope.as_ref().unwrap(), &scope));
        assert_eq!(
            setup.spec.env.get("CLAUDE_CONFIG_DIR").map(String::as_str),
            Some(scope.dir().to_string_lossy().as_ref())
        );
    }

    #[test]
    fn test_missing_ambient_credentials_rejected() {
        let mut base = test_config();
        base.claude_ambient_credentials = false;
        let provider = ClaudeProvider::new(Arc::new(SessionRegistry::new()), Arc::new(base));
        let err = provider
            .build_setup(
                &MessageContent::from_text("hi"),
                &SessionOptions::default(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, GatewayError::Credential(_)));
    }

    #[test]
    fn test_stdin_message_inlines_images() {
        let content = MessageContent {
            blocks: vec![
                ContentBlock::Text {
                    text: "look".to_string(),
                },
                ContentBlock::Image {
                    data: "aGk=".to_string(),
                    media_type: "image/png".to_string(),
                },
            ],
        };
        let line = stdin_message(&content).unwrap();
        assert_eq!(*line.last().unwrap(), b'\n');
        let parsed: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(parsed["type"], "user");
        assert_eq!(parsed["message"]["content"][1]["source"]["data"], "aGk=");
    }
}
