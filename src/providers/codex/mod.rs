//! Codex CLI provider
//!
//! Drives `codex exec --json`. The prompt travels as a positional argument;
//! images are decoded to temp files and passed with `-i`. Continuations use
//! the `resume <thread_id>` subcommand. Reasoning levels become the
//! `model_reasoning_effort` config override.

mod adapter;
mod protocol;

pub use adapter::CodexNormalizer;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::credentials::{ensure_ambient, CredentialScope};
use crate::error::{GatewayError, GatewayResult};
use crate::message::MessageContent;
use crate::process::ProcessSpec;
use crate::reasoning::{self, ReasoningUnit};
use crate::registry::SessionRegistry;

use super::{
    run_turn, select_host, EventStream, Provider, ProviderKind, SessionOptions, TurnSetup,
};

pub struct CodexProvider {
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
}

impl CodexProvider {
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
            .unwrap_or_else(|| self.config.codex_model.clone());

        if content.is_empty() {
            return Err(GatewayError::Validation("Message content is empty".to_string()));
        }
        reasoning::validate(ProviderKind::Codex, &model, options.reasoning_level)?;

        let scope = match &options.tokens {
            Some(tokens) => Some(Arc::new(CredentialScope::materialize(
                ProviderKind::Codex,
                tokens,
            )?)),
            None => {
                let registered = resume.and_then(|id| self.registry.scope_of(id));
                if registered.is_none() {
                    ensure_ambient(ProviderKind::Codex, self.config.codex_ambient_credentials)?;
                }
                registered
            }
        };

        let mut env: HashMap<String, String> = options.env.clone();
        if let Some(scope) = scope.as_deref() {
            env.extend(scope.env_overrides().clone());
        }

        let mut args = vec!["exec".to_string(), "--json".to_string()];
        args.push("--model".to_string());
        args.push(model.clone());
        if let Some(ReasoningUnit::Effort(effort)) =
            reasoning::resolve(ProviderKind::Codex, &model, options.reasoning_level)
        {
            args.push("-c".to_string());
            args.push(format!("model_reasoning_effort={effort}"));
        }

        // Image blocks become temp files passed by path. The handles ride in
        // the setup so they outlive the process.
        let attachments = content.write_temp_images()?;
        for file in &attachments {
            args.push("-i".to_string());
            args.push(file.path().to_string_lossy().into_owned());
        }

        if let Some(thread_id) = resume {
            args.push("resume".to_string());
            args.push(thread_id.to_string());
        }
        args.push(content.joined_text());

        Ok(TurnSetup {
            spec: ProcessSpec {
                program: self.config.codex_bin.clone(),
                args,
                env,
                working_dir: options
                    .working_dir
                    .clone()
                    .unwrap_or_else(|| self.config.working_dir.clone()),
            },
            stdin_payload: None,
            scope,
            resuming: resume.map(str::to_string),
            attachments,
        })
    }
}

#[async_trait]
impl Provider for CodexProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Codex
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
            ProviderKind::Codex,
            host,
            setup,
            Box::new(CodexNormalizer::new()),
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
            ProviderKind::Codex,
            host,
            setup,
            Box::new(CodexNormalizer::new()),
        )
        .await
    }
}
