//! Provider adapters
//!
//! A provider knows how to start and resume turns against one backend CLI:
//! it builds the process spec, supplies the message, and normalizes the
//! backend's raw line protocol into the unified event vocabulary. The shared
//! turn runner here owns everything common: launching, the read loop,
//! cancellation, registry bookkeeping, and cleanup on consumer disconnect.

pub mod claude;
pub mod codex;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;

use crate::credentials::{CredentialScope, CredentialTokens};
use crate::error::{GatewayError, GatewayResult};
use crate::events::{EventPayload, UnifiedEvent};
use crate::message::MessageContent;
use crate::process::{ProcessHost, ProcessSpec};
use crate::registry::SessionRegistry;

pub use claude::ClaudeProvider;
pub use codex::CodexProvider;

/// Which backend a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Claude,
    Codex,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Claude => write!(f, "claude"),
            ProviderKind::Codex => write!(f, "codex"),
        }
    }
}

/// Stream of normalized events for one turn.
pub type EventStream = Pin<Box<dyn Stream<Item = UnifiedEvent> + Send>>;

/// Per-request knobs common to both backends.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub model: Option<String>,
    pub working_dir: Option<std::path::PathBuf>,
    pub reasoning_level: u8,
    pub tokens: Option<CredentialTokens>,
    /// Extra env vars for the backend process. Credential scope overrides
    /// win on collision.
    pub env: std::collections::HashMap<String, String>,
    pub sandbox: Option<crate::process::RemoteEndpoint>,
}

/// One backend adapter.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Start a fresh session with an initial message.
    async fn start(
        &self,
        content: MessageContent,
        options: SessionOptions,
    ) -> GatewayResult<EventStream>;

    /// Continue an existing session with a follow-up message.
    async fn resume(
        &self,
        session_id: &str,
        content: MessageContent,
        options: SessionOptions,
    ) -> GatewayResult<EventStream>;
}

/// Pick where the backend runs: a per-request sandbox wins, then the
/// configured default sandbox, then the local machine.
pub(crate) fn select_host(
    requested: Option<crate::process::RemoteEndpoint>,
    default: Option<&crate::config::SandboxConfig>,
) -> Arc<dyn ProcessHost> {
    if let Some(endpoint) = requested {
        return Arc::new(crate::process::RemoteHost::new(endpoint));
    }
    if let Some(config) = default {
        return Arc::new(crate::process::RemoteHost::new(config.into()));
    }
    Arc::new(crate::process::LocalHost::new())
}

/// Translates one raw protocol line into zero or more unified events.
pub trait TurnNormalizer: Send {
    fn feed(&mut self, line: &str) -> Vec<UnifiedEvent>;
}

/// Everything the shared runner needs to drive one turn.
#[derive(Debug)]
pub struct TurnSetup {
    pub spec: ProcessSpec,
    /// Written to the backend's stdin after launch, then stdin is closed.
    pub stdin_payload: Option<Vec<u8>>,
    pub scope: Option<Arc<CredentialScope>>,
    /// Session id known before launch (continuations). Fresh sessions learn
    /// theirs from the backend's first event.
    pub resuming: Option<String>,
    /// Temp files that must outlive the process (image attachments).
    pub attachments: Vec<NamedTempFile>,
}

/// Cleans up when a turn ends for any reason other than normal completion:
/// cancels the backend (arming the signal escalation), forgets the session,
/// and releases the credential scope.
struct TurnGuard {
    registry: Arc<SessionRegistry>,
    cancel: CancellationToken,
    scope: Option<Arc<CredentialScope>>,
    session_id: Option<String>,
    completed: bool,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        self.cancel.cancel();
        if let Some(id) = &self.session_id {
            if let Some(scope) = self.registry.remove(id) {
                scope.release();
            }
        }
        if let Some(scope) = &self.scope {
            scope.release();
        }
    }
}

enum LoopStep {
    Line(String),
    Eof,
    Cancelled,
    ReadError(std::io::Error),
}

/// Single-event stream carrying a terminal error.
fn error_stream(err: &GatewayError) -> EventStream {
    let event = UnifiedEvent::now(EventPayload::Error {
        message: err.stream_message(),
    });
    Box::pin(futures::stream::iter(vec![event]))
}

/// Launch the backend and turn its output into an event stream.
///
/// Pre-spawn validation and credential failures surface as `Err` so they
/// become HTTP error responses. Connection failures and everything after
/// launch surface as terminal `error` events on the stream instead.
pub async fn run_turn(
    registry: Arc<SessionRegistry>,
    provider: ProviderKind,
    host: Arc<dyn ProcessHost>,
    setup: TurnSetup,
    mut normalizer: Box<dyn TurnNormalizer>,
) -> GatewayResult<EventStream> {
    let cancel = CancellationToken::new();

    let TurnSetup {
        spec,
        stdin_payload,
        scope,
        resuming,
        attachments,
    } = setup;

    let mut process = match host.launch(spec, cancel.clone()).await {
        Ok(process) => process,
        Err(err @ GatewayError::Connection(_)) => {
            // The session is never registered. A scope materialized for this
            // turn is released; a scope reused from a registered session
            // stays with that session.
            if resuming.is_none() {
                if let Some(scope) = &scope {
                    scope.release();
                }
            }
            return Ok(error_stream(&err));
        }
        Err(err) => return Err(err),
    };

    if let Some(payload) = stdin_payload {
        process.write_stdin(&payload).await?;
    }
    process.close_stdin().await?;

    let mut guard = TurnGuard {
        registry: registry.clone(),
        cancel: cancel.clone(),
        scope: scope.clone(),
        session_id: resuming.clone(),
        completed: false,
    };

    if let Some(id) = &resuming {
        registry.reactivate(id, cancel.clone());
    }

    let mut stdout = process
        .take_stdout()
        .ok_or_else(|| GatewayError::Backend("Backend stdout unavailable".to_string()))?;

    let stream = stream! {
        let started = Instant::now();
        let mut buf = String::new();

        'outer: loop {
            let step = tokio::select! {
                _ = cancel.cancelled() => LoopStep::Cancelled,
                read = stdout.read_line(&mut buf) => match read {
                    Ok(0) => LoopStep::Eof,
                    Ok(_) => LoopStep::Line(std::mem::take(&mut buf)),
                    Err(e) => LoopStep::ReadError(e),
                },
            };

            match step {
                LoopStep::Line(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    for event in normalizer.feed(line) {
                        if let EventPayload::SessionStart { session_id, .. } = &event.payload {
                            guard.session_id = Some(session_id.clone());
                            registry.register(
                                session_id,
                                provider,
                                cancel.clone(),
                                scope.clone(),
                            );
                        }
                        metrics::counter!("switchyard_events_total", "type" => event.kind())
                            .increment(1);

                        let terminal = event.is_terminal();
                        let finished = matches!(event.payload, EventPayload::TurnDone { .. });
                        yield event;

                        if finished {
                            match process.wait().await {
                                Ok(exit) => {
                                    tracing::debug!(code = ?exit.code, "Backend exited");
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "Failed to reap backend");
                                }
                            }
                            if let Some(id) = &guard.session_id {
                                registry.complete(id);
                            }
                            metrics::histogram!("switchyard_turn_duration_seconds")
                                .record(started.elapsed().as_secs_f64());
                            guard.completed = true;
                            break 'outer;
                        }
                        if terminal {
                            break 'outer;
                        }
                    }
                }
                LoopStep::Eof => {
                    yield UnifiedEvent::now(EventPayload::Error {
                        message: "Backend stream ended unexpectedly".to_string(),
                    });
                    break;
                }
                LoopStep::Cancelled => {
                    yield UnifiedEvent::now(EventPayload::Error {
                        message: GatewayError::Aborted.stream_message(),
                    });
                    break;
                }
                LoopStep::ReadError(e) => {
                    yield UnifiedEvent::now(EventPayload::Error {
                        message: format!("Backend read failed: {e}"),
                    });
                    break;
                }
            }
        }

        drop(attachments);
        drop(guard);
    };

    Ok(Box::pin(stream))
}
