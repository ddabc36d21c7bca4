//! Session endpoints
//!
//! `POST /sessions` starts a fresh session, `POST /sessions/:id/continue`
//! adds a turn to an existing one, `POST /sessions/:id/interrupt` cancels a
//! turn in flight. Start and continue respond with an SSE stream of
//! normalized events; interrupt responds with JSON.

use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::credentials::CredentialTokens;
use crate::error::{GatewayError, GatewayResult};
use crate::events::format_sse_event;
use crate::message::MessageContent;
use crate::process::RemoteEndpoint;
use crate::providers::{EventStream, ProviderKind, SessionOptions};
use crate::routes::metrics::{record_interrupt, record_session};
use crate::AppState;

/// Request body shared by start and continue.
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    /// Required for start; optional for continue when the registry already
    /// knows the session.
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    pub content: MessageContent,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub reasoning_level: u8,
    #[serde(default)]
    pub credential_tokens: Option<CredentialTokens>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub sandbox: Option<RemoteEndpoint>,
}

impl SessionRequest {
    fn into_options(self) -> (MessageContent, SessionOptions) {
        let options = SessionOptions {
            model: self.model,
            working_dir: self.working_directory,
            reasoning_level: self.reasoning_level,
            tokens: self.credential_tokens,
            env: self.env,
            sandbox: self.sandbox,
        };
        (self.content, options)
    }
}

pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SessionRequest>,
) -> GatewayResult<Response> {
    let kind = request
        .provider
        .ok_or_else(|| GatewayError::Validation("provider is required".to_string()))?;
    let provider = state.providers.get(kind);

    let remote = request.sandbox.is_some() || state.config.sandbox.is_some();
    let (content, options) = request.into_options();

    info!(provider = %kind, remote, "Starting session");
    record_session(kind, "start");

    let stream = provider.start(content, options).await?;
    sse_response(stream)
}

pub async fn continue_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<SessionRequest>,
) -> GatewayResult<Response> {
    // Registered sessions know their backend; cold resumes must name it.
    let kind = match state.registry.provider_of(&session_id) {
        Some(kind) => kind,
        None => request.provider.ok_or_else(|| {
            GatewayError::Validation(format!(
                "Session {session_id} is unknown; provider is required to resume it"
            ))
        })?,
    };
    let provider = state.providers.get(kind);
    let (content, options) = request.into_options();

    info!(provider = %kind, session_id = %session_id, "Continuing session");
    record_session(kind, "continue");

    let stream = provider.resume(&session_id, content, options).await?;
    sse_response(stream)
}

pub async fn interrupt_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> GatewayResult<Json<serde_json::Value>> {
    if !state.registry.interrupt(&session_id) {
        return Err(GatewayError::NotFound(session_id));
    }
    info!(session_id = %session_id, "Session interrupted");
    record_interrupt();
    Ok(Json(json!({ "success": true })))
}

/// Frame an event stream as an SSE response body.
fn sse_response(stream: EventStream) -> GatewayResult<Response> {
    let body = Body::from_stream(
        stream.map(|event| Ok::<_, Infallible>(format_sse_event(&event))),
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(body)
        .map_err(|e| GatewayError::Internal(anyhow::anyhow!("Failed to build response: {e}")))
}
