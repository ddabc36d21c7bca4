//! Credential scoping
//!
//! Per-request credential tokens never touch the user's real credential
//! stores. Each turn that supplies tokens gets an ephemeral directory laid
//! out the way the backend expects, pointed at via environment overrides on
//! the spawned process, and deleted when the turn ends.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::providers::ProviderKind;

/// Per-request credential tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialTokens {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// An ephemeral on-disk credential store scoped to one session's turns.
///
/// Release is at-most-once; a failed deletion is logged and never surfaced to
/// the stream consumer.
#[derive(Debug)]
pub struct CredentialScope {
    dir: PathBuf,
    env: HashMap<String, String>,
    released: AtomicBool,
}

impl CredentialScope {
    /// Write the backend's expected credential layout under a fresh
    /// uniquely-named directory.
    pub fn materialize(
        provider: ProviderKind,
        tokens: &CredentialTokens,
    ) -> GatewayResult<Self> {
        let dir = std::env::temp_dir().join(format!("switchyard-scope-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir)?;

        let mut env = HashMap::new();
        match provider {
            ProviderKind::Claude => {
                let payload = json!({
                    "claudeAiOauth": {
                        "accessToken": tokens.access_token,
                    }
                });
                std::fs::write(
                    dir.join(".credentials.json"),
                    serde_json::to_vec(&payload)?,
                )?;
                env.insert(
                    "CLAUDE_CONFIG_DIR".to_string(),
                    dir.to_string_lossy().into_owned(),
                );
            }
            ProviderKind::Codex => {
                let payload = json!({
                    "tokens": {
                        "access_token": tokens.access_token,
                        "id_token": tokens.id_token,
                    }
                });
                std::fs::write(dir.join("auth.json"), serde_json::to_vec(&payload)?)?;
                env.insert(
                    "CODEX_HOME".to_string(),
                    dir.to_string_lossy().into_owned(),
                );
            }
        }

        tracing::debug!(provider = ?provider, dir = %dir.display(), "Materialized credential scope");

        Ok(Self {
            dir,
            env,
            released: AtomicBool::new(false),
        })
    }

    /// Environment overrides to apply to the backend process.
    pub fn env_overrides(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Delete the scope directory. Safe to call more than once; only the
    /// first call acts.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to remove credential scope");
            }
        }
    }
}

impl Drop for CredentialScope {
    fn drop(&mut self) {
        self.release();
    }
}

/// When a request supplies no tokens, the backend falls back to ambient
/// credentials from the gateway's own environment. Reject up front when none
/// exist rather than letting the CLI fail mid-stream.
pub fn ensure_ambient(provider: ProviderKind, available: bool) -> GatewayResult<()> {
    if available {
        return Ok(());
    }
    Err(GatewayError::Credential(format!(
        "No credential tokens supplied and no ambient {provider} credentials are configured"
    )))
}
