//! Configuration management for Switchyard
//!
//! Configuration is loaded from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Default remote endpoint for the remote process transport, filled from the
/// sandbox provisioning collaborator's environment. Per-request `sandbox`
/// fields override this.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// PEM-encoded private key material.
    pub private_key: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Default working directory for backend processes
    pub working_dir: PathBuf,

    /// Claude CLI executable
    pub claude_bin: String,
    /// Codex CLI executable
    pub codex_bin: String,

    /// Default model per backend when the request does not name one
    pub claude_model: String,
    pub codex_model: String,

    /// Whether ambient default credentials exist for each backend.
    /// Used only when a request supplies no credential tokens.
    pub claude_ambient_credentials: bool,
    pub codex_ambient_credentials: bool,

    /// Default sandbox for remote execution, if configured
    pub sandbox: Option<SandboxConfig>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SWITCHYARD_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SWITCHYARD_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid SWITCHYARD_PORT")?,

            working_dir: env::var("SWITCHYARD_WORKDIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),

            claude_bin: env::var("CLAUDE_BIN").unwrap_or_else(|_| "claude".to_string()),
            codex_bin: env::var("CODEX_BIN").unwrap_or_else(|_| "codex".to_string()),

            claude_model: env::var("CLAUDE_MODEL").unwrap_or_else(|_| "sonnet".to_string()),
            codex_model: env::var("CODEX_MODEL").unwrap_or_else(|_| "gpt-5-codex".to_string()),

            claude_ambient_credentials: env::var("CLAUDE_CODE_OAUTH_TOKEN").is_ok()
                || env::var("CLAUDE_CONFIG_DIR").is_ok(),
            codex_ambient_credentials: env::var("CODEX_API_KEY").is_ok()
                || env::var("CODEX_HOME").is_ok(),

            sandbox: Self::sandbox_from_env()?,
        })
    }

    /// Load the default sandbox endpoint, if `SANDBOX_HOST` is present.
    fn sandbox_from_env() -> Result<Option<SandboxConfig>> {
        let host = match env::var("SANDBOX_HOST") {
            Ok(host) => host,
            Err(_) => return Ok(None),
        };

        let port = env::var("SANDBOX_PORT")
            .unwrap_or_else(|_| "22".to_string())
            .parse()
            .context("Invalid SANDBOX_PORT")?;
        let username = env::var("SANDBOX_USER").context("SANDBOX_USER must be set")?;
        let key_file = env::var("SANDBOX_KEY_FILE").context("SANDBOX_KEY_FILE must be set")?;
        let private_key = std::fs::read_to_string(&key_file)
            .with_context(|| format!("Failed to read SANDBOX_KEY_FILE {key_file}"))?;

        Ok(Some(SandboxConfig {
            host,
            port,
            username,
            private_key,
        }))
    }
}
