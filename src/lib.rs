//! Switchyard - Agent session gateway
//!
//! This library drives interactive coding-agent CLIs (Claude, Codex) as
//! child processes, locally or on a remote host over SSH, and exposes their
//! turns as a single HTTP + SSE surface with one normalized event
//! vocabulary.

pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod message;
pub mod process;
pub mod providers;
pub mod reasoning;
pub mod registry;
pub mod routes;

use std::sync::Arc;
use std::time::Instant;

pub use crate::config::Config;
pub use crate::error::{GatewayError, GatewayResult};
pub use crate::events::{EventPayload, UnifiedEvent};
pub use crate::providers::{Provider, ProviderKind};
pub use crate::registry::SessionRegistry;

use crate::providers::{ClaudeProvider, CodexProvider};

/// One adapter per backend.
pub struct ProviderSet {
    pub claude: Arc<dyn Provider>,
    pub codex: Arc<dyn Provider>,
}

impl ProviderSet {
    pub fn get(&self, kind: ProviderKind) -> Arc<dyn Provider> {
        match kind {
            ProviderKind::Claude => self.claude.clone(),
            ProviderKind::Codex => self.codex.clone(),
        }
    }
}

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub providers: ProviderSet,
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(SessionRegistry::new());

        let providers = ProviderSet {
            claude: Arc::new(ClaudeProvider::new(registry.clone(), config.clone())),
            codex: Arc::new(CodexProvider::new(registry.clone(), config.clone())),
        };

        Self {
            config,
            registry,
            providers,
            start_time: Instant::now(),
        }
    }

    /// Create application state with injected providers, for integration
    /// tests that script backend behavior instead of spawning CLIs.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn new_for_testing(
        config: Config,
        registry: Arc<SessionRegistry>,
        claude: Arc<dyn Provider>,
        codex: Arc<dyn Provider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            providers: ProviderSet { claude, codex },
            start_time: Instant::now(),
        }
    }
}
