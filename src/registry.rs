//! Session registry
//!
//! In-process map from backend session id to live turn state. The registry
//! is what lets `continue` find the right backend without the client
//! repeating it, and what lets `interrupt` reach a turn that is already
//! streaming.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::credentials::CredentialScope;
use crate::providers::ProviderKind;

/// Whether a session currently has a turn in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Ended,
}

#[derive(Debug)]
struct SessionEntry {
    provider: ProviderKind,
    state: SessionState,
    cancel: CancellationToken,
    scope: Option<Arc<CredentialScope>>,
}

/// Registry of known sessions. Entries survive turn completion (state
/// `Ended`) so continuations can find their provider and credential scope;
/// they are removed on interrupt or when a turn errors out.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session the moment its backend id becomes known.
    pub fn register(
        &self,
        session_id: &str,
        provider: ProviderKind,
        cancel: CancellationToken,
        scope: Option<Arc<CredentialScope>>,
    ) {
        let mut sessions = self.sessions.lock();
        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                provider,
                state: SessionState::Active,
                cancel,
                scope,
            },
        );
    }

    /// Mark a session's turn as finished, keeping the entry for future
    /// continuations.
    pub fn complete(&self, session_id: &str) {
        let mut sessions = self.sessions.lock();
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.state = SessionState::Ended;
        }
    }

    /// Rebind an ended session to a fresh turn.
    pub fn reactivate(&self, session_id: &str, cancel: CancellationToken) {
        let mut sessions = self.sessions.lock();
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.state = SessionState::Active;
            entry.cancel = cancel;
        }
    }

    /// Drop a session entirely. The scope Arc is returned so the caller can
    /// release it outside the lock.
    pub fn remove(&self, session_id: &str) -> Option<Arc<CredentialScope>> {
        let mut sessions = self.sessions.lock();
        sessions.remove(session_id).and_then(|entry| entry.scope)
    }

    pub fn provider_of(&self, session_id: &str) -> Option<ProviderKind> {
        let sessions = self.sessions.lock();
        sessions.get(session_id).map(|entry| entry.provider)
    }

    pub fn state_of(&self, session_id: &str) -> Option<SessionState> {
        let sessions = self.sessions.lock();
        sessions.get(session_id).map(|entry| entry.state)
    }

    pub fn scope_of(&self, session_id: &str) -> Option<Arc<CredentialScope>> {
        let sessions = self.sessions.lock();
        sessions.get(session_id).and_then(|entry| entry.scope.clone())
    }

    /// Cancel a session's in-flight turn (if any), release its credential
    /// scope, and forget it. Returns false for unknown ids, so a second
    /// interrupt on the same id reports not-found.
    pub fn interrupt(&self, session_id: &str) -> bool {
        let entry = {
            let mut sessions = self.sessions.lock();
            sessions.remove(session_id)
        };
        match entry {
            Some(entry) => {
                entry.cancel.cancel();
                if let Some(scope) = entry.scope {
                    scope.release();
                }
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        let sessions = self.sessions.lock();
        sessions
            .values()
            .filter(|entry| entry.state == SessionState::Active)
            .count()
    }
}
