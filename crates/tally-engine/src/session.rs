//! In-memory conversation sessions keyed by channel identity.

use std::collections::HashMap;
use std::sync::Mutex;

use tally_core::DisputeTopic;

/// Enumerates supported `Session` values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    /// No pending prompt; the next text message is a command or a
    /// worker search.
    #[default]
    Idle,
    /// The next text message is free-form dispute content.
    AwaitingFreeTextDispute { topic: DisputeTopic },
    /// The next text message is the claimed hour figure for one
    /// record.
    AwaitingNumericCorrection { record_id: i64 },
}

/// Volatile session map; restart resets every conversation to idle.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session for the identity, `Idle` when none is stored.
    pub fn get(&self, channel_identity: &str) -> Session {
        match self.inner.lock() {
            Ok(map) => map.get(channel_identity).cloned().unwrap_or_default(),
            Err(_) => Session::Idle,
        }
    }

    pub fn set(&self, channel_identity: &str, session: Session) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(channel_identity.to_string(), session);
        }
    }

    /// Drops any pending prompt, returning the identity to idle.
    pub fn clear(&self, channel_identity: &str) {
        if let Ok(mut map) = self.inner.lock() {
            map.remove(channel_identity);
        }
    }
}
