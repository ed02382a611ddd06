//! Per-conversation cancellation tokens.
//!
//! The Orchestrator checks its `CancelToken` at every suspension point
//! (reading the next provider delta, persisting a message, publishing to
//! the event bus, waiting out a retry backoff); calling `cancel()` stops
//! the debate at the next boundary without re-attempting the in-flight turn.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

/// A cancellation token shared between the API handler that requests a stop
/// and the orchestrator task that observes it.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the active cancellation token per running conversation.
pub struct CancelMap {
    tokens: Mutex<HashMap<Uuid, CancelToken>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, conversation_id: Uuid) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(conversation_id, token.clone());
        token
    }

    /// Cancel the running orchestrator for `conversation_id`. Returns `true`
    /// if a token was found.
    pub fn cancel(&self, conversation_id: Uuid) -> bool {
        if let Some(token) = self.tokens.lock().get(&conversation_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn remove(&self, conversation_id: Uuid) {
        self.tokens.lock().remove(&conversation_id);
    }

    pub fn is_running(&self, conversation_id: Uuid) -> bool {
        self.tokens.lock().contains_key(&conversation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_lifecycle() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_map_register_and_cancel() {
        let map = CancelMap::new();
        let id = Uuid::new_v4();
        let token = map.register(id);
        assert!(!token.is_cancelled());
        assert!(map.is_running(id));

        assert!(map.cancel(id));
        assert!(token.is_cancelled());

        map.remove(id);
        assert!(!map.is_running(id));
        assert!(!map.cancel(id));
    }

    #[test]
    fn cancel_nonexistent_conversation_returns_false() {
        let map = CancelMap::new();
        assert!(!map.cancel(Uuid::new_v4()));
    }

    #[test]
    fn remove_is_idempotent() {
        let map = CancelMap::new();
        let id = Uuid::new_v4();
        map.register(id);
        map.remove(id);
        map.remove(id);
        assert!(!map.is_running(id));
    }

    #[test]
    fn register_replaces_previous_token() {
        let map = CancelMap::new();
        let id = Uuid::new_v4();
        let old_token = map.register(id);
        let new_token = map.register(id);

        assert!(!old_token.is_cancelled());
        map.cancel(id);
        assert!(new_token.is_cancelled());
        assert!(!old_token.is_cancelled());
    }

    #[test]
    fn cancel_token_clone_shares_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
