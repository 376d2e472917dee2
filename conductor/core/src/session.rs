//! Session Transcript
//!
//! The ordered list of messages exchanged in the current session, mirrored
//! into tab-scoped storage after every change and rehydrated on startup.
//!
//! The transcript only holds committed messages. Text that is still
//! streaming lives in the conductor's view state and never reaches storage.

use std::sync::Arc;

use crate::messages::{Message, MessageRole};
use crate::storage::KeyValueStore;

/// Persisted, append-only message log
pub struct Transcript {
    store: Arc<dyn KeyValueStore>,
    key: String,
    messages: Vec<Message>,
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcript")
            .field("key", &self.key)
            .field("messages", &self.messages.len())
            .finish_non_exhaustive()
    }
}

impl Transcript {
    /// Load the transcript stored under `key`, or start empty
    ///
    /// Unreadable contents are logged and discarded.
    pub fn load(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let messages = match store.get(&key) {
            Some(raw) => match serde_json::from_str::<Vec<Message>>(&raw) {
                Ok(messages) => {
                    tracing::debug!(count = messages.len(), "Restored transcript");
                    messages
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unreadable transcript");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Self {
            store,
            key,
            messages,
        }
    }

    /// All committed messages, oldest first
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of committed messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent message
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Most recent user message
    #[must_use]
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.persist();
    }

    /// Remove and return the most recent message
    pub fn pop_last(&mut self) -> Option<Message> {
        let removed = self.messages.pop();
        if removed.is_some() {
            self.persist();
        }
        removed
    }

    /// Remove every message
    pub fn clear(&mut self) {
        self.messages.clear();
        self.persist();
    }

    // Storage is a mirror; a failed write only loses the latest change
    fn persist(&self) {
        let json = match serde_json::to_string(&self.messages) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize transcript");
                return;
            }
        };
        if let Err(e) = self.store.set(&self.key, &json) {
            tracing::warn!(error = %e, "Failed to persist transcript");
        }
    }
}
