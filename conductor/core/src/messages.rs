//! Conductor Messages
//!
//! The transcript data model and the updates the conductor pushes to its
//! presentation layer. Surfaces are pure renderers: they draw the transcript,
//! the live streaming text and the status, and call back into the
//! [`Conductor`](crate::Conductor) for user actions.

use rand::Rng;
use serde::{Deserialize, Serialize};

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Milliseconds since the Unix epoch
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Random lowercase base-36 string of `len` characters
pub(crate) fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
        .collect()
}

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new message ID of the form `msg_<millis>_<suffix>`
    #[must_use]
    pub fn new() -> Self {
        Self(format!("msg_{}_{}", now_millis(), random_suffix(9)))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Typed by the user
    User,
    /// Generated by the remote service
    Assistant,
}

/// Delivery state of a single message
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Not yet confirmed
    Sending,
    /// Delivered or fully received
    #[default]
    Complete,
    /// Delivery failed
    Error,
}

/// One entry of the transcript
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Author
    pub role: MessageRole,
    /// Full message text
    pub content: String,
    /// Delivery state
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    /// A user message, complete as soon as it is created
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: MessageRole::User,
            content: content.into(),
            status: MessageStatus::Complete,
        }
    }

    /// A fully received assistant reply
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: MessageRole::Assistant,
            content: content.into(),
            status: MessageStatus::Complete,
        }
    }
}

/// Lifecycle status of the conversation
///
/// Exactly one value is current at any time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    /// Nothing in flight
    #[default]
    Idle,
    /// A send was accepted locally
    Sending,
    /// Request issued, waiting for the first body bytes
    Processing,
    /// Reply text is arriving
    Streaming,
    /// Reply committed, about to return to idle
    Complete,
    /// The last request failed
    Error,
}

impl ChatStatus {
    /// Whether a request is in flight
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Sending | Self::Processing | Self::Streaming)
    }

    /// Human-readable description
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Idle => "Ready",
            Self::Sending => "Sending...",
            Self::Processing => "Thinking...",
            Self::Streaming => "Responding...",
            Self::Complete => "Done",
            Self::Error => "Error",
        }
    }
}

impl std::fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Processing => "processing",
            Self::Streaming => "streaming",
            Self::Complete => "complete",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Updates from the conductor to a presentation surface
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConductorMessage {
    // ============================================
    // Lifecycle
    // ============================================
    /// The conversation status changed
    Status {
        /// New status
        status: ChatStatus,
    },

    /// A request failed; `message` is safe to show to the user
    Error {
        /// Classified, human-readable description
        message: String,
    },

    // ============================================
    // Transcript
    // ============================================
    /// A message was appended to the transcript
    Appended {
        /// The new message
        message: Message,
    },

    /// The most recent message was removed (retry)
    Removed {
        /// ID of the removed message
        id: MessageId,
    },

    /// The transcript was emptied
    Cleared,

    // ============================================
    // Streaming
    // ============================================
    /// New reply text arrived
    Delta {
        /// Text received in this step
        delta: String,
        /// Everything received so far for the current reply
        text: String,
    },
}
