//! Chat Conductor - Streaming Conversation Client Core
//!
//! This crate turns user prompts into cancellable, session-scoped exchanges
//! with a remote generation service that replies over a chunked text stream.
//! It has no UI dependencies: a surface renders what the [`Conductor`] tells
//! it and calls back for user actions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Surface (CLI, ...)                        │
//! │        send_message / abort / retry / clear_*  (down)             │
//! │        ConductorMessage                          (up)             │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                        CONDUCTOR CORE                             │
//! │  ┌────────────────────────────┴───────────────────────────────┐  │
//! │  │                         Conductor                           │  │
//! │  │  status · streaming text · error · generation · cancel      │  │
//! │  └──────┬──────────────┬──────────────────┬───────────────────┘  │
//! │         │              │                  │                      │
//! │  ┌──────┴─────┐ ┌──────┴──────┐  ┌────────┴────────┐             │
//! │  │ Transcript │ │  Identity   │  │  ChatTransport  │             │
//! │  │ (tab store)│ │  Provider   │  │   (HTTP POST)   │             │
//! │  └──────┬─────┘ └──────┬──────┘  └────────┬────────┘             │
//! │         │              │                  │ bytes                │
//! │  ┌──────┴──────────────┴─────┐   ┌────────┴────────┐             │
//! │  │      KeyValueStore        │   │  FrameDecoder   │             │
//! │  │  (tab-scoped / durable)   │   │   → WireEvent   │             │
//! │  └───────────────────────────┘   └─────────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: Request lifecycle, transcript and cancellation
//! - [`IdentityProvider`]: Session, client and origin identifiers
//! - [`FrameDecoder`]: `data: ` line protocol decoder
//! - [`ChatTransport`]: Seam to the generation service ([`HttpTransport`])
//! - [`ConductorMessage`]: Updates pushed to the surface
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use chat_conductor::{
//!     load_config, Conductor, ConductorConfig, HttpTransport, IdentityProvider, MemoryStore,
//! };
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let tab = Arc::new(MemoryStore::new());
//!     let durable = Arc::new(MemoryStore::new());
//!     let identity = Arc::new(IdentityProvider::from_config(&config, tab.clone(), durable));
//!     let transport = Arc::new(HttpTransport::from_config(&config)?);
//!
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let conductor = Conductor::new(transport, identity, tab, ConductorConfig::from(&config), tx);
//!
//!     tokio::spawn({
//!         let conductor = conductor.clone();
//!         async move { conductor.send_message("Hello!").await }
//!     });
//!
//!     while let Some(msg) = rx.recv().await {
//!         // Render message to UI
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Transport trait and HTTP implementation
//! - [`conductor`]: Main Conductor struct
//! - [`config`]: TOML/environment configuration
//! - [`error`]: Request errors and user-facing classification
//! - [`identity`]: Request identifiers
//! - [`messages`]: Transcript data model and surface updates
//! - [`session`]: Persisted transcript
//! - [`storage`]: Key-value stores
//! - [`streaming`]: Response frame decoding

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod conductor;
pub mod config;
pub mod error;
pub mod identity;
pub mod messages;
pub mod session;
pub mod storage;
pub mod streaming;

// Re-exports for convenience
pub use backend::{ByteStream, ChatRequest, ChatTransport, HttpTransport};
pub use conductor::{ChatSnapshot, Conductor, ConductorConfig};
pub use error::{ChatError, ChatErrorKind};
pub use identity::{IdentityHeaders, IdentityProvider};
pub use messages::{ChatStatus, ConductorMessage, Message, MessageId, MessageRole, MessageStatus};
pub use session::Transcript;
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use streaming::{decode_stream, FrameDecoder, WireEvent};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ChatConfig, ChatToml, ConfigError,
    ConfigSource, StorageKeys,
};
