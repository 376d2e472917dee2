//! Generation Service Transport
//!
//! The conductor reaches the generation service through the [`ChatTransport`]
//! trait. [`HttpTransport`] is the production implementation; tests
//! substitute scripted transports.
//!
//! # Usage
//!
//! ```ignore
//! use chat_conductor::backend::{ChatRequest, ChatTransport, HttpTransport};
//!
//! let transport = HttpTransport::from_config(&config)?;
//! let body = transport.open(&ChatRequest::new("Hello!", identity.headers())).await?;
//! ```

mod http;
mod traits;

pub use http::HttpTransport;
pub use traits::{ByteStream, ChatBody, ChatRequest, ChatTransport};
