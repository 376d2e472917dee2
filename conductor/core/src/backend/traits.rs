//! Chat Transport Trait
//!
//! Abstract interface between the conductor and whatever carries a chat
//! request to the generation service. The conductor owns cancellation and
//! decoding; a transport only opens the request and hands back the raw body.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::error::ChatError;
use crate::identity::IdentityHeaders;

/// Raw response body, chunked as it arrives
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ChatError>>;

/// JSON body of a chat request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatBody<'a> {
    /// User text
    pub message: &'a str,
}

/// One outgoing chat request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatRequest {
    /// User text
    pub message: String,
    /// Identifiers sent as headers
    pub identity: IdentityHeaders,
}

impl ChatRequest {
    /// Create a request for `message` carrying `identity`
    pub fn new(message: impl Into<String>, identity: IdentityHeaders) -> Self {
        Self {
            message: message.into(),
            identity,
        }
    }

    /// Body to serialize as JSON
    #[must_use]
    pub fn body(&self) -> ChatBody<'_> {
        ChatBody {
            message: &self.message,
        }
    }
}

/// Carrier for chat requests
///
/// Implementations must be cancel-safe: dropping the future returned by
/// [`ChatTransport::open`], or the stream it resolves to, abandons the
/// request.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport name for logging
    fn name(&self) -> &str;

    /// Send `request` and resolve once the service has accepted it
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError`] if the service is unreachable, answers with a
    /// non-success status, or sends no body.
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, ChatError>;
}
