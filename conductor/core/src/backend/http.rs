//! HTTP Transport
//!
//! Sends chat requests to the generation endpoint with reqwest:
//!
//! ```text
//! POST <endpoint>
//! content-type: application/json
//! x-session-id: session_...
//! x-client-id:  ...
//! x-ipaddress:  ... (empty when unknown)
//!
//! {"message": "<user text>"}
//! ```
//!
//! The response body is returned unread as a byte stream.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use super::traits::{ByteStream, ChatRequest, ChatTransport};
use crate::config::ChatConfig;
use crate::error::ChatError;

/// reqwest-backed [`ChatTransport`]
#[derive(Clone, Debug)]
pub struct HttpTransport {
    endpoint: String,
    request_timeout: Duration,
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for `endpoint`
    ///
    /// `request_timeout` bounds the wait for response headers only; a reply
    /// may stream for longer.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Request`] if the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, ChatError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ChatError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into(),
            request_timeout,
            http_client,
        })
    }

    /// Create from [`ChatConfig`]
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Request`] if the HTTP client cannot be built.
    pub fn from_config(config: &ChatConfig) -> Result<Self, ChatError> {
        Self::new(
            config.endpoint.clone(),
            config.request_timeout,
            config.connect_timeout,
        )
    }

    /// Endpoint URL
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Underlying client, shared with auxiliary lookups
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.http_client
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, ChatError> {
        let mut builder = self
            .http_client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .json(&request.body());
        for (name, value) in request.identity.pairs() {
            builder = builder.header(name, value);
        }

        let response = tokio::time::timeout(self.request_timeout, builder.send())
            .await
            .map_err(|_| {
                ChatError::Connect(format!(
                    "no response within {}ms",
                    self.request_timeout.as_millis()
                ))
            })??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = %status, body = %body, "Chat request rejected");
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if response.content_length() == Some(0) {
            return Err(ChatError::EmptyBody);
        }

        tracing::debug!(status = %status, endpoint = %self.endpoint, "Chat request accepted");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ChatError::from));
        Ok(body.boxed())
    }
}
