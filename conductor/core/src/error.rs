//! Request errors and their user-facing classification
//!
//! Transport failures carry raw detail for logs. What reaches the
//! presentation layer is only [`ChatErrorKind::user_message`].

use thiserror::Error;

/// Failure of a single chat request
#[derive(Debug, Error)]
pub enum ChatError {
    /// The service could not be reached, or stopped answering
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The service answered with a non-success status
    #[error("HTTP error {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// The service accepted the request but sent no reply
    #[error("No response body")]
    EmptyBody,

    /// The response body broke off mid-stream
    #[error("Response stream failed: {0}")]
    Stream(String),

    /// The request was cancelled locally
    #[error("Request cancelled")]
    Cancelled,

    /// The request could not be built or sent
    #[error("Invalid request: {0}")]
    Request(String),
}

/// User-facing error categories
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatErrorKind {
    /// Network unreachable, refused, timed out or dropped
    Connectivity,
    /// HTTP 4xx
    ClientError,
    /// HTTP 5xx
    ServerError,
    /// No reply text at all
    EmptyBody,
    /// Local abort, not shown to the user
    Cancelled,
    /// Anything else
    Unclassified,
}

impl ChatErrorKind {
    /// Message safe to display to the user
    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Connectivity => "Unable to connect. Please check your connection.",
            Self::ClientError => "Request failed. Please try again or rephrase your message.",
            Self::ServerError => "The server is temporarily unavailable. Please try again later.",
            Self::EmptyBody => "No response received. Please try again.",
            Self::Cancelled => "Request cancelled.",
            Self::Unclassified => "Something went wrong. Please try again.",
        }
    }
}

impl ChatError {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ChatErrorKind {
        match self {
            Self::Connect(_) | Self::Stream(_) => ChatErrorKind::Connectivity,
            Self::Status { status, .. } => match status {
                400..=499 => ChatErrorKind::ClientError,
                500..=599 => ChatErrorKind::ServerError,
                _ => ChatErrorKind::Unclassified,
            },
            Self::EmptyBody => ChatErrorKind::EmptyBody,
            Self::Cancelled => ChatErrorKind::Cancelled,
            Self::Request(_) => ChatErrorKind::Unclassified,
        }
    }

    /// Whether this is a local cancellation rather than a failure
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Message safe to display to the user
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Stream(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else if err.is_request() {
            // Failures while writing the request are almost always the socket
            Self::Connect(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}
