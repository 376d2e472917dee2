//! Conversation Session Controller
//!
//! The [`Conductor`] owns the request lifecycle, the transcript and the
//! live streaming text, and pushes every change to its surface as a
//! [`ConductorMessage`].
//!
//! # Request lifecycle
//!
//! ```text
//! idle ──send──► sending ──headers──► processing ──first bytes──► streaming
//!                                                                    │
//!            ┌────────────────── [DONE] ◄────────────────────────────┤
//!            ▼                                                       │
//!        complete ──linger──► idle ◄──── body ends, text kept ───────┘
//!
//! sending | processing | streaming ──failure──► error ──retry──► sending
//! any active state ──send / abort / clear──► previous request cancelled
//! ```
//!
//! Each request gets a generation number and a [`CancellationToken`].
//! Starting a new request, aborting or clearing cancels the token and bumps
//! the generation; a request whose generation is no longer current never
//! touches the state again. A new request also waits for the cancelled one
//! to release the transport before opening its own, so at most one request
//! is ever open.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{ChatRequest, ChatTransport};
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::identity::IdentityProvider;
use crate::messages::{ChatStatus, ConductorMessage, Message, MessageRole};
use crate::session::Transcript;
use crate::storage::KeyValueStore;
use crate::streaming::{decode_stream, WireEvent};

/// Conductor configuration
#[derive(Clone, Debug)]
pub struct ConductorConfig {
    /// How long `complete` stays visible before returning to `idle`
    pub completion_linger: Duration,
    /// Tab-store key holding the transcript
    pub transcript_key: String,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self::from(&ChatConfig::default())
    }
}

impl From<&ChatConfig> for ConductorConfig {
    fn from(config: &ChatConfig) -> Self {
        Self {
            completion_linger: config.completion_linger,
            transcript_key: config.keys.transcript.clone(),
        }
    }
}

/// Point-in-time copy of everything a surface renders
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatSnapshot {
    /// Committed messages
    pub messages: Vec<Message>,
    /// Lifecycle status
    pub status: ChatStatus,
    /// Reply text received so far
    pub streaming_text: String,
    /// User-facing error, if the last request failed
    pub error: Option<String>,
}

/// How a reply stream ended without error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReplyEnd {
    /// The end-of-stream sentinel arrived
    Sentinel,
    /// The body ended without a sentinel
    Exhausted,
}

struct ViewState {
    transcript: Transcript,
    status: ChatStatus,
    streaming_text: String,
    error: Option<String>,
    last_user_message: Option<String>,
    generation: u64,
    cancel: Option<CancellationToken>,
}

struct Inner {
    transport: Arc<dyn ChatTransport>,
    identity: Arc<IdentityProvider>,
    config: ConductorConfig,
    state: Mutex<ViewState>,
    // Held by the request that currently has the transport open
    in_flight: tokio::sync::Mutex<()>,
    tx: mpsc::UnboundedSender<ConductorMessage>,
}

/// Conversation session controller
///
/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct Conductor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Conductor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Conductor")
            .field("transport", &self.inner.transport.name())
            .field("status", &state.status)
            .field("messages", &state.transcript.len())
            .finish_non_exhaustive()
    }
}

impl Conductor {
    /// Create a conductor, rehydrating the transcript from `tab_store`
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        identity: Arc<IdentityProvider>,
        tab_store: Arc<dyn KeyValueStore>,
        config: ConductorConfig,
        tx: mpsc::UnboundedSender<ConductorMessage>,
    ) -> Self {
        let transcript = Transcript::load(tab_store, config.transcript_key.clone());
        let state = ViewState {
            transcript,
            status: ChatStatus::Idle,
            streaming_text: String::new(),
            error: None,
            last_user_message: None,
            generation: 0,
            cancel: None,
        };

        Self {
            inner: Arc::new(Inner {
                transport,
                identity,
                config,
                state: Mutex::new(state),
                in_flight: tokio::sync::Mutex::new(()),
                tx,
            }),
        }
    }

    /// Identity provider used for request headers
    #[must_use]
    pub fn identity(&self) -> &IdentityProvider {
        &self.inner.identity
    }

    /// Committed messages, oldest first
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.inner.state.lock().transcript.messages().to_vec()
    }

    /// Current lifecycle status
    #[must_use]
    pub fn status(&self) -> ChatStatus {
        self.inner.state.lock().status
    }

    /// Reply text received so far for the active request
    #[must_use]
    pub fn current_streaming_text(&self) -> String {
        self.inner.state.lock().streaming_text.clone()
    }

    /// User-facing description of the last failure
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.inner.state.lock().error.clone()
    }

    /// Everything a surface renders, read under one lock
    #[must_use]
    pub fn snapshot(&self) -> ChatSnapshot {
        let state = self.inner.state.lock();
        ChatSnapshot {
            messages: state.transcript.messages().to_vec(),
            status: state.status,
            streaming_text: state.streaming_text.clone(),
            error: state.error.clone(),
        }
    }

    /// Send `text` and stream the reply
    ///
    /// Blank input is ignored. Any request already in flight is cancelled
    /// first. Resolves when this request has completed, failed or been
    /// superseded; failures are reported through the status and
    /// [`Conductor::error`], never returned.
    pub async fn send_message(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        let (generation, token) = self.inner.begin(text);

        let request = ChatRequest::new(text, self.inner.identity.headers());
        if !self.inner.transition(generation, ChatStatus::Processing) {
            return;
        }

        let outcome = self.stream_reply(generation, &token, &request).await;
        match outcome {
            Ok(end) => {
                if self.inner.commit_reply(generation, end) {
                    self.linger(generation, &token).await;
                }
            }
            Err(e) if e.is_cancellation() => {
                tracing::debug!(request = generation, "Request cancelled");
            }
            Err(e) => self.inner.fail(generation, &e),
        }
    }

    /// Cancel the in-flight request, if any, and return to idle
    pub fn abort(&self) {
        let mut state = self.inner.state.lock();
        if Inner::cancel_active(&mut state) {
            tracing::info!("Aborted in-flight request");
        }
        state.streaming_text.clear();
        state.error = None;
        self.inner.set_status(&mut state, ChatStatus::Idle);
    }

    /// Re-send the last user message
    ///
    /// If the transcript ends with that message (the failed attempt's echo)
    /// it is removed first, so the transcript does not repeat it. Does
    /// nothing if no message has been sent.
    pub async fn retry(&self) {
        let text = {
            let mut state = self.inner.state.lock();
            let last_sent = state.last_user_message.clone().or_else(|| {
                state
                    .transcript
                    .last_user_message()
                    .map(|m| m.content.clone())
            });
            let Some(text) = last_sent else {
                tracing::debug!("Nothing to retry");
                return;
            };

            let ends_with_echo = state
                .transcript
                .last()
                .is_some_and(|m| m.role == MessageRole::User);
            if ends_with_echo {
                if let Some(removed) = state.transcript.pop_last() {
                    self.inner
                        .emit(ConductorMessage::Removed { id: removed.id });
                }
            }
            text
        };

        tracing::info!("Retrying last message");
        self.send_message(&text).await;
    }

    /// Empty the transcript and reset the status, keeping identifiers
    pub fn clear_messages(&self) {
        let mut state = self.inner.state.lock();
        Inner::cancel_active(&mut state);
        state.transcript.clear();
        state.streaming_text.clear();
        state.error = None;
        state.last_user_message = None;
        self.inner.emit(ConductorMessage::Cleared);
        self.inner.set_status(&mut state, ChatStatus::Idle);
    }

    /// [`Conductor::clear_messages`] and start a new session id
    pub fn clear_session(&self) {
        self.clear_messages();
        self.inner.identity.clear_session_id();
        tracing::info!("Started new session");
    }

    async fn stream_reply(
        &self,
        generation: u64,
        token: &CancellationToken,
        request: &ChatRequest,
    ) -> Result<ReplyEnd, ChatError> {
        // Wait for a superseded request to drop its connection
        let _slot = tokio::select! {
            biased;
            () = token.cancelled() => return Err(ChatError::Cancelled),
            slot = self.inner.in_flight.lock() => slot,
        };
        if token.is_cancelled() {
            return Err(ChatError::Cancelled);
        }

        tracing::debug!(
            request = generation,
            transport = self.inner.transport.name(),
            "Opening chat request"
        );
        let body = tokio::select! {
            biased;
            () = token.cancelled() => return Err(ChatError::Cancelled),
            opened = self.inner.transport.open(request) => opened?,
        };

        let inner = Arc::clone(&self.inner);
        let body = body.inspect(move |chunk| {
            if chunk.as_ref().is_ok_and(|bytes| !bytes.is_empty()) {
                inner.transition_if(generation, ChatStatus::Processing, ChatStatus::Streaming);
            }
        });
        let mut events = std::pin::pin!(decode_stream(body));

        loop {
            let event = tokio::select! {
                biased;
                () = token.cancelled() => return Err(ChatError::Cancelled),
                event = events.next() => event,
            };
            match event {
                Some(Ok(WireEvent::TextDelta(delta))) => self.inner.push_delta(generation, &delta),
                Some(Ok(WireEvent::EndOfStream)) => return Ok(ReplyEnd::Sentinel),
                Some(Err(e)) => return Err(e),
                None => return Ok(ReplyEnd::Exhausted),
            }
        }
    }

    /// Keep `complete` visible briefly, then return to idle
    async fn linger(&self, generation: u64, token: &CancellationToken) {
        let linger = self.inner.config.completion_linger;
        if !linger.is_zero() {
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(linger) => {}
            }
        }

        let mut state = self.inner.state.lock();
        if state.generation == generation && state.status == ChatStatus::Complete {
            state.cancel = None;
            self.inner.set_status(&mut state, ChatStatus::Idle);
        }
    }
}

impl Inner {
    fn emit(&self, msg: ConductorMessage) {
        if self.tx.send(msg).is_err() {
            tracing::trace!("Surface receiver dropped, discarding update");
        }
    }

    fn set_status(&self, state: &mut ViewState, status: ChatStatus) {
        if state.status == status {
            return;
        }
        tracing::debug!(from = %state.status, to = %status, "Status changed");
        state.status = status;
        self.emit(ConductorMessage::Status { status });
    }

    /// Cancel the active request; returns whether one existed
    fn cancel_active(state: &mut ViewState) -> bool {
        state.generation += 1;
        match state.cancel.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Supersede any active request and record the user message
    fn begin(&self, text: &str) -> (u64, CancellationToken) {
        let mut state = self.state.lock();
        if Self::cancel_active(&mut state) {
            tracing::info!("Superseding in-flight request");
        }

        let token = CancellationToken::new();
        state.cancel = Some(token.clone());
        state.streaming_text.clear();
        state.error = None;
        state.last_user_message = Some(text.to_string());
        self.set_status(&mut state, ChatStatus::Sending);

        let message = Message::user(text);
        state.transcript.push(message.clone());
        self.emit(ConductorMessage::Appended { message });

        tracing::info!(request = state.generation, chars = text.chars().count(), "Sending message");
        (state.generation, token)
    }

    /// Move to `status` if `generation` is still current
    fn transition(&self, generation: u64, status: ChatStatus) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        self.set_status(&mut state, status);
        true
    }

    fn transition_if(&self, generation: u64, from: ChatStatus, to: ChatStatus) {
        let mut state = self.state.lock();
        if state.generation == generation && state.status == from {
            self.set_status(&mut state, to);
        }
    }

    fn push_delta(&self, generation: u64, delta: &str) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        if state.status == ChatStatus::Processing {
            self.set_status(&mut state, ChatStatus::Streaming);
        }
        state.streaming_text.push_str(delta);
        self.emit(ConductorMessage::Delta {
            delta: delta.to_string(),
            text: state.streaming_text.clone(),
        });
    }

    /// Commit the accumulated reply; returns whether `complete` was reached
    ///
    /// A reply without the end-of-stream marker goes straight to `idle`, and
    /// counts as an empty body when it carried no text. With the marker the
    /// reply is committed even when empty.
    fn commit_reply(&self, generation: u64, end: ReplyEnd) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }

        let text = std::mem::take(&mut state.streaming_text);
        if text.is_empty() && end == ReplyEnd::Exhausted {
            drop(state);
            self.fail(generation, &ChatError::EmptyBody);
            return false;
        }
        let chars = text.chars().count();
        let message = Message::assistant(text);
        state.transcript.push(message.clone());
        self.emit(ConductorMessage::Appended { message });

        if end == ReplyEnd::Exhausted {
            tracing::warn!(
                request = generation,
                chars,
                "Reply ended without end-of-stream marker, keeping received text"
            );
            state.cancel = None;
            self.set_status(&mut state, ChatStatus::Idle);
            return false;
        }

        self.set_status(&mut state, ChatStatus::Complete);
        tracing::info!(request = generation, chars, "Reply complete");
        true
    }

    fn fail(&self, generation: u64, error: &ChatError) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }

        tracing::warn!(request = generation, error = %error, kind = ?error.kind(), "Chat request failed");
        let message = error.user_message().to_string();
        state.cancel = None;
        state.streaming_text.clear();
        state.error = Some(message.clone());
        self.emit(ConductorMessage::Error { message });
        self.set_status(&mut state, ChatStatus::Error);
    }
}
