//! Incremental decoder for the `data: ` line protocol

use std::collections::VecDeque;

use futures::stream::{self, Stream, StreamExt};

use crate::error::ChatError;

/// Prefix marking a data line
pub const EVENT_PREFIX: &str = "data: ";

/// Payload that terminates the reply
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded protocol event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireEvent {
    /// Next piece of reply text
    TextDelta(String),
    /// The service signalled the end of the reply
    EndOfStream,
}

/// Byte-chunk to [`WireEvent`] decoder for a single response
///
/// Chunk boundaries may fall anywhere, including inside a line or inside a
/// multi-byte UTF-8 sequence. After [`WireEvent::EndOfStream`] the decoder
/// ignores further input.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    utf8_tail: Vec<u8>,
    line: String,
    finished: bool,
}

impl FrameDecoder {
    /// Create a decoder for a new response
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the end-of-stream sentinel has been seen
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed the next chunk, returning every event completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<WireEvent> {
        if self.finished {
            return Vec::new();
        }
        let text = self.decode_utf8(chunk);
        self.line.push_str(&text);
        self.drain_lines()
    }

    /// Flush a trailing line that never received its newline
    pub fn finish(mut self) -> Vec<WireEvent> {
        if self.finished {
            return Vec::new();
        }
        if !self.utf8_tail.is_empty() {
            let tail = std::mem::take(&mut self.utf8_tail);
            self.line.push_str(&String::from_utf8_lossy(&tail));
        }
        let mut events = self.drain_lines();
        if !self.finished && !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            events.extend(parse_line(&line));
        }
        events
    }

    fn drain_lines(&mut self) -> Vec<WireEvent> {
        let mut events = Vec::new();
        while let Some(pos) = self.line.find('\n') {
            let line: String = self.line.drain(..=pos).collect();
            let Some(event) = parse_line(&line[..pos]) else {
                continue;
            };
            let done = event == WireEvent::EndOfStream;
            events.push(event);
            if done {
                self.finished = true;
                self.line.clear();
                self.utf8_tail.clear();
                break;
            }
        }
        events
    }

    /// Decode as much of the pending bytes as forms complete characters
    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        self.utf8_tail.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            let (valid, invalid_len) = match std::str::from_utf8(&self.utf8_tail) {
                Ok(s) => {
                    out.push_str(s);
                    self.utf8_tail.clear();
                    return out;
                }
                Err(e) => (e.valid_up_to(), e.error_len()),
            };

            out.push_str(&String::from_utf8_lossy(&self.utf8_tail[..valid]));
            match invalid_len {
                Some(len) => {
                    out.push(char::REPLACEMENT_CHARACTER);
                    self.utf8_tail.drain(..valid + len);
                }
                None => {
                    // Incomplete sequence at the end, wait for more bytes
                    self.utf8_tail.drain(..valid);
                    return out;
                }
            }
        }
    }
}

/// Interpret one line (without its `\n`)
fn parse_line(line: &str) -> Option<WireEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let payload = line.strip_prefix(EVENT_PREFIX)?;
    // Upstream wraps already-framed lines a second time
    let payload = payload.strip_prefix(EVENT_PREFIX).unwrap_or(payload);

    if payload == DONE_SENTINEL {
        return Some(WireEvent::EndOfStream);
    }

    let delta: String = payload.chars().filter(|&c| c != '\r').collect();
    if delta.is_empty() {
        None
    } else {
        Some(WireEvent::TextDelta(delta))
    }
}

struct DecodeState<S> {
    bytes: S,
    decoder: Option<FrameDecoder>,
    queued: VecDeque<WireEvent>,
}

/// Lazily decode a response body into events
///
/// The returned stream pulls one chunk from `bytes` only when it has no
/// decoded events left, and ends after [`WireEvent::EndOfStream`], after a
/// transport error, or when `bytes` ends.
pub fn decode_stream<S>(bytes: S) -> impl Stream<Item = Result<WireEvent, ChatError>>
where
    S: Stream<Item = Result<Vec<u8>, ChatError>> + Unpin,
{
    let state = DecodeState {
        bytes,
        decoder: Some(FrameDecoder::new()),
        queued: VecDeque::new(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.queued.pop_front() {
                if event == WireEvent::EndOfStream {
                    state.decoder = None;
                    state.queued.clear();
                }
                return Some((Ok(event), state));
            }

            let decoder = state.decoder.as_mut()?;
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = decoder.feed(&chunk);
                    state.queued.extend(events);
                }
                Some(Err(e)) => {
                    state.decoder = None;
                    return Some((Err(e), state));
                }
                None => {
                    let events = state.decoder.take().map(FrameDecoder::finish);
                    state.queued.extend(events.into_iter().flatten());
                }
            }
        }
    })
}
