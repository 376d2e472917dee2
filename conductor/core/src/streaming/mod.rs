//! Response Stream Decoding
//!
//! The generation service replies with a chunked body of newline-delimited
//! lines. Data lines carry the next piece of reply text; a sentinel payload
//! ends the reply:
//!
//! ```text
//!  bytes ──► FrameDecoder ──► WireEvent
//!
//!  data: data: Hel\r\n          TextDelta("Hel")
//!  data: data: lo\r\n           TextDelta("lo")
//!  : keepalive                  (ignored)
//!  data: data: [DONE]\r\n       EndOfStream
//! ```
//!
//! # Protocol tolerances
//!
//! - The upstream server frames its output twice, so a line may start with
//!   the prefix `data: data: `. One extra prefix is stripped.
//! - Stray `\r` characters from chunked transfer are removed from text.
//!
//! # Example
//!
//! ```ignore
//! use chat_conductor::streaming::{decode_stream, WireEvent};
//! use futures::StreamExt;
//!
//! let mut events = std::pin::pin!(decode_stream(body));
//! while let Some(event) = events.next().await {
//!     match event? {
//!         WireEvent::TextDelta(text) => print!("{text}"),
//!         WireEvent::EndOfStream => break,
//!     }
//! }
//! ```

mod frame_decoder;

pub use frame_decoder::{decode_stream, FrameDecoder, WireEvent, DONE_SENTINEL, EVENT_PREFIX};
