//! Response stream events and sessions
//!
//! The backend delivers a response as an ordered sequence of typed events.
//! This module defines the wire contract ([`StreamEvent`]), the ephemeral
//! [`StreamSession`] that pairs an event stream with its cancellation token,
//! and the ingest state machine in [`ingest`] that turns events into a single
//! finalized message.
//!
//! # Wire format
//!
//! ```text
//! {"type": "message", "content": "partial text"}
//! {"type": "source",  "source": {"filename": ..., "chunk_text": ..., "relevance_score": ...}}
//! {"type": "done"}
//! {"type": "error",   "error": "reason"}
//! ```
//!
//! Any other `type` is ignored without aborting the stream.

pub mod ingest;
pub mod sse;

pub use ingest::{IngestState, IngestStep, StreamIngest};

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::cancel::StreamToken;
use crate::error::Result;
use crate::types::Citation;

/// One event of a response stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Incremental answer text
    Message {
        /// Fragment to append
        content: String,
    },
    /// One supporting citation
    Source {
        /// The cited excerpt
        source: Citation,
    },
    /// The answer is complete
    Done,
    /// The backend gave up on this answer
    Error {
        /// Reason reported by the backend
        error: String,
    },
    /// An event type this client does not understand
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// Parses one JSON payload
    ///
    /// Returns `None` for payloads that are not a well-formed event; those are
    /// skipped like unknown event types.
    ///
    /// # Examples
    ///
    /// ```
    /// use docuchat::stream::StreamEvent;
    ///
    /// let event = StreamEvent::parse(r#"{"type":"message","content":"Hi"}"#);
    /// assert_eq!(event, Some(StreamEvent::Message { content: "Hi".into() }));
    ///
    /// let unknown = StreamEvent::parse(r#"{"type":"typing"}"#);
    /// assert_eq!(unknown, Some(StreamEvent::Unknown));
    /// ```
    pub fn parse(payload: &str) -> Option<Self> {
        match serde_json::from_str(payload) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("Skipping malformed stream event: {}", e);
                None
            }
        }
    }

    /// True for `done` and `error`
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }
}

/// Events as delivered by a backend; transport failures arrive as `Err`
pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

/// One in-flight response: its event stream plus the token that gates it
pub struct StreamSession {
    token: StreamToken,
    events: EventStream,
}

impl StreamSession {
    /// Pairs an event stream with its token
    pub fn new(token: StreamToken, events: EventStream) -> Self {
        Self { token, events }
    }

    /// Token this session was started with
    pub fn token(&self) -> &StreamToken {
        &self.token
    }

    /// Waits for the next event; `None` once the transport closed
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        self.events.next().await
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("generation", &self.token.generation())
            .finish_non_exhaustive()
    }
}
