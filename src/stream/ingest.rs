//! Stream ingest state machine
//!
//! ```text
//!          begin            done
//!  Idle ----------> Streaming -------> Finalized
//!                     |    |  error / transport failure
//!                     |    +---------> Failed
//!                     |  cancel / stale token
//!                     +--------------> Cancelled
//! ```
//!
//! Terminal states go back to `Streaming` on the next [`StreamIngest::begin`].
//! Events are applied strictly in arrival order: text fragments are
//! concatenated and citations appended, never reordered or deduplicated.

use crate::cancel::StreamToken;
use crate::stream::StreamEvent;
use crate::types::{Citation, Message};

/// Lifecycle state of the ingest machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// No stream has been started
    Idle,
    /// Accumulating events for the bound token
    Streaming,
    /// Produced a final assistant message
    Finalized,
    /// The stream failed; nothing was committed
    Failed,
    /// The stream was abandoned; nothing was committed
    Cancelled,
}

/// Result of applying one event
#[derive(Debug, Clone, PartialEq)]
pub enum IngestStep {
    /// The event had no effect (stale token, unknown type, not streaming)
    Ignored,
    /// Partial text grew; read it with [`StreamIngest::partial_text`]
    Text,
    /// A citation was appended
    Citation,
    /// The stream completed with this assistant message
    Finalized(Message),
    /// The stream failed with this reason
    Failed(String),
}

/// Accumulates one response stream into a finalized message
#[derive(Debug)]
pub struct StreamIngest {
    state: IngestState,
    token: Option<StreamToken>,
    buffer: String,
    citations: Vec<Citation>,
}

impl Default for StreamIngest {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamIngest {
    /// Creates an idle machine
    pub fn new() -> Self {
        Self {
            state: IngestState::Idle,
            token: None,
            buffer: String::new(),
            citations: Vec::new(),
        }
    }

    /// Starts a new session bound to `token`, discarding any previous buffers
    pub fn begin(&mut self, token: StreamToken) {
        tracing::debug!(generation = token.generation(), "Stream started");
        self.buffer.clear();
        self.citations.clear();
        self.token = Some(token);
        self.state = IngestState::Streaming;
    }

    /// Applies one event delivered for `token`
    ///
    /// Events for any token other than the bound one, or arriving after the
    /// bound token was invalidated, are dropped. A stale bound token moves the
    /// machine to `Cancelled`.
    pub fn apply(&mut self, token: &StreamToken, event: StreamEvent) -> IngestStep {
        if !self.accepts(token) {
            return IngestStep::Ignored;
        }

        match event {
            StreamEvent::Message { content } => {
                self.buffer.push_str(&content);
                IngestStep::Text
            }
            StreamEvent::Source { source } => {
                self.citations.push(source);
                IngestStep::Citation
            }
            StreamEvent::Done => {
                let content = std::mem::take(&mut self.buffer);
                let citations = std::mem::take(&mut self.citations);
                self.state = IngestState::Finalized;
                tracing::debug!(
                    generation = token.generation(),
                    chars = content.len(),
                    citations = citations.len(),
                    "Stream finalized"
                );
                IngestStep::Finalized(Message::assistant(content, citations))
            }
            StreamEvent::Error { error } => self.fail_bound(error),
            StreamEvent::Unknown => {
                tracing::debug!("Ignoring unknown stream event type");
                IngestStep::Ignored
            }
        }
    }

    /// Reports a transport-level failure for `token`
    pub fn fail(&mut self, token: &StreamToken, reason: impl Into<String>) -> IngestStep {
        if !self.accepts(token) {
            return IngestStep::Ignored;
        }
        self.fail_bound(reason.into())
    }

    /// Abandons the current session; later events are ignored
    pub fn cancel(&mut self) {
        if self.state == IngestState::Streaming {
            tracing::debug!("Stream cancelled");
            self.state = IngestState::Cancelled;
        }
        self.buffer.clear();
        self.citations.clear();
        self.token = None;
    }

    /// Current state
    pub fn state(&self) -> IngestState {
        self.state
    }

    /// True while a session is accumulating events
    pub fn is_streaming(&self) -> bool {
        self.state == IngestState::Streaming
    }

    /// Text accumulated so far in the current session
    pub fn partial_text(&self) -> &str {
        &self.buffer
    }

    /// Citations accumulated so far in the current session
    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    fn accepts(&mut self, token: &StreamToken) -> bool {
        if self.state != IngestState::Streaming || self.token.as_ref() != Some(token) {
            tracing::debug!(
                generation = token.generation(),
                "Dropping event for inactive stream"
            );
            return false;
        }
        if !token.is_valid() {
            tracing::debug!(
                generation = token.generation(),
                "Dropping event for superseded stream"
            );
            self.cancel();
            return false;
        }
        true
    }

    fn fail_bound(&mut self, reason: String) -> IngestStep {
        self.buffer.clear();
        self.citations.clear();
        self.state = IngestState::Failed;
        tracing::warn!("Stream failed: {}", reason);
        IngestStep::Failed(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::TokenIssuer;
    use crate::types::Role;

    fn text(s: &str) -> StreamEvent {
        StreamEvent::Message {
            content: s.to_string(),
        }
    }

    fn source(name: &str) -> StreamEvent {
        StreamEvent::Source {
            source: Citation::new(name, "excerpt", 0.5),
        }
    }

    #[test]
    fn test_done_concatenates_fragments_in_order() {
        let issuer = TokenIssuer::new();
        let token = issuer.mint();
        let mut ingest = StreamIngest::new();
        ingest.begin(token.clone());

        assert_eq!(ingest.apply(&token, text("Chapter 1 ")), IngestStep::Text);
        assert_eq!(ingest.apply(&token, source("b.pdf")), IngestStep::Citation);
        assert_eq!(ingest.apply(&token, text("discusses ")), IngestStep::Text);
        assert_eq!(ingest.partial_text(), "Chapter 1 discusses ");
        ingest.apply(&token, source("a.pdf"));
        ingest.apply(&token, text("X."));

        match ingest.apply(&token, StreamEvent::Done) {
            IngestStep::Finalized(msg) => {
                assert_eq!(msg.role, Role::Assistant);
                assert_eq!(msg.content, "Chapter 1 discusses X.");
                let names: Vec<&str> = msg.citations.iter().map(|c| c.filename.as_str()).collect();
                assert_eq!(names, vec!["b.pdf", "a.pdf"]);
            }
            other => panic!("expected finalized, got {:?}", other),
        }
        assert_eq!(ingest.state(), IngestState::Finalized);
        assert!(ingest.partial_text().is_empty());
    }

    #[test]
    fn test_done_with_nothing_accumulated_finalizes_empty_message() {
        let issuer = TokenIssuer::new();
        let token = issuer.mint();
        let mut ingest = StreamIngest::new();
        ingest.begin(token.clone());

        match ingest.apply(&token, StreamEvent::Done) {
            IngestStep::Finalized(msg) => {
                assert!(msg.content.is_empty());
                assert!(msg.citations.is_empty());
            }
            other => panic!("expected finalized, got {:?}", other),
        }
    }

    #[test]
    fn test_error_event_discards_partial_text() {
        let issuer = TokenIssuer::new();
        let token = issuer.mint();
        let mut ingest = StreamIngest::new();
        ingest.begin(token.clone());
        ingest.apply(&token, text("half an ans"));

        let step = ingest.apply(
            &token,
            StreamEvent::Error {
                error: "model crashed".to_string(),
            },
        );
        assert_eq!(step, IngestStep::Failed("model crashed".to_string()));
        assert_eq!(ingest.state(), IngestState::Failed);
        assert!(ingest.partial_text().is_empty());
    }

    #[test]
    fn test_events_after_terminal_state_are_ignored() {
        let issuer = TokenIssuer::new();
        let token = issuer.mint();
        let mut ingest = StreamIngest::new();
        ingest.begin(token.clone());
        ingest.apply(&token, StreamEvent::Done);

        assert_eq!(ingest.apply(&token, text("late")), IngestStep::Ignored);
        assert_eq!(ingest.apply(&token, StreamEvent::Done), IngestStep::Ignored);
        assert_eq!(ingest.state(), IngestState::Finalized);
    }

    #[test]
    fn test_stale_token_cancels_and_drops_done() {
        let issuer = TokenIssuer::new();
        let token = issuer.mint();
        let mut ingest = StreamIngest::new();
        ingest.begin(token.clone());
        ingest.apply(&token, text("partial"));

        issuer.invalidate();

        assert_eq!(ingest.apply(&token, StreamEvent::Done), IngestStep::Ignored);
        assert_eq!(ingest.state(), IngestState::Cancelled);
        assert!(ingest.partial_text().is_empty());
    }

    #[test]
    fn test_events_for_other_token_do_not_touch_current_session() {
        let issuer = TokenIssuer::new();
        let old = issuer.mint();
        let current = issuer.mint();
        let mut ingest = StreamIngest::new();
        ingest.begin(current.clone());

        assert_eq!(ingest.apply(&old, text("stale")), IngestStep::Ignored);
        assert_eq!(ingest.apply(&old, StreamEvent::Done), IngestStep::Ignored);
        assert!(ingest.is_streaming());
        assert!(ingest.partial_text().is_empty());
    }

    #[test]
    fn test_unknown_events_do_not_abort() {
        let issuer = TokenIssuer::new();
        let token = issuer.mint();
        let mut ingest = StreamIngest::new();
        ingest.begin(token.clone());

        assert_eq!(ingest.apply(&token, StreamEvent::Unknown), IngestStep::Ignored);
        assert!(ingest.is_streaming());
        ingest.apply(&token, text("ok"));
        assert!(matches!(
            ingest.apply(&token, StreamEvent::Done),
            IngestStep::Finalized(_)
        ));
    }

    #[test]
    fn test_transport_failure() {
        let issuer = TokenIssuer::new();
        let token = issuer.mint();
        let mut ingest = StreamIngest::new();
        ingest.begin(token.clone());

        assert_eq!(
            ingest.fail(&token, "connection reset"),
            IngestStep::Failed("connection reset".to_string())
        );
        assert_eq!(ingest.fail(&token, "again"), IngestStep::Ignored);
    }

    #[test]
    fn test_cancel_then_begin_starts_clean() {
        let issuer = TokenIssuer::new();
        let first = issuer.mint();
        let mut ingest = StreamIngest::new();
        ingest.begin(first.clone());
        ingest.apply(&first, text("old"));
        ingest.cancel();
        assert_eq!(ingest.state(), IngestState::Cancelled);

        let second = issuer.mint();
        ingest.begin(second.clone());
        ingest.apply(&second, text("new"));
        assert_eq!(ingest.partial_text(), "new");
    }

    #[test]
    fn test_idle_machine_ignores_events() {
        let issuer = TokenIssuer::new();
        let token = issuer.mint();
        let mut ingest = StreamIngest::new();
        assert_eq!(ingest.apply(&token, text("x")), IngestStep::Ignored);
        assert_eq!(ingest.state(), IngestState::Idle);
    }
}
