//! Send orchestrator
//!
//! [`SendOrchestrator`] is the single owner of conversation state for one
//! client: the transcript, the conversation directory, the ingest state
//! machine and the token issuer. Front-ends call its operations and render
//! from its accessors; nothing else mutates the transcript.
//!
//! A typical exchange:
//!
//! 1. [`SendOrchestrator::send`] appends the user message, creates the
//!    conversation if needed, mints a token and opens the response stream.
//! 2. The caller pumps the returned [`StreamSession`] through
//!    [`SendOrchestrator::drive`] (or [`SendOrchestrator::apply`] event by
//!    event) until it finalizes, fails or is cancelled.
//!
//! Switching or deleting conversations invalidates the current token, so a
//! stream still in flight can no longer touch the transcript.

use std::sync::Arc;

use futures::StreamExt;

use crate::backend::{ChatBackend, ChatRequest};
use crate::cancel::{StreamToken, TokenIssuer};
use crate::config::Config;
use crate::directory::{ConversationDirectory, DeleteOutcome};
use crate::error::{user_message, DocuchatError, Result};
use crate::stream::{EventStream, IngestStep, StreamEvent, StreamIngest, StreamSession};
use crate::transcript::{TranscriptStats, TranscriptStore};
use crate::types::{Attachment, Citation, Message};

/// Why a submission was refused before reaching the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The content was empty or whitespace
    EmptyContent,
    /// Another response is still streaming
    StreamInFlight,
    /// `retry` found no user message to resend
    NothingToRetry,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::EmptyContent => write!(f, "message is empty"),
            RejectReason::StreamInFlight => write!(f, "a response is still streaming"),
            RejectReason::NothingToRetry => write!(f, "nothing to retry"),
        }
    }
}

/// Result of [`SendOrchestrator::send`] and [`SendOrchestrator::retry`]
#[derive(Debug)]
pub enum SendOutcome {
    /// The response is on its way; pump the session
    Started(StreamSession),
    /// Nothing happened
    Rejected(RejectReason),
    /// The exchange failed before any event arrived; the transcript already
    /// carries the error message
    Failed(String),
}

/// How a driven stream ended
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The answer was appended to the transcript
    Finalized(Message),
    /// The answer failed; an error message was appended
    Failed(String),
    /// The stream was superseded; nothing was appended
    Cancelled,
}

/// Coordinates sends, retries and conversation switches
pub struct SendOrchestrator {
    backend: Arc<dyn ChatBackend>,
    streaming: bool,
    transcript: TranscriptStore,
    directory: ConversationDirectory,
    ingest: StreamIngest,
    tokens: TokenIssuer,
    conversation_id: Option<String>,
    last_attachments: Vec<Attachment>,
    error_banner: Option<String>,
}

impl SendOrchestrator {
    /// Creates an orchestrator with an empty transcript and no conversation
    pub fn new(backend: Arc<dyn ChatBackend>, config: &Config) -> Self {
        Self {
            backend,
            streaming: config.backend.streaming,
            transcript: TranscriptStore::new(),
            directory: ConversationDirectory::new(&config.chat),
            ingest: StreamIngest::new(),
            tokens: TokenIssuer::new(),
            conversation_id: None,
            last_attachments: Vec::new(),
            error_banner: None,
        }
    }

    /// Submits a user message
    ///
    /// Empty content, or content submitted while another response is
    /// streaming, is rejected without any state change. Otherwise the user
    /// message is appended before any network call is made.
    pub async fn send(&mut self, content: &str, attachments: Vec<Attachment>) -> SendOutcome {
        let content = content.trim();
        if content.is_empty() {
            return SendOutcome::Rejected(RejectReason::EmptyContent);
        }
        if self.ingest.is_streaming() {
            tracing::debug!("Rejecting send while a response is streaming");
            return SendOutcome::Rejected(RejectReason::StreamInFlight);
        }

        let mut message = Message::user(content);
        if let Some(id) = &self.conversation_id {
            message = message.in_conversation(id.clone());
        }
        self.transcript.append(message);
        self.sync_directory();
        self.last_attachments = attachments.clone();

        self.dispatch(content.to_string(), attachments).await
    }

    /// Resends the most recent user message
    ///
    /// A trailing error message is removed first. The user message itself is
    /// not appended again.
    pub async fn retry(&mut self) -> SendOutcome {
        if self.ingest.is_streaming() {
            return SendOutcome::Rejected(RejectReason::StreamInFlight);
        }
        let Some(content) = self
            .transcript
            .last_user_message()
            .map(|m| m.content.clone())
        else {
            return SendOutcome::Rejected(RejectReason::NothingToRetry);
        };

        if self.transcript.remove_trailing_error().is_some() {
            tracing::debug!("Removed error message before retry");
            self.sync_directory();
        }
        self.error_banner = None;
        tracing::info!("Retrying last message");

        let attachments = self.last_attachments.clone();
        self.dispatch(content, attachments).await
    }

    async fn dispatch(&mut self, content: String, attachments: Vec<Attachment>) -> SendOutcome {
        let token = self.tokens.mint();
        self.ingest.begin(token.clone());

        let conversation_id = match self.ensure_conversation(&content).await {
            Ok(id) => id,
            Err(e) => return self.abort_dispatch(&token, &e),
        };

        let request = ChatRequest {
            message: content,
            conversation_id,
            attachments,
        };

        let events = if self.streaming {
            self.backend
                .open_stream(&request, token.abort_signal())
                .await
        } else {
            self.backend
                .send_message(&request)
                .await
                .map(|reply| replay(reply.into_events()))
        };

        match events {
            Ok(events) => {
                tracing::info!(
                    conversation_id = %request.conversation_id,
                    generation = token.generation(),
                    "Response started"
                );
                SendOutcome::Started(StreamSession::new(token, events))
            }
            Err(e) => self.abort_dispatch(&token, &e),
        }
    }

    fn abort_dispatch(&mut self, token: &StreamToken, err: &anyhow::Error) -> SendOutcome {
        let reason = user_message(err);
        self.fail(token, &reason);
        SendOutcome::Failed(reason)
    }

    async fn ensure_conversation(&mut self, first_message: &str) -> Result<String> {
        if let Some(id) = &self.conversation_id {
            return Ok(id.clone());
        }
        let conversation = self
            .directory
            .create(self.backend.as_ref(), first_message)
            .await?;
        self.conversation_id = Some(conversation.id.clone());
        self.transcript.adopt_conversation(&conversation.id);
        self.sync_directory();
        Ok(conversation.id)
    }

    /// Applies one stream event delivered for `token`
    ///
    /// Events for a superseded token are dropped. A finalized answer is
    /// appended to the transcript; a failure appends an error message and
    /// raises the error banner.
    pub fn apply(&mut self, token: &StreamToken, event: StreamEvent) -> IngestStep {
        match self.ingest.apply(token, event) {
            IngestStep::Finalized(message) => IngestStep::Finalized(self.record_answer(message)),
            IngestStep::Failed(reason) => {
                self.record_failure(&reason);
                IngestStep::Failed(reason)
            }
            step => step,
        }
    }

    /// Reports a transport failure for `token`
    pub fn fail(&mut self, token: &StreamToken, reason: &str) -> IngestStep {
        let step = self.ingest.fail(token, reason);
        if let IngestStep::Failed(reason) = &step {
            self.record_failure(reason);
        }
        step
    }

    /// Pumps `session` until it finalizes, fails or is superseded
    ///
    /// `on_progress` is called after every applied event with the step and
    /// the partial text accumulated so far. A stream that closes before its
    /// terminal event counts as a failure.
    pub async fn drive<F>(&mut self, mut session: StreamSession, mut on_progress: F) -> Completion
    where
        F: FnMut(&IngestStep, &str),
    {
        loop {
            if !self.owns(session.token()) {
                tracing::debug!(
                    generation = session.token().generation(),
                    "Stopped driving superseded stream"
                );
                return Completion::Cancelled;
            }

            let step = match session.next_event().await {
                Some(Ok(event)) => self.apply(session.token(), event),
                Some(Err(e)) => self.fail(session.token(), &user_message(&e)),
                None => self.fail(session.token(), "response stream closed unexpectedly"),
            };
            on_progress(&step, self.ingest.partial_text());

            match step {
                IngestStep::Finalized(message) => return Completion::Finalized(message),
                IngestStep::Failed(reason) => return Completion::Failed(reason),
                IngestStep::Text | IngestStep::Citation | IngestStep::Ignored => {}
            }
        }
    }

    /// Abandons the response in flight, if any; nothing is appended
    pub fn cancel_stream(&mut self) {
        if self.ingest.is_streaming() {
            tracing::info!("Cancelling response in flight");
        }
        self.tokens.invalidate();
        self.ingest.cancel();
    }

    /// Starts over without an active conversation
    pub fn new_conversation(&mut self) {
        self.cancel_stream();
        self.transcript.reset();
        self.conversation_id = None;
        self.last_attachments.clear();
        self.error_banner = None;
        tracing::info!("Started new conversation");
    }

    /// Makes `id` the active conversation and loads its messages
    ///
    /// Selecting the already active conversation does nothing. On failure
    /// the transcript is emptied, no conversation is active and the error
    /// banner is raised.
    pub async fn select_conversation(&mut self, id: &str) -> Result<()> {
        if self.conversation_id.as_deref() == Some(id) {
            return Ok(());
        }
        self.cancel_stream();
        self.last_attachments.clear();

        match self.backend.get_conversation(id).await {
            Ok(mut conversation) => {
                let messages = conversation.messages.take().unwrap_or_default();
                tracing::info!(
                    conversation_id = %id,
                    messages = messages.len(),
                    "Loaded conversation"
                );
                self.transcript.replace(messages);
                self.conversation_id = Some(conversation.id.clone());
                self.directory.upsert(conversation);
                self.error_banner = None;
                Ok(())
            }
            Err(e) => {
                let reason = user_message(&e);
                tracing::warn!(conversation_id = %id, "Failed to load conversation: {}", reason);
                self.transcript.reset();
                self.conversation_id = None;
                self.error_banner = Some(format!("Failed to load conversation: {}", reason));
                Err(DocuchatError::Backend(reason).into())
            }
        }
    }

    /// Deletes a conversation; deleting the active one starts over
    pub async fn delete_conversation(&mut self, id: &str) -> Result<()> {
        let outcome = self
            .directory
            .delete(self.backend.as_ref(), id, self.conversation_id.as_deref())
            .await;
        match outcome {
            Ok(DeleteOutcome::ActiveRemoved) => {
                self.new_conversation();
                Ok(())
            }
            Ok(DeleteOutcome::Removed) => Ok(()),
            Err(e) => Err(self.raise_banner("Failed to delete conversation", &e)),
        }
    }

    /// Reloads the first page of the conversation directory
    pub async fn refresh_conversations(&mut self) -> Result<()> {
        match self.directory.load_first_page(self.backend.as_ref()).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.raise_banner("Failed to load conversations", &e)),
        }
    }

    /// Loads the next directory page; returns how many conversations arrived
    pub async fn load_more_conversations(&mut self) -> Result<usize> {
        match self.directory.load_more(self.backend.as_ref()).await {
            Ok(added) => Ok(added),
            Err(e) => Err(self.raise_banner("Failed to load more conversations", &e)),
        }
    }

    fn raise_banner(&mut self, context: &str, err: &anyhow::Error) -> anyhow::Error {
        let reason = user_message(err);
        tracing::warn!("{}: {}", context, reason);
        self.error_banner = Some(format!("{}: {}", context, reason));
        DocuchatError::Backend(reason).into()
    }

    fn record_answer(&mut self, message: Message) -> Message {
        let message = match &self.conversation_id {
            Some(id) => message.in_conversation(id.clone()),
            None => message,
        };
        tracing::info!(
            citations = message.citations.len(),
            "Response finalized"
        );
        self.transcript.append(message.clone());
        self.sync_directory();
        message
    }

    fn record_failure(&mut self, reason: &str) {
        let mut message = Message::delivery_error(reason);
        if let Some(id) = &self.conversation_id {
            message = message.in_conversation(id.clone());
        }
        self.transcript.append(message);
        self.sync_directory();
        self.error_banner = Some(reason.to_string());
    }

    fn sync_directory(&mut self) {
        if let Some(id) = &self.conversation_id {
            self.directory.record_exchange(id, &self.transcript);
        }
    }

    fn owns(&self, token: &StreamToken) -> bool {
        token.is_valid() && self.ingest.is_streaming()
    }

    /// Clears the error banner
    pub fn dismiss_error(&mut self) {
        self.error_banner = None;
    }

    /// Current error banner text, if raised
    pub fn error_banner(&self) -> Option<&str> {
        self.error_banner.as_deref()
    }

    /// True while a response is streaming
    pub fn is_streaming(&self) -> bool {
        self.ingest.is_streaming()
    }

    /// Text of the response in flight
    pub fn partial_text(&self) -> &str {
        self.ingest.partial_text()
    }

    /// Citations of the response in flight
    pub fn partial_citations(&self) -> &[Citation] {
        self.ingest.citations()
    }

    /// The transcript of the active conversation
    pub fn transcript(&self) -> &TranscriptStore {
        &self.transcript
    }

    /// Summary of the active transcript
    pub fn stats(&self) -> TranscriptStats {
        self.transcript.stats()
    }

    /// The conversation directory
    pub fn directory(&self) -> &ConversationDirectory {
        &self.directory
    }

    /// Identifier of the active conversation
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }
}

impl std::fmt::Debug for SendOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendOrchestrator")
            .field("conversation_id", &self.conversation_id)
            .field("messages", &self.transcript.len())
            .field("state", &self.ingest.state())
            .field("error_banner", &self.error_banner)
            .finish_non_exhaustive()
    }
}

fn replay(events: Vec<StreamEvent>) -> EventStream {
    futures::stream::iter(events.into_iter().map(Ok)).boxed()
}
