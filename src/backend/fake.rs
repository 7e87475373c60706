//! In-process fake backend
//!
//! [`FakeBackend`] keeps conversations in memory and answers chat requests
//! from a queue of scripted replies. It backs the unit and integration tests
//! and the CLI's `--offline` mode.
//!
//! Each call to [`ChatBackend::open_stream`] or [`ChatBackend::send_message`]
//! consumes the next queued [`Script`]. With an empty queue the fake echoes
//! the question back.
//!
//! # Example
//!
//! ```
//! use docuchat::backend::{ChatBackend, ChatRequest, CreateConversation, FakeBackend};
//! use docuchat::stream::StreamEvent;
//! use futures::StreamExt;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let backend = FakeBackend::new();
//! let id = backend
//!     .create_conversation(&CreateConversation { title: "greeting".into(), user_id: None })
//!     .await
//!     .unwrap();
//! let handle = backend.push_manual();
//!
//! let request = ChatRequest {
//!     message: "hello".into(),
//!     conversation_id: id,
//!     attachments: vec![],
//! };
//! let mut events = backend.open_stream(&request, CancellationToken::new()).await.unwrap();
//!
//! handle.text("Hi");
//! handle.done();
//! assert_eq!(events.next().await.unwrap().unwrap(), StreamEvent::Message { content: "Hi".into() });
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::backend::{
    ChatBackend, ChatReply, ChatRequest, ConversationPage, CreateConversation, ListQuery,
};
use crate::error::{DocuchatError, Result};
use crate::stream::{EventStream, StreamEvent};
use crate::types::{Citation, Conversation, Message};

/// A scripted answer to one chat request
#[derive(Debug)]
pub enum Script {
    /// Deliver these events immediately, in order
    Events(Vec<StreamEvent>),
    /// Deliver whatever the paired [`FakeStreamHandle`] sends
    Manual(mpsc::UnboundedReceiver<Result<StreamEvent>>),
    /// Refuse the request with this reason
    Refuse(String),
}

#[derive(Debug, Default)]
struct FakeState {
    conversations: Vec<Conversation>,
    next_id: u64,
    scripts: VecDeque<Script>,
    requests: Vec<ChatRequest>,
    fail_next_load: Option<String>,
    fail_next_create: Option<String>,
}

/// In-memory implementation of [`ChatBackend`]
#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    /// Creates an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queues an answer delivered as the given events
    pub fn push_events(&self, events: Vec<StreamEvent>) {
        self.state().scripts.push_back(Script::Events(events));
    }

    /// Queues a plain answer: one text event, the citations, then `done`
    pub fn push_answer(&self, text: &str, citations: Vec<Citation>) {
        let reply = ChatReply {
            response: text.to_string(),
            sources: citations,
            conversation_id: None,
        };
        self.push_events(reply.into_events());
    }

    /// Queues a refusal; the next chat request fails before any event
    pub fn push_refusal(&self, reason: &str) {
        self.state()
            .scripts
            .push_back(Script::Refuse(reason.to_string()));
    }

    /// Queues an answer whose events the test sends through the returned handle
    pub fn push_manual(&self) -> FakeStreamHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.state().scripts.push_back(Script::Manual(events_rx));
        FakeStreamHandle { events_tx }
    }

    /// Adds a conversation as if another client had created it
    pub fn seed_conversation(&self, conversation: Conversation) {
        self.state().conversations.push(conversation);
    }

    /// Makes the next `get_conversation` call fail
    pub fn fail_next_load(&self, reason: &str) {
        self.state().fail_next_load = Some(reason.to_string());
    }

    /// Makes the next `create_conversation` call fail
    pub fn fail_next_create(&self, reason: &str) {
        self.state().fail_next_create = Some(reason.to_string());
    }

    /// Every chat request received so far, oldest first
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.state().requests.clone()
    }

    /// Number of stored conversations
    pub fn conversation_count(&self) -> usize {
        self.state().conversations.len()
    }

    fn next_script(&self, request: &ChatRequest) -> Result<Script> {
        let mut state = self.state();
        if !state
            .conversations
            .iter()
            .any(|c| c.id == request.conversation_id)
        {
            return Err(DocuchatError::NotFound(format!(
                "conversation {}",
                request.conversation_id
            ))
            .into());
        }
        state.requests.push(request.clone());
        record_message(
            &mut state.conversations,
            &request.conversation_id,
            Message::user(request.message.clone()).in_conversation(&request.conversation_id),
        );

        let script = state.scripts.pop_front().unwrap_or_else(|| {
            Script::Events(
                ChatReply {
                    response: format!("You asked: {}", request.message),
                    sources: Vec::new(),
                    conversation_id: None,
                }
                .into_events(),
            )
        });

        if let Script::Events(events) = &script {
            if let Some(answer) = answer_from_events(events) {
                record_message(
                    &mut state.conversations,
                    &request.conversation_id,
                    answer.in_conversation(&request.conversation_id),
                );
            }
        }
        Ok(script)
    }
}

/// Stored copy of a completed scripted answer
fn answer_from_events(events: &[StreamEvent]) -> Option<Message> {
    let mut content = String::new();
    let mut citations = Vec::new();
    for event in events {
        match event {
            StreamEvent::Message { content: text } => content.push_str(text),
            StreamEvent::Source { source } => citations.push(source.clone()),
            StreamEvent::Done => return Some(Message::assistant(content, citations)),
            StreamEvent::Error { .. } => return None,
            StreamEvent::Unknown => {}
        }
    }
    None
}

fn record_message(conversations: &mut [Conversation], id: &str, message: Message) {
    if let Some(conversation) = conversations.iter_mut().find(|c| c.id == id) {
        conversation.last_message = Some(message.content.clone());
        conversation.updated_at = Utc::now();
        conversation.messages.get_or_insert_with(Vec::new).push(message);
        conversation.message_count = conversation.messages.as_ref().map_or(0, Vec::len);
    }
}

/// Test-side handle that feeds one manual stream
#[derive(Debug, Clone)]
pub struct FakeStreamHandle {
    events_tx: mpsc::UnboundedSender<Result<StreamEvent>>,
}

impl FakeStreamHandle {
    /// Sends an arbitrary event
    pub fn event(&self, event: StreamEvent) {
        // The consumer may already have abandoned the stream.
        let _ = self.events_tx.send(Ok(event));
    }

    /// Sends a text fragment
    pub fn text(&self, content: &str) {
        self.event(StreamEvent::Message {
            content: content.to_string(),
        });
    }

    /// Sends a citation
    pub fn source(&self, citation: Citation) {
        self.event(StreamEvent::Source { source: citation });
    }

    /// Sends `done`
    pub fn done(&self) {
        self.event(StreamEvent::Done);
    }

    /// Sends a server-reported `error` event
    pub fn error(&self, reason: &str) {
        self.event(StreamEvent::Error {
            error: reason.to_string(),
        });
    }

    /// Simulates the connection dropping
    pub fn disconnect(&self, reason: &str) {
        let _ = self
            .events_tx
            .send(Err(DocuchatError::Stream(reason.to_string()).into()));
    }
}

#[async_trait::async_trait]
impl ChatBackend for FakeBackend {
    async fn create_conversation(&self, request: &CreateConversation) -> Result<String> {
        let mut state = self.state();
        if let Some(reason) = state.fail_next_create.take() {
            return Err(DocuchatError::Backend(reason).into());
        }
        state.next_id += 1;
        let id = format!("conv-{}", state.next_id);
        state.conversations.push(Conversation::new(
            id.clone(),
            request.title.clone(),
            request.user_id.clone(),
        ));
        Ok(id)
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation> {
        let mut state = self.state();
        if let Some(reason) = state.fail_next_load.take() {
            return Err(DocuchatError::Backend(reason).into());
        }
        let mut conversation = state
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| DocuchatError::NotFound(format!("conversation {}", id)))?;
        conversation.messages.get_or_insert_with(Vec::new);
        Ok(conversation)
    }

    async fn list_conversations(&self, query: &ListQuery) -> Result<ConversationPage> {
        let state = self.state();
        let mut matching: Vec<Conversation> = state
            .conversations
            .iter()
            .filter(|c| query.user_id.is_none() || c.user_id == query.user_id)
            .cloned()
            .map(|mut c| {
                c.messages = None;
                c
            })
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let total = matching.len();
        let conversations = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();
        Ok(ConversationPage {
            conversations,
            total,
        })
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        let before = state.conversations.len();
        state.conversations.retain(|c| c.id != id);
        if state.conversations.len() == before {
            return Err(DocuchatError::NotFound(format!("conversation {}", id)).into());
        }
        Ok(())
    }

    async fn send_message(&self, request: &ChatRequest) -> Result<ChatReply> {
        match self.next_script(request)? {
            Script::Events(events) => {
                let mut reply = ChatReply {
                    response: String::new(),
                    sources: Vec::new(),
                    conversation_id: Some(request.conversation_id.clone()),
                };
                for event in events {
                    match event {
                        StreamEvent::Message { content } => reply.response.push_str(&content),
                        StreamEvent::Source { source } => reply.sources.push(source),
                        StreamEvent::Error { error } => {
                            return Err(DocuchatError::Backend(error).into())
                        }
                        StreamEvent::Done | StreamEvent::Unknown => {}
                    }
                }
                Ok(reply)
            }
            Script::Manual(_) => Err(DocuchatError::Backend(
                "manual scripts require a streaming request".to_string(),
            )
            .into()),
            Script::Refuse(reason) => Err(DocuchatError::Backend(reason).into()),
        }
    }

    async fn open_stream(
        &self,
        request: &ChatRequest,
        abort: CancellationToken,
    ) -> Result<EventStream> {
        match self.next_script(request)? {
            Script::Events(events) => Ok(futures::stream::iter(events.into_iter().map(Ok)).boxed()),
            Script::Manual(events_rx) => Ok(UnboundedReceiverStream::new(events_rx)
                .take_until(abort.cancelled_owned())
                .boxed()),
            Script::Refuse(reason) => Err(DocuchatError::Backend(reason).into()),
        }
    }
}
