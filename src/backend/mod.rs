//! Backend abstraction for the conversation engine
//!
//! This module defines the [`ChatBackend`] trait: the network surface the
//! engine consumes. Concrete implementations live in submodules:
//!
//! - [`http::HttpBackend`] -- REST + server-sent events over `reqwest`.
//! - [`fake::FakeBackend`] -- in-process backend used in tests and offline
//!   mode.
//!
//! Request and response bodies are defined here so every implementation
//! shares the same JSON shapes.

pub mod fake;
pub mod http;

pub use fake::{FakeBackend, FakeStreamHandle};
pub use http::HttpBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::stream::{EventStream, StreamEvent};
use crate::types::{Attachment, Citation, Conversation};

/// Body of a create-conversation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateConversation {
    /// Title derived from the first user message
    pub title: String,
    /// Owning user, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Response to a create-conversation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedConversation {
    /// Identifier assigned by the backend
    pub conversation_id: String,
}

/// Paging parameters for listing conversations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    /// Restrict to one owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Page size
    pub limit: usize,
    /// Number of conversations to skip
    pub offset: usize,
}

/// One page of conversation metadata, most recently updated first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationPage {
    /// Conversations in this page
    pub conversations: Vec<Conversation>,
    /// Total number of conversations available
    #[serde(default)]
    pub total: usize,
}

/// Body of a chat request, streaming or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's message
    pub message: String,
    /// Conversation the message belongs to
    pub conversation_id: String,
    /// Documents referenced by the message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Non-streaming answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Full answer text
    #[serde(alias = "response_text")]
    pub response: String,
    /// Supporting citations in relevance order
    #[serde(default)]
    pub sources: Vec<Citation>,
    /// Conversation the answer belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatReply {
    /// Replays the reply as the event sequence a stream would have produced
    ///
    /// # Examples
    ///
    /// ```
    /// use docuchat::backend::ChatReply;
    /// use docuchat::stream::StreamEvent;
    ///
    /// let reply = ChatReply { response: "Hi".into(), sources: vec![], conversation_id: None };
    /// let events = reply.into_events();
    /// assert_eq!(events.last(), Some(&StreamEvent::Done));
    /// ```
    pub fn into_events(self) -> Vec<StreamEvent> {
        let mut events = Vec::with_capacity(self.sources.len() + 2);
        events.push(StreamEvent::Message {
            content: self.response,
        });
        events.extend(
            self.sources
                .into_iter()
                .map(|source| StreamEvent::Source { source }),
        );
        events.push(StreamEvent::Done);
        events
    }
}

/// Network collaborator of the conversation engine
///
/// Implementations must deliver stream events in the order the server
/// produced them. Transport failures are reported either as an `Err` from
/// [`ChatBackend::open_stream`] or as an `Err` item inside the stream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Creates a conversation and returns its identifier
    async fn create_conversation(&self, request: &CreateConversation) -> Result<String>;

    /// Fetches a conversation including its full message list
    async fn get_conversation(&self, id: &str) -> Result<Conversation>;

    /// Lists conversation metadata, most recently updated first
    async fn list_conversations(&self, query: &ListQuery) -> Result<ConversationPage>;

    /// Deletes a conversation
    async fn delete_conversation(&self, id: &str) -> Result<()>;

    /// Sends a message and waits for the complete answer
    async fn send_message(&self, request: &ChatRequest) -> Result<ChatReply>;

    /// Sends a message and returns the answer as an event stream
    ///
    /// `abort` is cancelled when the engine no longer needs the stream; the
    /// implementation should stop reading from the network when it fires.
    async fn open_stream(
        &self,
        request: &ChatRequest,
        abort: CancellationToken,
    ) -> Result<EventStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_reply_accepts_response_text_alias() {
        let json = r#"{"response_text":"Answer","sources":[]}"#;
        let reply: ChatReply = serde_json::from_str(json).unwrap();
        assert_eq!(reply.response, "Answer");
    }

    #[test]
    fn test_chat_reply_into_events_preserves_source_order() {
        let reply = ChatReply {
            response: "Answer".to_string(),
            sources: vec![Citation::new("1.md", "a", 0.9), Citation::new("2.md", "b", 0.4)],
            conversation_id: Some("c1".to_string()),
        };
        let events = reply.into_events();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            StreamEvent::Message {
                content: "Answer".to_string()
            }
        );
        match (&events[1], &events[2]) {
            (StreamEvent::Source { source: a }, StreamEvent::Source { source: b }) => {
                assert_eq!(a.filename, "1.md");
                assert_eq!(b.filename, "2.md");
            }
            other => panic!("unexpected events: {:?}", other),
        }
        assert_eq!(events[3], StreamEvent::Done);
    }

    #[test]
    fn test_chat_request_omits_empty_attachments() {
        let request = ChatRequest {
            message: "hi".to_string(),
            conversation_id: "c1".to_string(),
            attachments: Vec::new(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"message":"hi","conversation_id":"c1"}"#);
    }

    #[test]
    fn test_conversation_page_total_defaults_to_zero() {
        let page: ConversationPage = serde_json::from_str(r#"{"conversations":[]}"#).unwrap();
        assert_eq!(page.total, 0);
    }
}
