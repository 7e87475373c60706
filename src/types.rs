//! Core data model for the conversation engine
//!
//! Messages, citations, conversations and attachments as they travel between
//! the backend, the transcript and the conversation directory. Field names on
//! the wire follow the backend's JSON (`chunk_text`, `relevance_score`,
//! `last_message`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Marker embedded in synthetic assistant messages that report a failed
/// exchange. Messages carrying it are removed again by `retry`.
pub const ERROR_MARKER: &str = "[error]";

/// Role of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Submitted by the person using the client
    User,
    /// Produced by the backend
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A cited excerpt from a source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Source document filename
    pub filename: String,
    /// Matched text excerpt
    #[serde(rename = "chunk_text")]
    pub excerpt: String,
    /// Relevance score, always within `[0, 1]`
    #[serde(rename = "relevance_score", deserialize_with = "deserialize_score")]
    pub score: f64,
    /// Identifier of the source document, when the backend reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

fn deserialize_score<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(clamp_score(raw))
}

fn clamp_score(raw: f64) -> f64 {
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 1.0)
    }
}

impl Citation {
    /// Creates a citation, clamping `score` into `[0, 1]`
    ///
    /// # Examples
    ///
    /// ```
    /// use docuchat::types::Citation;
    ///
    /// let citation = Citation::new("guide.pdf", "Install with cargo.", 1.7);
    /// assert_eq!(citation.score, 1.0);
    /// ```
    pub fn new(filename: impl Into<String>, excerpt: impl Into<String>, score: f64) -> Self {
        Self {
            filename: filename.into(),
            excerpt: excerpt.into(),
            score: clamp_score(score),
            document_id: None,
        }
    }

    /// Attaches a source-document identifier
    pub fn with_document_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }
}

/// A single transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within the owning conversation
    pub id: String,
    /// Who produced the message
    pub role: Role,
    /// Message text
    pub content: String,
    /// Creation time
    #[serde(alias = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Citations in arrival order; only ever populated on assistant messages
    #[serde(default, alias = "sources", skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    /// Owning conversation, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use docuchat::types::{Message, Role};
    ///
    /// let msg = Message::user("What does chapter 2 cover?");
    /// assert_eq!(msg.role, Role::User);
    /// assert!(msg.citations.is_empty());
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), Vec::new())
    }

    /// Creates a new assistant message with its citations
    pub fn assistant(content: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self::new(Role::Assistant, content.into(), citations)
    }

    /// Creates the synthetic assistant message that reports a failed exchange
    ///
    /// # Examples
    ///
    /// ```
    /// use docuchat::types::Message;
    ///
    /// let msg = Message::delivery_error("backend unavailable");
    /// assert!(msg.is_error_like());
    /// assert!(msg.content.contains("backend unavailable"));
    /// ```
    pub fn delivery_error(reason: &str) -> Self {
        Self::new(
            Role::Assistant,
            format!("{} Sorry, something went wrong: {}", ERROR_MARKER, reason),
            Vec::new(),
        )
    }

    fn new(role: Role, content: String, citations: Vec<Citation>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            created_at: Utc::now(),
            citations,
            conversation_id: None,
        }
    }

    /// Sets the owning conversation
    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// True for assistant messages that carry [`ERROR_MARKER`]
    pub fn is_error_like(&self) -> bool {
        self.role == Role::Assistant && self.content.contains(ERROR_MARKER)
    }
}

/// Conversation metadata, optionally with its full message list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier
    #[serde(alias = "conversation_id")]
    pub id: String,
    /// Title derived from the first user message
    pub title: String,
    /// Preview of the most recent message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    /// Number of messages in the conversation
    #[serde(default)]
    pub message_count: usize,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the conversation was last updated
    pub updated_at: DateTime<Utc>,
    /// Owning user, when the backend tracks one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Full message list; only populated when a conversation is selected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
}

impl Conversation {
    /// Creates metadata for a freshly created, empty conversation
    pub fn new(id: impl Into<String>, title: impl Into<String>, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            last_message: None,
            message_count: 0,
            created_at: now,
            updated_at: now,
            user_id,
            messages: None,
        }
    }
}

/// A document reference sent along with a user message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Uploaded filename
    pub filename: String,
    /// Identifier assigned by the document service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}
