//! Transcript store for the active conversation
//!
//! Holds the ordered message list that the front-end renders. The list is
//! append-only: the only removal is the bounded corrective removal of a single
//! trailing assistant message, used when retrying a failed exchange.

use std::collections::BTreeSet;

use crate::types::{Message, Role};

/// Summary statistics for the messages currently held
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TranscriptStats {
    /// Total number of messages
    pub total: usize,
    /// Messages with the `user` role
    pub user_messages: usize,
    /// Messages with the `assistant` role
    pub assistant_messages: usize,
    /// Distinct cited filenames, sorted
    pub sources: Vec<String>,
}

/// Ordered message list for the active conversation
#[derive(Debug, Clone, Default)]
pub struct TranscriptStore {
    messages: Vec<Message>,
}

impl TranscriptStore {
    /// Creates an empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message to the end of the transcript
    ///
    /// # Examples
    ///
    /// ```
    /// use docuchat::transcript::TranscriptStore;
    /// use docuchat::types::Message;
    ///
    /// let mut transcript = TranscriptStore::new();
    /// transcript.append(Message::user("Hello"));
    /// assert_eq!(transcript.len(), 1);
    /// ```
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Removes the last message if it is an assistant message matching `predicate`
    ///
    /// Returns the removed message, or `None` when nothing was removed.
    pub fn remove_trailing_if<F>(&mut self, predicate: F) -> Option<Message>
    where
        F: FnOnce(&Message) -> bool,
    {
        match self.messages.last() {
            Some(last) if last.role == Role::Assistant && predicate(last) => self.messages.pop(),
            _ => None,
        }
    }

    /// Removes a trailing error-like assistant message, if present
    pub fn remove_trailing_error(&mut self) -> Option<Message> {
        self.remove_trailing_if(Message::is_error_like)
    }

    /// Stamps `conversation_id` onto messages that do not carry one yet
    ///
    /// Used once a conversation has been created for messages appended
    /// before it existed.
    pub fn adopt_conversation(&mut self, conversation_id: &str) {
        for message in self.messages.iter_mut().filter(|m| m.conversation_id.is_none()) {
            message.conversation_id = Some(conversation_id.to_string());
        }
    }

    /// Clears the transcript
    pub fn reset(&mut self) {
        self.messages.clear();
    }

    /// Replaces the transcript with a loaded conversation's messages
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// All messages in order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The most recent `user` message
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when the transcript holds no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Counts messages by role and collects the distinct cited filenames
    pub fn stats(&self) -> TranscriptStats {
        let user_messages = self
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .count();
        let sources: BTreeSet<&str> = self
            .messages
            .iter()
            .flat_map(|m| m.citations.iter())
            .map(|c| c.filename.as_str())
            .collect();

        TranscriptStats {
            total: self.messages.len(),
            user_messages,
            assistant_messages: self.messages.len() - user_messages,
            sources: sources.into_iter().map(str::to_string).collect(),
        }
    }
}
