//! Docuchat - document-aware chat client library
//!
//! This library provides the streaming conversation engine behind the
//! `docuchat` CLI: it keeps the transcript of the active conversation,
//! turns the backend's response stream into finalized answers with
//! citations, and manages the list of past conversations.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `orchestrator`: Send/retry/switch operations; sole owner of engine state
//! - `stream`: Wire events, the ingest state machine and SSE framing
//! - `transcript`: Ordered message list of the active conversation
//! - `directory`: Paged conversation list with search and age grouping
//! - `cancel`: Tokens that keep superseded streams from mutating state
//! - `backend`: Backend trait with HTTP and in-memory implementations
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Command-line interface and handlers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use docuchat::backend::HttpBackend;
//! use docuchat::orchestrator::{SendOrchestrator, SendOutcome};
//! use docuchat::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let backend = Arc::new(HttpBackend::from_config(&config.backend)?);
//!     let mut orchestrator = SendOrchestrator::new(backend, &config);
//!     if let SendOutcome::Started(session) = orchestrator.send("Summarize chapter 1", vec![]).await {
//!         let completion = orchestrator.drive(session, |_, partial| print!("\r{}", partial)).await;
//!         println!("\n{:?}", completion);
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cancel;
pub mod cli;
pub mod commands;
pub mod config;
pub mod directory;
pub mod error;
pub mod orchestrator;
pub mod stream;
pub mod text;
pub mod transcript;
pub mod types;

// Re-export commonly used types
pub use backend::{ChatBackend, FakeBackend, HttpBackend};
pub use config::Config;
pub use directory::{AgeGroup, ConversationDirectory, DateRange};
pub use error::{DocuchatError, Result};
pub use orchestrator::{Completion, RejectReason, SendOrchestrator, SendOutcome};
pub use stream::{StreamEvent, StreamSession};
pub use transcript::TranscriptStore;
pub use types::{Attachment, Citation, Conversation, Message, Role};

#[cfg(test)]
pub mod test_utils;
