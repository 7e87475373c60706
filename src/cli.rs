//! Command-line interface definition for Docuchat
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, one-shot questions, and
//! conversation history.

use clap::{Parser, Subcommand};

/// Docuchat - chat with your documents from the terminal
///
/// Ask questions about uploaded documents and get streamed answers with
/// cited sources.
#[derive(Parser, Debug, Clone)]
#[command(name = "docuchat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the backend base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Wait for complete answers instead of streaming them
    #[arg(long, global = true)]
    pub no_stream: bool,

    /// Use an in-memory backend that echoes questions (no network)
    #[arg(long, global = true)]
    pub offline: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Docuchat
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Open an existing conversation by id
        #[arg(short, long)]
        resume: Option<String>,
    },

    /// Ask a single question and print the answer
    Ask {
        /// The question to ask
        question: String,

        /// Ask within an existing conversation
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Manage conversation history
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

/// Conversation history subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List conversations grouped by age
    List {
        /// Only show conversations whose title or last message contains text
        #[arg(short, long)]
        search: Option<String>,

        /// Load every page instead of just the most recent one
        #[arg(short, long)]
        all: bool,
    },

    /// Show the messages of a conversation
    Show {
        /// Conversation id
        id: String,
    },

    /// Delete a conversation
    Delete {
        /// Conversation id
        id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            base_url: None,
            no_stream: false,
            offline: false,
            command: Commands::Chat { resume: None },
        }
    }
}
