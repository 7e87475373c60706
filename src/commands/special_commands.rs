//! Special commands parser for interactive chat mode
//!
//! This module parses the slash commands that can be entered during an
//! interactive chat session instead of a question. They let the user:
//! - Start a new conversation or open an existing one
//! - List, search and page through past conversations
//! - Delete a conversation
//! - Retry the last failed answer
//! - Display help information and exit
//!
//! Command names are case-insensitive; arguments keep their case.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },

    /// Command takes no argument but one was given
    #[error("Command {command} takes no argument, got: {arg}")]
    UnexpectedArgument { command: String, arg: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Start a new conversation
    New,

    /// Show the conversation directory grouped by age
    List,

    /// Show conversations whose title or preview matches the text
    Search(String),

    /// Load the next page of conversations
    More,

    /// Open a conversation by id
    Open(String),

    /// Delete a conversation by id
    Delete(String),

    /// Resend the last question
    Retry,

    /// Show a summary of the current conversation
    Stats,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command
    ///
    /// The input should be sent as a question.
    None,
}

/// Parse user input into a special command
///
/// # Arguments
///
/// * `input` - The raw line entered by the user
///
/// # Returns
///
/// `SpecialCommand::None` for regular questions, the parsed command
/// otherwise.
///
/// # Errors
///
/// Returns [`CommandError`] for unknown commands or missing arguments.
///
/// # Examples
///
/// ```
/// use docuchat::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/open conv-1").unwrap(), SpecialCommand::Open("conv-1".into()));
/// assert_eq!(parse_special_command("What is RAG?").unwrap(), SpecialCommand::None);
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') {
        return match lower.as_str() {
            "exit" | "quit" => Ok(SpecialCommand::Exit),
            _ => Ok(SpecialCommand::None),
        };
    }

    let (name, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((name, arg)) => (name.to_lowercase(), arg.trim()),
        None => (lower.clone(), ""),
    };

    let no_arg = |command: SpecialCommand| {
        if arg.is_empty() {
            Ok(command)
        } else {
            Err(CommandError::UnexpectedArgument {
                command: name.clone(),
                arg: arg.to_string(),
            })
        }
    };

    let with_arg = |build: fn(String) -> SpecialCommand, usage: &str| {
        if arg.is_empty() {
            Err(CommandError::MissingArgument {
                command: name.clone(),
                usage: usage.to_string(),
            })
        } else {
            Ok(build(arg.to_string()))
        }
    };

    match name.as_str() {
        "/new" => no_arg(SpecialCommand::New),
        "/list" | "/history" => no_arg(SpecialCommand::List),
        "/more" => no_arg(SpecialCommand::More),
        "/retry" => no_arg(SpecialCommand::Retry),
        "/stats" | "/status" => no_arg(SpecialCommand::Stats),
        "/help" | "/?" => no_arg(SpecialCommand::Help),
        "/exit" | "/quit" => no_arg(SpecialCommand::Exit),
        "/search" => with_arg(SpecialCommand::Search, "/search <text>"),
        "/open" => with_arg(SpecialCommand::Open, "/open <conversation_id>"),
        "/delete" => with_arg(SpecialCommand::Delete, "/delete <conversation_id>"),
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Print help for the special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat Mode
===========================================

CONVERSATIONS:
  /new            - Start a new conversation
  /list           - Show conversations grouped by Today, Yesterday, This Week, Older
  /search <text>  - Show conversations whose title or last message contains text
  /more           - Load the next page of conversations
  /open <id>      - Open a conversation and show its messages
  /delete <id>    - Delete a conversation

ANSWERS:
  /retry          - Ask the last question again after a failed answer
  /stats          - Show message counts and cited documents
  Ctrl-C          - Stop the answer currently streaming

SESSION:
  /help           - Show this help
  /exit           - Leave the session (also: exit, quit, Ctrl-D)

Anything else is sent as a question.
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_input_is_not_a_command() {
        assert_eq!(
            parse_special_command("Summarize chapter 1").unwrap(),
            SpecialCommand::None
        );
    }

    #[test]
    fn test_bare_exit_words() {
        assert_eq!(parse_special_command("exit").unwrap(), SpecialCommand::Exit);
        assert_eq!(parse_special_command("QUIT").unwrap(), SpecialCommand::Exit);
    }

    #[test]
    fn test_commands_are_case_insensitive() {
        assert_eq!(parse_special_command("/NEW").unwrap(), SpecialCommand::New);
        assert_eq!(parse_special_command("/Retry").unwrap(), SpecialCommand::Retry);
    }

    #[test]
    fn test_arguments_keep_case() {
        assert_eq!(
            parse_special_command("/open Conv-AB12").unwrap(),
            SpecialCommand::Open("Conv-AB12".to_string())
        );
        assert_eq!(
            parse_special_command("/search  Quarterly Report ").unwrap(),
            SpecialCommand::Search("Quarterly Report".to_string())
        );
    }

    #[test]
    fn test_missing_argument() {
        let err = parse_special_command("/delete").unwrap_err();
        assert!(matches!(err, CommandError::MissingArgument { .. }));
        assert!(err.to_string().contains("/delete <conversation_id>"));
    }

    #[test]
    fn test_unexpected_argument() {
        assert!(matches!(
            parse_special_command("/new please"),
            Err(CommandError::UnexpectedArgument { .. })
        ));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_special_command("/frobnicate"),
            Err(CommandError::UnknownCommand("/frobnicate".to_string()))
        );
    }
}
