/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes three top-level command modules:

- `chat`: Interactive chat session
- `ask`: Ask a single question and print the answer
- `history`: List, show and delete conversations

These handlers are intentionally small: all conversation state lives in the
[`SendOrchestrator`]; the handlers only read input and render its state.
*/

use crate::backend::{ChatBackend, FakeBackend, HttpBackend};
use crate::config::Config;
use crate::error::Result;
use crate::orchestrator::{Completion, SendOrchestrator, SendOutcome};
use crate::stream::IngestStep;
use crate::text::{single_line, truncate_with_ellipsis, TitleUnit};
use crate::types::{Citation, Message, Role};
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;

// Special commands parser for the interactive session
pub mod special_commands;

// Conversation history commands
pub mod history;

/// Longest citation excerpt printed under an answer
const EXCERPT_MAX_LEN: usize = 200;

/// Build the backend selected by the configuration
///
/// `offline` swaps the HTTP backend for the in-memory one, which answers by
/// echoing the question.
pub fn build_backend(config: &Config, offline: bool) -> Result<Arc<dyn ChatBackend>> {
    if offline {
        tracing::info!("Using offline in-memory backend");
        return Ok(Arc::new(FakeBackend::new()));
    }
    let backend = HttpBackend::from_config(&config.backend)?;
    tracing::info!("Using backend at {}", backend.base_url());
    Ok(Arc::new(backend))
}

/// Prints a streamed answer as it grows
#[derive(Debug, Default)]
pub struct StreamPrinter {
    printed: usize,
    started: bool,
}

impl StreamPrinter {
    /// Creates a printer for one answer
    pub fn new() -> Self {
        Self::default()
    }

    /// Prints whatever part of `partial` has not been printed yet
    pub fn update(&mut self, step: &IngestStep, partial: &str) {
        if !self.started {
            print!("{} ", "assistant>".green().bold());
            self.started = true;
        }
        if let IngestStep::Text = step {
            if partial.len() > self.printed {
                print!("{}", &partial[self.printed..]);
                self.printed = partial.len();
            }
        }
        let _ = std::io::stdout().flush();
    }

    /// Finishes the answer line and prints the outcome
    pub fn finish(&mut self, completion: &Completion) {
        match completion {
            Completion::Finalized(message) => {
                if self.printed == 0 {
                    // Non-text answers, or a printer that never saw text.
                    print!("{}", message.content);
                }
                println!();
                print_citations(&message.citations);
            }
            Completion::Failed(reason) => {
                println!();
                println!("{} {}", "Error:".red().bold(), reason);
                println!("Type {} to try again.", "/retry".cyan());
            }
            Completion::Cancelled => {
                println!();
                println!("{}", "[answer cancelled]".yellow());
            }
        }
        println!();
    }
}

/// Sends a question (or retries) and streams the answer to stdout
///
/// Ctrl-C while the answer streams cancels it. Returns the completion, or
/// `None` when the submission was rejected.
pub async fn stream_answer(
    orchestrator: &mut SendOrchestrator,
    outcome: SendOutcome,
) -> Option<Completion> {
    let session = match outcome {
        SendOutcome::Started(session) => session,
        SendOutcome::Rejected(reason) => {
            println!("{} {}", "Not sent:".yellow(), reason);
            return None;
        }
        SendOutcome::Failed(reason) => {
            let completion = Completion::Failed(reason);
            StreamPrinter::new().finish(&completion);
            return Some(completion);
        }
    };

    let mut printer = StreamPrinter::new();
    let driven = tokio::select! {
        completion = orchestrator.drive(session, |step, partial| printer.update(step, partial)) => Some(completion),
        _ = tokio::signal::ctrl_c() => None,
    };
    let completion = match driven {
        Some(completion) => completion,
        None => {
            orchestrator.cancel_stream();
            Completion::Cancelled
        }
    };
    printer.finish(&completion);
    Some(completion)
}

/// Print the citations under an answer
pub fn print_citations(citations: &[Citation]) {
    if citations.is_empty() {
        return;
    }
    println!("{}", "Sources:".bold());
    for (index, citation) in citations.iter().enumerate() {
        println!(
            "  [{}] {} ({:.2})",
            index + 1,
            citation.filename.cyan(),
            citation.score
        );
        let excerpt = truncate_with_ellipsis(
            &single_line(&citation.excerpt),
            EXCERPT_MAX_LEN,
            TitleUnit::Chars,
        );
        if !excerpt.is_empty() {
            println!("      {}", excerpt.dimmed());
        }
    }
}

/// Print a full transcript
pub fn print_transcript(messages: &[Message]) {
    for message in messages {
        match message.role {
            Role::User => println!("{} {}", "you>".blue().bold(), message.content),
            Role::Assistant if message.is_error_like() => {
                println!("{} {}", "assistant>".green().bold(), message.content.red())
            }
            Role::Assistant => {
                println!("{} {}", "assistant>".green().bold(), message.content);
                print_citations(&message.citations);
            }
        }
    }
    if !messages.is_empty() {
        println!();
    }
}

// Chat command handler
pub mod chat {
    //! Interactive chat session handler.
    //!
    //! Builds the backend and orchestrator, then runs a readline-based loop
    //! that sends each line as a question, streaming the answer as it
    //! arrives. Lines starting with `/` are special commands.

    use super::special_commands::{parse_special_command, print_help, SpecialCommand};
    use super::*;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    /// Start an interactive chat session
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `resume` - Optional conversation id to open first
    /// * `offline` - Use the in-memory backend instead of HTTP
    pub async fn run_chat(config: Config, resume: Option<String>, offline: bool) -> Result<()> {
        let backend = build_backend(&config, offline)?;
        let mut orchestrator = SendOrchestrator::new(backend, &config);

        let mut rl = DefaultEditor::new()?;

        print_welcome_banner(&config, offline);

        if let Err(e) = orchestrator.refresh_conversations().await {
            tracing::debug!("Conversation list unavailable at startup: {}", e);
            show_banner(&mut orchestrator);
        }

        if let Some(id) = resume {
            open_conversation(&mut orchestrator, &id).await;
        }

        loop {
            match rl.readline(&prompt(&orchestrator)) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(trimmed)?;

                    let command = match parse_special_command(trimmed) {
                        Ok(command) => command,
                        Err(e) => {
                            println!("{}", e.to_string().red());
                            continue;
                        }
                    };

                    match command {
                        SpecialCommand::New => {
                            orchestrator.new_conversation();
                            println!("{}", "Started a new conversation.".green());
                        }
                        SpecialCommand::List => {
                            history::print_grouped(&orchestrator.directory().filter("", None));
                            if orchestrator.directory().has_more() {
                                println!("Type {} to load more.", "/more".cyan());
                            }
                        }
                        SpecialCommand::Search(text) => {
                            let found = orchestrator.directory().search(&text);
                            if found.is_empty() {
                                println!("{}", format!("No conversations match '{}'.", text).yellow());
                            } else {
                                history::print_grouped(&found);
                            }
                        }
                        SpecialCommand::More => {
                            match orchestrator.load_more_conversations().await {
                                Ok(0) => println!("{}", "No more conversations.".yellow()),
                                Ok(added) => println!("Loaded {} more conversations.", added),
                                Err(_) => show_banner(&mut orchestrator),
                            }
                        }
                        SpecialCommand::Open(id) => {
                            open_conversation(&mut orchestrator, &id).await;
                        }
                        SpecialCommand::Delete(id) => {
                            match orchestrator.delete_conversation(&id).await {
                                Ok(()) => println!("{}", format!("Deleted conversation {}", id).green()),
                                Err(_) => show_banner(&mut orchestrator),
                            }
                        }
                        SpecialCommand::Retry => {
                            let outcome = orchestrator.retry().await;
                            stream_answer(&mut orchestrator, outcome).await;
                            orchestrator.dismiss_error();
                        }
                        SpecialCommand::Stats => print_stats(&orchestrator),
                        SpecialCommand::Help => print_help(),
                        SpecialCommand::Exit => break,
                        SpecialCommand::None => {
                            let outcome = orchestrator.send(trimmed, Vec::new()).await;
                            stream_answer(&mut orchestrator, outcome).await;
                            // The failure was already printed under the answer.
                            orchestrator.dismiss_error();
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("EOF");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        tracing::info!("Chat session ended");
        Ok(())
    }

    async fn open_conversation(orchestrator: &mut SendOrchestrator, id: &str) {
        match orchestrator.select_conversation(id).await {
            Ok(()) => {
                let title = orchestrator
                    .directory()
                    .get(id)
                    .map(|c| c.title.clone())
                    .unwrap_or_else(|| id.to_string());
                println!("{} {}\n", "Opened".green(), title.bold());
                print_transcript(orchestrator.transcript().messages());
            }
            Err(_) => show_banner(orchestrator),
        }
    }

    fn show_banner(orchestrator: &mut SendOrchestrator) {
        if let Some(banner) = orchestrator.error_banner() {
            println!("{} {}", "Error:".red().bold(), banner);
        }
        orchestrator.dismiss_error();
    }

    fn prompt(orchestrator: &SendOrchestrator) -> String {
        let label = match orchestrator.conversation_id() {
            Some(id) => orchestrator
                .directory()
                .get(id)
                .map(|c| truncate_with_ellipsis(&c.title, 20, TitleUnit::Width))
                .unwrap_or_else(|| id.to_string()),
            None => "new".to_string(),
        };
        format!("[{}] {} ", label.cyan(), "you>".blue().bold())
    }

    fn print_stats(orchestrator: &SendOrchestrator) {
        let stats = orchestrator.stats();
        println!("\n{}", "Conversation Summary".bold());
        println!(
            "Conversation: {}",
            orchestrator.conversation_id().unwrap_or("(not yet created)")
        );
        println!("Messages:     {}", stats.total);
        println!("  from you:   {}", stats.user_messages);
        println!("  answers:    {}", stats.assistant_messages);
        if stats.sources.is_empty() {
            println!("Sources:      none");
        } else {
            println!("Sources:      {}", stats.sources.join(", "));
        }
        println!();
    }

    fn print_welcome_banner(config: &Config, offline: bool) {
        println!("{}", "Docuchat - ask questions about your documents".bold());
        if offline {
            println!("Backend: {}", "offline (answers are echoed)".yellow());
        } else {
            println!("Backend: {}", config.backend.base_url.cyan());
        }
        println!(
            "Streaming: {}",
            if config.backend.streaming { "on" } else { "off" }
        );
        println!("Type {} for commands.\n", "/help".cyan());
    }

}

// Single question handler
pub mod ask {
    //! One-shot question handler.
    //!
    //! Sends one question in a new conversation (or an existing one with
    //! `--conversation`), streams the answer to stdout and exits.

    use super::*;
    use crate::error::DocuchatError;

    /// Ask a single question
    ///
    /// # Errors
    ///
    /// Returns an error when the conversation cannot be opened or the answer
    /// fails, so the process exits non-zero.
    pub async fn run_ask(
        config: Config,
        question: String,
        conversation: Option<String>,
        offline: bool,
    ) -> Result<()> {
        let backend = build_backend(&config, offline)?;
        let mut orchestrator = SendOrchestrator::new(backend, &config);

        if let Some(id) = conversation {
            orchestrator.select_conversation(&id).await?;
        }

        let outcome = orchestrator.send(&question, Vec::new()).await;
        match stream_answer(&mut orchestrator, outcome).await {
            Some(Completion::Finalized(_)) => Ok(()),
            Some(Completion::Failed(reason)) => Err(DocuchatError::Stream(reason).into()),
            Some(Completion::Cancelled) => {
                Err(DocuchatError::Stream("answer cancelled".to_string()).into())
            }
            None => Err(DocuchatError::Validation("question is empty".to_string()).into()),
        }
    }

}
