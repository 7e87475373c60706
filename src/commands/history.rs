use crate::cli::HistoryCommand;
use crate::commands::{build_backend, print_transcript};
use crate::config::Config;
use crate::directory::group_by_age;
use crate::error::Result;
use crate::orchestrator::SendOrchestrator;
use crate::text::{truncate_with_ellipsis, TitleUnit};
use crate::types::Conversation;
use colored::Colorize;
use prettytable::{format, Table};

/// Width of the title column in listings
const TITLE_COLUMN_WIDTH: usize = 40;

/// Handle history commands
pub async fn handle_history(config: Config, command: HistoryCommand, offline: bool) -> Result<()> {
    let backend = build_backend(&config, offline)?;
    let mut orchestrator = SendOrchestrator::new(backend, &config);

    match command {
        HistoryCommand::List { search, all } => {
            let conversations = load_listing(&mut orchestrator, search.as_deref(), all).await?;

            if conversations.is_empty() {
                println!("{}", "No conversation history found.".yellow());
                return Ok(());
            }

            print_grouped(&conversations);
            if orchestrator.directory().has_more() {
                println!("Use {} to list every conversation.", "--all".cyan());
            }
            println!(
                "Use {} to resume a conversation.",
                "docuchat chat --resume <ID>".cyan()
            );
            println!();
        }
        HistoryCommand::Show { id } => {
            orchestrator.select_conversation(&id).await?;
            let stats = orchestrator.stats();
            println!(
                "\n{} ({} messages, {} cited documents)\n",
                id.bold(),
                stats.total,
                stats.sources.len()
            );
            print_transcript(orchestrator.transcript().messages());
        }
        HistoryCommand::Delete { id } => {
            orchestrator.delete_conversation(&id).await?;
            println!("{}", format!("Deleted conversation {}", id).green());
        }
    }

    Ok(())
}

/// Load the conversations a listing shows
///
/// A search or `--all` covers every page.
async fn load_listing(
    orchestrator: &mut SendOrchestrator,
    search: Option<&str>,
    all: bool,
) -> Result<Vec<Conversation>> {
    orchestrator.refresh_conversations().await?;
    if all || search.is_some() {
        while orchestrator.directory().has_more() {
            orchestrator.load_more_conversations().await?;
        }
    }
    Ok(orchestrator.directory().filter(search.unwrap_or(""), None))
}

/// Print conversations as one table per age group
pub fn print_grouped(conversations: &[Conversation]) {
    let now = chrono::Local::now();
    for group in group_by_age(conversations, &now) {
        println!("\n{}", group.group.label().bold().underline());

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
        table.add_row(prettytable::row![
            "ID".bold(),
            "Title".bold(),
            "Messages".bold(),
            "Last Updated".bold()
        ]);

        for conversation in &group.conversations {
            let title =
                truncate_with_ellipsis(&conversation.title, TITLE_COLUMN_WIDTH, TitleUnit::Width);
            let updated = conversation
                .updated_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string();
            table.add_row(prettytable::row![
                conversation.id.cyan(),
                title,
                conversation.message_count,
                updated
            ]);
        }

        table.printstd();
    }
    println!();
}
