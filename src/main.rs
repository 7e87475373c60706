//! Docuchat - chat with your documents from the terminal
//!
#![doc = "Main entry point for the Docuchat client application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docuchat::cli::{Cli, Commands};
use docuchat::commands;
use docuchat::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Initialize tracing
    init_tracing(&config, cli.verbose);

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { resume } => {
            tracing::info!("Starting interactive chat session");
            if let Some(r) = &resume {
                tracing::debug!("Resuming conversation: {}", r);
            }
            commands::chat::run_chat(config, resume, cli.offline).await?;
            Ok(())
        }
        Commands::Ask {
            question,
            conversation,
        } => {
            tracing::info!("Asking a single question");
            commands::ask::run_ask(config, question, conversation, cli.offline).await?;
            Ok(())
        }
        Commands::History { command } => {
            tracing::info!("Starting history command");
            commands::history::handle_history(config, command, cli.offline).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to this
/// crate, raised to `debug` by `--verbose`. Logs go to stderr so streamed
/// answers on stdout stay clean.
fn init_tracing(config: &Config, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("docuchat={}", level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.logging.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
