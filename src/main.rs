mod config;
mod events;
mod exchange;
mod reply;
mod session;
mod title;
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use exchange::{ExchangeController, ExchangeOutcome};
use reply::{ReplyGenerator, SimulatedReply};
use session::{Conversation, Session};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use ui::ChatApp;

#[derive(Parser)]
#[command(name = "chatdeck")]
#[command(version)]
#[command(about = "Terminal chat with multiple conversations", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.chatdeck/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the simulated reply delay, in milliseconds
    #[arg(long, global = true)]
    delay_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send messages to a fresh conversation and print the result
    Ask {
        /// Each argument is submitted as its own message
        #[arg(required = true)]
        texts: Vec<String>,

        /// Print the conversation as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the default configuration file
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(delay_ms) = cli.delay_ms {
        config.reply_delay_ms = delay_ms;
    }

    match cli.command {
        None => {
            init_logging(LogTarget::File(config.log_path()?))?;
            tracing::info!("Starting chat session");
            let app = ChatApp::new(controller_for(&config), &config);
            app.run().await
        }
        Some(Commands::Ask { texts, json }) => {
            init_logging(LogTarget::Stderr)?;
            let conversation = ask(&controller_for(&config), &texts).await?;
            if json {
                let output = serde_json::to_string_pretty(&conversation)
                    .context("Failed to serialize conversation")?;
                println!("{}", output);
            } else {
                print_conversation(&conversation);
            }
            Ok(())
        }
        Some(Commands::InitConfig) => {
            let path = match cli.config {
                Some(path) => path,
                None => Config::default_path()?,
            };
            anyhow::ensure!(!path.exists(), "{} already exists", path.display());
            Config::default().save(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

enum LogTarget {
    Stderr,
    File(PathBuf),
}

fn init_logging(target: LogTarget) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_env("CHATDECK_LOG").unwrap_or_else(|_| "chatdeck=info".into());

    // The TUI owns the terminal, so its logs go to a file
    let writer = match target {
        LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogTarget::File(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).context("Failed to create log directory")?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    Ok(())
}

fn controller_for(config: &Config) -> ExchangeController<dyn ReplyGenerator> {
    let generator: Arc<dyn ReplyGenerator> = Arc::new(SimulatedReply::new(config.reply_delay()));
    ExchangeController::new(
        Session::shared(config.conversation_defaults()),
        generator,
        config.exchange_settings(),
    )
}

/// Submit each text in order to the active conversation and return it
async fn ask<G>(controller: &ExchangeController<G>, texts: &[String]) -> Result<Conversation>
where
    G: ReplyGenerator + ?Sized,
{
    for text in texts {
        match controller.submit(text).await {
            ExchangeOutcome::Completed { .. } => {}
            ExchangeOutcome::Ignored => tracing::warn!("Skipping blank message"),
            ExchangeOutcome::Failed { error, .. } => {
                return Err(error).context("Assistant did not reply");
            }
        }
    }

    Ok(controller.snapshot().await.active_conversation().clone())
}

fn print_conversation(conversation: &Conversation) {
    println!("# {}", conversation.title);
    for message in &conversation.messages {
        println!("\n{}: {}", message.role.display_name(), message.content);
    }
}
