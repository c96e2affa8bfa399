use std::fs::{self, File};
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use ratatui::style::Color;
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

mod api;
mod app;
mod config;
mod format;
mod handler;
mod host;
mod tui;
mod ui;

use api::{Backend, DEFAULT_API_BASE, HttpBackend};
use app::App;
use config::Config;
use host::{FALLBACK_USER_ID, Host, TerminalHost};

#[derive(Parser)]
#[command(name = "charla")]
#[command(about = "Terminal chat client for a remote AI chat backend")]
struct Cli {
    /// Base URL of the chat backend
    #[arg(long, env = "CHARLA_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// User identity supplied by the host context
    #[arg(long, env = "CHARLA_USER_ID")]
    user_id: Option<i64>,

    /// Accent color (name or #rrggbb)
    #[arg(long, default_value = "cyan")]
    accent: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the models the backend offers
    Models,
    /// Print the stored conversation history
    History {
        /// Conversation id (defaults to the main conversation)
        #[arg(long)]
        chat_id: Option<i64>,
    },
    /// Clear the stored conversation history
    Clear {
        /// Conversation id (defaults to the main conversation)
        #[arg(long)]
        chat_id: Option<i64>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let Cli {
        api_base,
        user_id,
        accent,
        command,
    } = Cli::parse();

    let backend = HttpBackend::new(&api_base);

    match command {
        Some(Commands::Models) => list_models(&backend).await,
        Some(Commands::History { chat_id }) => {
            print_history(&backend, user_id.unwrap_or(FALLBACK_USER_ID), chat_id).await
        }
        Some(Commands::Clear { chat_id, yes }) => {
            clear_history(&backend, user_id.unwrap_or(FALLBACK_USER_ID), chat_id, yes).await
        }
        None => run_tui(backend, user_id, &accent).await,
    }
}

/// Logs go to a file so they never fight the TUI for the terminal.
/// `RUST_LOG` selects verbosity, silent by default.
fn init_logging() {
    let Some(dir) = dirs::config_dir() else {
        return;
    };
    let dir = dir.join("charla");
    if fs::create_dir_all(&dir).is_err() {
        return;
    }
    let Ok(file) = File::create(dir.join("charla.log")) else {
        return;
    };
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .with_writer(Arc::new(file))
        .try_init();
}

async fn run_tui(backend: HttpBackend, user_id: Option<i64>, accent: &str) -> Result<()> {
    let accent = match accent.parse::<Color>() {
        Ok(color) => Some(color),
        Err(_) => {
            warn!(accent, "unknown accent color, using default");
            None
        }
    };

    let backend: Arc<dyn Backend> = Arc::new(backend);
    let host: Arc<dyn Host> = Arc::new(TerminalHost::new(user_id, accent));
    let config_path = Config::config_path()?;
    let config = Config::load().unwrap_or_else(|err| {
        warn!(error = %err, "preferences unreadable, using defaults");
        Config::new()
    });

    let mut app = App::initialize(backend, host, config, config_path).await;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            if let Some(event) = events.next().await {
                handler::handle_event(&mut app, event).await?;
            }
        }
        Ok(())
    }
    .await;

    tui::restore()?;
    result
}

async fn list_models(backend: &HttpBackend) -> Result<()> {
    println!("\n{}", "Available models".bold().blue());

    match backend.models().await {
        Ok(models) => {
            for model in models {
                println!("  {} {}", model.label.green(), format!("({})", model.id).dimmed());
            }
        }
        Err(err) => {
            println!("{}: {}", "Error contacting backend".red(), err);
        }
    }

    Ok(())
}

async fn print_history(backend: &HttpBackend, user_id: i64, chat_id: Option<i64>) -> Result<()> {
    let history = backend.history(user_id, chat_id).await?;

    if history.is_empty() {
        println!("{}", "No messages yet.".dimmed());
        return Ok(());
    }

    for entry in history {
        let label = if entry.role == "assistant" {
            "Bot".magenta().bold()
        } else {
            "You".green().bold()
        };
        let text = format::to_plain(&format::format_text(&entry.content));
        println!("{}  {}\n", label, text);
    }

    Ok(())
}

async fn clear_history(
    backend: &HttpBackend,
    user_id: i64,
    chat_id: Option<i64>,
    yes: bool,
) -> Result<()> {
    if !yes {
        print!("Clear history for user {}? [y/N] ", user_id);
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted.");
            return Ok(());
        }
    }

    match backend.clear_history(user_id, chat_id).await {
        Ok(true) => println!("{}", "History cleared.".green()),
        Ok(false) => println!("{}", "Server refused to clear history.".yellow()),
        Err(err) => println!("{}: {}", "Error contacting backend".red(), err),
    }

    Ok(())
}
