//! parley - resolve chat messages into canonical commands
//!
//! Routes a message through the passthrough guards, pattern rules and
//! classifier, then prints the command (or why there is none).
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/parley/config.toml (~/.config/parley/config.toml)
//! - Logs: $XDG_STATE_HOME/parley/parley.log (~/.local/state/parley/parley.log)
//! - Experiment archives: $XDG_DATA_HOME/parley/experiments/

mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use parley_core::{Config, RouteContext, Router};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Resolve chat messages into canonical commands")]
#[command(version)]
struct Args {
    /// User the messages come from
    #[arg(short, long, default_value = "cli", global = true)]
    user: String,

    /// Chat the messages belong to
    #[arg(short, long, default_value = "cli", global = true)]
    chat: String,

    /// Repo the session is bound to (auto-context)
    #[arg(long, global = true)]
    repo: Option<String>,

    /// Company the session is bound to (auto-context)
    #[arg(long, global = true)]
    company: Option<String>,

    /// Config file to use instead of the XDG default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Route one message
    Resolve {
        /// Message text (words are joined with spaces)
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// Score a message with the classifier only
    Classify {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// Route messages read line by line from stdin
    Repl,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };

    let _log_guard =
        parley_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(user = %args.user, chat = %args.chat, "parley starting");

    let router = Router::new(&config);
    let ctx = context(&args);

    match &args.command {
        Command::Resolve { message } => {
            let resolution = router.resolve(&message.join(" "), &ctx);
            if args.format == Format::Json {
                println!("{}", serde_json::to_string_pretty(&resolution)?);
            } else {
                println!("{}", output::resolution_text(&resolution));
            }
        }
        Command::Classify { message } => {
            let result = router.classifier().classify(&message.join(" "), &ctx);
            if args.format == Format::Json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", output::classification_text(&result));
            }
        }
        Command::Repl => run_repl(&router, &ctx, args.format)?,
    }

    Ok(())
}

fn context(args: &Args) -> RouteContext {
    let mut ctx = RouteContext::new(args.user.as_str(), args.chat.as_str());
    if let Some(repo) = &args.repo {
        ctx = ctx.with_auto_repo(repo.as_str());
    }
    if let Some(company) = &args.company {
        ctx = ctx.with_auto_company(company.as_str());
    }
    ctx
}

/// Read messages from stdin until EOF or `:quit`.
///
/// Lines starting with `:` are commands:
/// - `:metrics` prints router counters
/// - `:thread` prints what this chat has talked about
/// - `:correct <command>` records that the previous resolution was wrong
/// - `:quit` exits
fn run_repl(router: &Router, ctx: &RouteContext, format: Format) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut last = None;

    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix(':') {
            let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
            match name {
                "quit" | "q" | "exit" => break,
                "metrics" => {
                    let metrics = router.metrics();
                    if format == Format::Json {
                        writeln!(stdout, "{}", serde_json::to_string(&metrics)?)?;
                    } else {
                        writeln!(stdout, "{}", output::metrics_text(&metrics))?;
                    }
                }
                "thread" => {
                    let state = router.threads().state(&ctx.chat_id);
                    if format == Format::Json {
                        writeln!(stdout, "{}", serde_json::to_string(&state)?)?;
                    } else {
                        writeln!(stdout, "{}", output::thread_text(state.as_ref()))?;
                    }
                }
                "correct" => match (&last, rest.trim()) {
                    (None, _) => writeln!(stdout, "nothing to correct yet")?,
                    (Some(_), "") => writeln!(stdout, "usage: :correct <command>")?,
                    (Some(resolution), correction) => {
                        match router.record_correction(resolution, correction, ctx) {
                            Some(count) => writeln!(stdout, "noted ({count} corrections)")?,
                            None => writeln!(stdout, "nothing to learn from a passthrough")?,
                        }
                    }
                },
                other => writeln!(stdout, "unknown command :{other}")?,
            }
            continue;
        }

        let resolution = router.resolve(line, ctx);
        if format == Format::Json {
            writeln!(stdout, "{}", serde_json::to_string(&resolution)?)?;
        } else {
            writeln!(stdout, "{}", output::resolution_text(&resolution))?;
        }
        last = Some(resolution);
    }

    tracing::info!(total = router.metrics().total, "parley repl finished");
    Ok(())
}
