//! Chyrp CLI - a command-line client for Chyrp blogs.
//!
//! Every invocation restores the saved session first, so `login` once and
//! later commands run as that user until the server rejects the token.

mod commands;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chyrp_core::Config;

use commands::App;

#[derive(Parser)]
#[command(name = "chyrp", version, about = "Command-line client for Chyrp blogs")]
pub struct Args {
    #[arg(long, value_name = "URL", help = "API base URL (overrides config)")]
    pub api_url: Option<String>,

    #[arg(long, value_name = "PATH", help = "Also write logs to this file")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Log in and remember the session
    Login {
        username: Option<String>,
        #[arg(long, help = "Password (prompted when omitted)")]
        password: Option<String>,
    },
    /// Create an account and log in
    Register {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    /// Forget the saved session
    Logout,
    /// Show who is logged in
    Whoami {
        #[arg(long, help = "Fetch the full profile from the server")]
        full: bool,
    },
    /// List posts
    Posts {
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        featured: bool,
        #[arg(long)]
        page: Option<u32>,
    },
    /// Show a post and its comments
    Show { slug: String },
    /// Like or unlike a post
    Like { slug: String },
    /// Comment on a post
    Comment {
        slug: String,
        text: String,
        #[arg(long, value_name = "COMMENT_ID")]
        reply_to: Option<i64>,
    },
    /// Write a new post
    NewPost {
        #[arg(long)]
        title: String,
        #[arg(long, conflicts_with = "file")]
        content: Option<String>,
        #[arg(long, help = "Read the post body from a file")]
        file: Option<PathBuf>,
        #[arg(long)]
        excerpt: Option<String>,
        #[arg(long)]
        category: Option<i64>,
        #[arg(long = "tag", action = clap::ArgAction::Append)]
        tags: Vec<String>,
        #[arg(long, help = "Publish immediately instead of saving a draft")]
        publish: bool,
        #[arg(long)]
        no_comments: bool,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr = fmt::layer().with_writer(io::stderr);

    let Some(path) = log_file else {
        tracing_subscriber::registry().with(stderr).with(filter).init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("Invalid log file path: {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));

    tracing_subscriber::registry()
        .with(stderr)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    Ok(Some(guard))
}

fn load_config(api_url: Option<String>) -> Config {
    let mut config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        let mut config = Config::default();
        config.apply_env();
        config
    });
    if let Some(url) = api_url {
        config.api_base_url = url;
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let _log_guard = init_tracing(args.log_file.as_deref())?;

    let config = load_config(args.api_url);
    info!(api = %config.api_base_url, "Chyrp CLI starting");

    let mut app = App::new(config)?;
    let result = app.run(args.command).await;
    app.shutdown();
    result
}
