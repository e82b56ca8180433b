//! Steward CLI - run built-in commands without the server
//!
//! Usage:
//!   steward -c "run echo hi"     Execute one command
//!   steward commands.txt         Execute a file, one command per line
//!   steward                      Read commands from stdin
//!
//! History is kept in memory unless `--history-db` is given.

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use steward::{
    BUILTIN_HANDLER, Dispatcher, GatewayConfig, HandlerRegistry, HistoryStore,
    MemoryHistoryStore, SqliteHistoryStore, Task,
};

/// Steward CLI - sandboxed local commands
#[derive(Parser, Debug)]
#[command(name = "steward")]
#[command(about = "Run Steward built-in commands locally")]
struct Args {
    /// Command to execute
    #[arg(short = 'c', conflicts_with = "script")]
    command: Option<String>,

    /// File with one command per line
    script: Option<PathBuf>,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sandbox directory; becomes the only allowed root
    #[arg(long)]
    sandbox: Option<PathBuf>,

    /// Record and read history in this SQLite database
    #[arg(long)]
    history_db: Option<PathBuf>,
}

fn read_commands(args: &Args) -> anyhow::Result<Vec<String>> {
    let text = match (&args.command, &args.script) {
        (Some(command), _) => return Ok(vec![command.clone()]),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("steward: {}", path.display()))?,
        (None, None) => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("steward: failed to read stdin")?;
            text
        }
    };
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(sandbox) = &args.sandbox {
        config = config.sandboxed(sandbox);
    }
    std::fs::create_dir_all(&config.sandbox_root).with_context(|| {
        format!("steward: failed to create sandbox {}", config.sandbox_root.display())
    })?;

    let history: Arc<dyn HistoryStore> = match &args.history_db {
        Some(path) => Arc::new(SqliteHistoryStore::open(path)?),
        None => Arc::new(MemoryHistoryStore::new()),
    };
    let dispatcher = Dispatcher::from_config(&config, history.clone(), HandlerRegistry::new());

    for command in read_commands(&args)? {
        let envelope = dispatcher
            .route(Task::new(BUILTIN_HANDLER).with_field("command", command.clone()))
            .await;
        let output = envelope.to_text();
        if let Err(e) = history.record(BUILTIN_HANDLER, &command, &output) {
            tracing::warn!(error = %e, "failed to record history");
        }
        println!("{}", output.trim_end());
    }

    Ok(())
}
