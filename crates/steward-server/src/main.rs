//! Steward HTTP server
//!
//! Runs the command gateway on a local port for the browser extension.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use steward::{Dispatcher, ExplainerHandler, GatewayConfig, HandlerRegistry, SqliteHistoryStore};
use steward_server::AppState;

/// Steward server - permission-gated local command gateway
#[derive(Parser, Debug)]
#[command(name = "steward-server")]
#[command(about = "HTTP gateway for sandboxed local commands")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8000")]
    addr: SocketAddr,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite history database (overrides the config file)
    #[arg(long)]
    history_db: Option<PathBuf>,

    /// Sandbox directory; becomes the only allowed root (overrides the config file)
    #[arg(long)]
    sandbox: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(sandbox) = args.sandbox {
        config = config.sandboxed(sandbox);
    }
    if let Some(history_db) = args.history_db {
        config.history_db = history_db;
    }

    let cwd = std::env::current_dir().context("failed to read working directory")?;
    config.sandbox_root = cwd.join(&config.sandbox_root);
    config.allowed_roots = config
        .allowed_roots
        .iter()
        .map(|root| cwd.join(root))
        .collect();
    std::fs::create_dir_all(&config.sandbox_root).with_context(|| {
        format!("failed to create sandbox {}", config.sandbox_root.display())
    })?;
    tracing::info!(
        sandbox = %config.sandbox_root.display(),
        roots = ?config.allowed_roots,
        "sandbox ready"
    );

    let history = Arc::new(
        SqliteHistoryStore::open(&config.history_db)
            .with_context(|| format!("failed to open {}", config.history_db.display()))?,
    );

    let registry =
        HandlerRegistry::new().with(Arc::new(ExplainerHandler::from_config(&config.explainer)?));
    let dispatcher = Dispatcher::from_config(&config, history.clone(), registry);

    steward_server::run(args.addr, AppState::new(dispatcher, history)).await?;

    tracing::info!("steward server shutting down");
    Ok(())
}
