//! cmdrun: serve catalog commands over WebSocket, one PTY per connection.
//!
//! Clients connect to `ws://<bind>:<port><prefix>/<command id>`, send an
//! `options` message, and from then on receive batched terminal output and
//! may send keystrokes.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use cmdrun_common::CmdrunError;
use cmdrun_config::load_config;
use cmdrun_pty::NativePtySpawner;
use cmdrun_runner::{RunnerConfig, SessionRunner};
use cmdrun_server::{serve, ProtocolConfig, ServerState};
use cmdrun_store::{load_catalog, FsBlobStore};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cmdrun", about = "Run catalog commands in a pseudo-terminal over WebSocket")]
struct Args {
    /// Config file. Defaults to the platform config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on. Overrides the config file and `PORT`.
    #[arg(short, long)]
    port: Option<u16>,

    /// Log filter directive, e.g. `cmdrun=debug`. Overrides `RUST_LOG`.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> cmdrun_common::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let catalog = Arc::new(load_catalog(&config.storage.catalog_path()).await?);
    let blobs = Arc::new(FsBlobStore::new(&config.storage.data_dir));
    let spawner = Arc::new(NativePtySpawner::new(config.runner.shell_override()));
    let runner = SessionRunner::new(
        RunnerConfig::from_run_config(&config.runner),
        catalog,
        blobs,
        spawner.clone(),
    );
    let state = ServerState::new(
        runner,
        ProtocolConfig::from_server_config(&config.server),
        &config.server.path_prefix,
    );

    let addr = config.server.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| CmdrunError::Network(format!("bind {addr}: {e}")))?;

    tracing::info!(
        shell = spawner.shell(),
        prefix = %config.server.path_prefix,
        "cmdrun listening on {}",
        addr
    );

    tokio::select! {
        _ = serve(listener, state) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    Ok(())
}
