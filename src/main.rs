//! Sandbridge daemon
//!
//! Usage:
//!     sandbridge --api-url http://10.0.0.5:8090 --watch-dir /nsm/bro/extracted

use anyhow::Context;
use clap::Parser;
use sandbridge::backends::CuckooClient;
use sandbridge::config::{load_env_file, parse_extensions, Config};
use sandbridge::pipeline::ScanLoop;
use sandbridge::readiness;
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "sandbridge",
    version,
    about = "Scores files extracted by a network monitor with a Cuckoo sandbox"
)]
struct Args {
    /// Load environment variables from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Cuckoo REST API base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Cuckoo REST API bearer token
    #[arg(long)]
    api_token: Option<String>,

    /// Directory to watch
    #[arg(long)]
    watch_dir: Option<PathBuf>,

    /// Comma-separated extensions that are never submitted
    #[arg(long)]
    disallow: Option<String>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG may come from the env file, so load it before the subscriber.
    let env_file = load_env_file(args.env_file.as_deref()).context("Failed to load env file")?;

    let default_filter = if args.verbose {
        "sandbridge=debug"
    } else {
        "sandbridge=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(path) = &env_file {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    let config = load_config(&args)?;

    tracing::info!("Starting sandbridge");
    tracing::info!("  Sandbox: {}", config.api_url);
    tracing::info!("  Watching: {}", config.watch_dir.display());
    tracing::info!("  Disallowed extensions: {:?}", config.disallowed_extensions);
    tracing::info!(
        "  Analysis timeout: {}s, poll interval: {}s",
        config.analysis_timeout.as_secs(),
        config.poll_interval.as_secs()
    );

    let client = CuckooClient::new(config.cuckoo()).context("Failed to build sandbox client")?;
    let scan_loop = ScanLoop::new(Arc::new(client), config.scan_loop(), config.poller());

    if args.once {
        let summary = scan_loop.run_cycle().await;
        sandbridge::audit::emit_cycle_completed(&summary, std::time::Duration::ZERO);
        return Ok(());
    }

    if let Err(e) = readiness::notify_ready() {
        tracing::warn!(error = %e, "Readiness notification failed");
    }
    let _ = readiness::notify_status("scanning");

    tokio::select! {
        _ = scan_loop.run_forever() => {}
        _ = shutdown_signal() => {
            tracing::info!("Shutdown requested");
        }
    }

    let _ = readiness::notify_stopping();
    tracing::info!("Sandbridge stopped");
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = Config::from_env().context("Invalid environment configuration")?;

    if let Some(url) = &args.api_url {
        config.api_url = url.clone();
    }
    if let Some(token) = &args.api_token {
        config.api_token = SecretString::from(token.clone());
    }
    if let Some(dir) = &args.watch_dir {
        config.watch_dir = dir.clone();
    }
    if let Some(list) = &args.disallow {
        config.disallowed_extensions = parse_extensions(list);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
