//! Vigil agent daemon
//!
//! Runs on the monitored machine: serves local clients on the command
//! server, accepts UI callbacks over HTTP, scans in the background and
//! optionally relays allow-listed events to a remote observer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vg_core::config::{self, AgentConfig};
use vg_core::SignatureStore;
use vg_orchestrator::background;
use vg_orchestrator::ipc::CommandServer;
use vg_orchestrator::providers::{default_providers, SysinfoSecurityProvider};
use vg_orchestrator::relay::RemoteRelay;
use vg_orchestrator::{http, AgentContext};

/// How long servers get to wind down after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "vigild")]
#[command(about = "Vigil compliance monitoring agent")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Command server port (overrides config)
    #[arg(long)]
    ipc_port: Option<u16>,

    /// HTTP port (overrides config)
    #[arg(long)]
    http_port: Option<u16>,

    /// Signature file (overrides config)
    #[arg(long)]
    signatures: Option<PathBuf>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Vigil agent starting...");

    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                AgentConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            AgentConfig::default()
        }
    };

    if let Some(port) = args.ipc_port {
        config.ipc_port = port;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(path) = args.signatures {
        config.signatures_path = path;
    }

    let signatures = Arc::new(SignatureStore::from_path(&config.signatures_path));

    let providers = default_providers(&config, Arc::clone(&signatures));
    let ctx = Arc::new(AgentContext::new(config.clone(), Arc::clone(&signatures), providers));

    let _trace = ctx.bus.subscribe(|message| {
        tracing::debug!("bus: {} {} {}", message.kind, message.name, message.payload);
        Ok(())
    });

    let cancel = CancellationToken::new();
    tokio::spawn(watch_signals(cancel.clone()));

    let mut tasks: JoinSet<(&'static str, Result<()>)> = JoinSet::new();

    let server = CommandServer::new(
        config.ipc_address(),
        Arc::clone(&ctx.orchestrator),
        Arc::clone(&ctx.bus),
    )
    .with_shutdown_token(cancel.clone());
    tasks.spawn(async move { ("command server", server.run().await) });

    let http_ctx = Arc::clone(&ctx);
    let http_cancel = cancel.clone();
    tasks.spawn(async move { ("http server", http::run(http_ctx, http_cancel).await) });

    let reload_store = Arc::clone(&signatures);
    let reload_every = config.signature_reload_interval;
    let reload_cancel = cancel.clone();
    tasks.spawn(async move {
        reload_signatures(reload_store, reload_every, reload_cancel).await;
        ("signature reload", Ok(()))
    });

    if config.relay.enabled {
        let relay = RemoteRelay::new(config.relay.clone(), Arc::clone(&ctx.bus))
            .with_shutdown_token(cancel.clone());
        tasks.spawn(async move { ("relay", relay.run().await) });
    } else {
        tracing::info!("Remote relay disabled");
    }

    let mut scanner_thread = None;
    if config.background.enabled {
        let (scanner, handle, results) = background::channel(
            Arc::new(SysinfoSecurityProvider::new()),
            config.background.scan_timeout,
        );
        scanner_thread = Some(
            scanner
                .spawn_thread()
                .context("Failed to spawn background scanner thread")?,
        );

        let bus = Arc::clone(&ctx.bus);
        let store = Arc::clone(&signatures);
        let interval = config.background.interval;
        let background_cancel = cancel.clone();
        tasks.spawn(async move {
            background::supervise(handle, results, store, bus, interval, background_cancel).await;
            ("background scans", Ok(()))
        });
    } else {
        tracing::info!("Background scanning disabled");
    }

    // A server that stops on its own takes the agent down with it
    let mut failed = None;
    tokio::select! {
        _ = cancel.cancelled() => {}
        Some(joined) = tasks.join_next() => {
            match joined {
                Ok((name, Err(e))) => {
                    tracing::error!("{} failed: {:#}", name, e);
                    failed = Some(e);
                }
                Ok((name, Ok(()))) => tracing::warn!("{} stopped unexpectedly", name),
                Err(e) => tracing::error!("Task panicked: {}", e),
            }
            cancel.cancel();
        }
    }

    let drain = async {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Err(e))) => tracing::warn!("{} failed during shutdown: {:#}", name, e),
                Ok((name, Ok(()))) => tracing::debug!("{} stopped", name),
                Err(e) => tracing::warn!("Task panicked during shutdown: {}", e),
            }
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!("Timed out waiting for servers to stop");
    }

    // Every handle is gone, so the scanner exits after its current scan
    if let Some(thread) = scanner_thread {
        let joined = tokio::task::spawn_blocking(move || thread.join());
        match tokio::time::timeout(SHUTDOWN_GRACE, joined).await {
            Ok(Ok(Ok(()))) => tracing::debug!("Background scanner thread joined"),
            Ok(_) => tracing::warn!("Background scanner thread panicked"),
            Err(_) => tracing::warn!("Background scanner still busy, not waiting"),
        }
    }

    tracing::info!("Vigil agent shutdown complete");
    match failed {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Cancel the token on Ctrl+C or SIGTERM
async fn watch_signals(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cancel.cancel();
}

/// Re-read the signature file until shutdown
async fn reload_signatures(store: Arc<SignatureStore>, every: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    // The store was loaded at startup; skip the immediate tick
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = store.reload().await {
                    tracing::warn!("Failed to reload signatures: {}", e);
                }
            }
        }
    }
}
