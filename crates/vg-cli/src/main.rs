//! Vigil CLI
//!
//! Operator front end for the `vigild` agent: drive the stepped scan,
//! watch allow-listed events and query the HTTP surface.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vg_core::config::{self, AgentConfig};
use vigil::commands::{self, CheckKind};
use vigil::ipc::AgentClient;
use vigil::output::{print_error, print_success, print_warning};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(author, version, about = "Compliance monitoring agent control")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the agent configuration file (for ports)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Command server port (overrides config)
    #[arg(long, global = true, env = "VIGIL_IPC_PORT")]
    port: Option<u16>,

    /// HTTP port (overrides config)
    #[arg(long, global = true, env = "VIGIL_HTTP_PORT")]
    http_port: Option<u16>,

    /// Print machine-readable JSON where supported
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stepped scan status
    Status,

    /// Start a stepped scan
    Start,

    /// Retry a blocked step after fixing the reported issues
    Retry {
        /// Step to retry (1 = notifications, 2 = security)
        #[arg(value_parser = clap::value_parser!(u8).range(1..=2))]
        step: u8,
    },

    /// Cancel the active scan
    Cancel,

    /// Reset the scan state to idle
    Reset,

    /// Check whether the agent is reachable
    Ping,

    /// Stream allow-listed events
    Watch,

    /// Show agent health from the HTTP surface
    Health,

    /// Run one independent check
    Check {
        #[arg(value_enum)]
        kind: CheckKind,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let agent_config = load_agent_config(cli.config.as_ref());
    let ipc_port = cli.port.unwrap_or(agent_config.ipc_port);
    let http_port = cli.http_port.unwrap_or(agent_config.http_port);

    let mut client = AgentClient::with_port(ipc_port);

    match cli.command {
        Commands::Status => commands::status_command(&mut client, cli.json).await,
        Commands::Start => commands::start_command(&mut client).await,
        Commands::Retry { step } => commands::retry_command(&mut client, step).await,
        Commands::Cancel => commands::cancel_command(&mut client).await,
        Commands::Reset => commands::reset_command(&mut client).await,
        Commands::Ping => match client.ping().await {
            Ok(true) => {
                print_success(&format!("Agent is running at {}", client.address()));
                Ok(())
            }
            Ok(false) => {
                print_warning("Agent answered with an unexpected message");
                Ok(())
            }
            Err(e) => {
                print_error(&format!("Agent is not reachable: {}", e));
                Err(e)
            }
        },
        Commands::Watch => commands::watch_command(&mut client, cli.json).await,
        Commands::Health => commands::health_command(http_port, cli.json).await,
        Commands::Check { kind } => commands::check_command(http_port, kind).await,
    }
}

/// Read ports from the agent's config file, falling back to defaults
fn load_agent_config(path: Option<&PathBuf>) -> AgentConfig {
    let path = path.cloned().unwrap_or_else(config::default_config_path);
    if !path.exists() {
        return AgentConfig::default();
    }

    config::load_config(&path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from {:?}: {}", path, e);
        AgentConfig::default()
    })
}
