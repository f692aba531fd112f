use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use start_defender_core::command::Invocation;
use start_defender_core::{ScanAction, DEFAULT_ACCOUNT};
use std::path::PathBuf;

mod api;
mod config;
mod logging;
mod middleware;

use config::{AppState, ServerConfig};
use logging::LogControl;

#[derive(Parser, Debug)]
#[command(name = "start-defender")]
#[command(about = "Start Defender scans on remote computers, directly or through a relay instance", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "start-defender.toml")]
    config: PathBuf,

    /// Directory holding the conf and secrets stores
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the manager endpoints (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8089")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Start a Defender scan
    Scan {
        #[command(flatten)]
        target: Target,

        /// Run a full scan instead of a quick one
        #[arg(long)]
        fullscan: bool,
    },

    /// Retrieve the Defender status of a computer
    Status {
        #[command(flatten)]
        target: Target,
    },
}

#[derive(clap::Args, Debug)]
struct Target {
    /// Account configuration identifier
    #[arg(short, long, default_value = DEFAULT_ACCOUNT)]
    account: String,

    /// Computer to act on
    #[arg(long)]
    computername: String,

    /// User on whose behalf the command runs
    #[arg(long, env = "USER", default_value = "unknown")]
    requester: String,
}

impl Target {
    fn invocation(self, action: ScanAction) -> Invocation {
        Invocation {
            account: self.account,
            computername: self.computername,
            action,
            requester: self.requester,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_control = LogControl::init();

    let args = Args::parse();

    tracing::info!("Data directory: {}", args.data_dir.display());

    let config = ServerConfig::load(&args.config, args.data_dir)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let state = AppState::new(&config, log_control);

    match args.command.unwrap_or(Command::Serve {
        port: 8089,
        host: "127.0.0.1".to_string(),
    }) {
        Command::Serve { port, host } => {
            let addr = format!("{}:{}", host, port);
            tracing::info!("Starting start-defender manager on {}", addr);
            api::serve(&addr, state).await?;
        }
        Command::Scan { target, fullscan } => {
            run_command(&state, target.invocation(ScanAction::StartScan { fullscan })).await?;
        }
        Command::Status { target } => {
            run_command(&state, target.invocation(ScanAction::GetStatus)).await?;
        }
    }

    Ok(())
}

/// Run the generating command and print one JSON record per line.
async fn run_command(state: &AppState, invocation: Invocation) -> Result<()> {
    let settings = state
        .config()
        .get_conf()
        .await
        .context("Failed to read instance settings")?;
    state.log_control.apply(&settings.logging);

    let records = state.command().run(&settings, &invocation).await;
    for record in records {
        println!("{}", serde_json::to_string(&record)?);
    }

    Ok(())
}
