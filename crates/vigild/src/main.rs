//! vigild — the Vigil daemon.
//!
//! Single binary that assembles the monitoring subsystems:
//! - State store (redb)
//! - Check scheduler and status transition engine
//! - Email/SMS notifier
//! - REST API + live event stream
//!
//! # Usage
//!
//! ```text
//! vigild init --config vigil.toml
//! vigild run --port 4000 --data-dir /var/lib/vigil
//! vigild check 7
//! ```

mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vigil_core::VigilConfig;

const DEFAULT_LOG_FILTER: &str = "info,vigild=debug,vigil=debug";

#[derive(Parser)]
#[command(name = "vigild", about = "Vigil host-service monitor")]
struct Cli {
    /// Path to vigil.toml.
    #[arg(long, global = true, default_value = "vigil.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitor and the API server.
    Run {
        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state (overrides the config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Write a scaffolded vigil.toml.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Check one host service now and print the result.
    Check {
        /// Host service id.
        id: u64,

        /// Status label echoed back as the previous status.
        #[arg(long, default_value = "pending")]
        old_status: String,

        /// Data directory for persistent state (overrides the config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run { port, data_dir } => {
            let mut config = VigilConfig::load_or_default(&cli.config)?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            daemon::run(config).await
        }
        Command::Init { force } => daemon::write_scaffold(&cli.config, force),
        Command::Check {
            id,
            old_status,
            data_dir,
        } => {
            let mut config = VigilConfig::load_or_default(&cli.config)?;
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            let result = daemon::check_once(config, id, &old_status).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
