//! streamlinkd — the StreamLink control plane daemon.
//!
//! Single binary that assembles the StreamLink subsystems:
//! - State store (redb)
//! - Secret codec (AES-256-GCM)
//! - Kubernetes connector
//! - Orchestrator + post-install hooks
//! - Cluster monitor
//! - REST API
//!
//! # Usage
//!
//! ```text
//! STREAMLINK_ENCRYPTION_KEY=$(streamlinkd generate-key) \
//!     streamlinkd standalone --port 8000 --data-dir /var/lib/streamlink
//! ```

mod standalone;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use streamlink_secrets::AesGcmCodec;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "streamlinkd", about = "StreamLink control plane daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane (API, orchestrator and cluster monitor in one process).
    Standalone {
        /// Port to listen on. Overrides `server.port`.
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state. Overrides `server.data_dir`.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Path to streamlink.toml.
        #[arg(long, short)]
        config: Option<PathBuf>,
    },

    /// Print a fresh base64 encryption key for STREAMLINK_ENCRYPTION_KEY.
    GenerateKey,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Standalone {
            port,
            data_dir,
            config,
        } => {
            standalone::run_standalone(standalone::Overrides {
                port,
                data_dir,
                config,
            })
            .await
        }
        Command::GenerateKey => {
            println!("{}", AesGcmCodec::generate_key()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,streamlinkd=debug,streamlink=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
