//! # Lyra CLI
//!
//! Command-line interface for the Lyra multi-agent consensus runtime.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Lyra - multi-agent consensus runtime
#[derive(Parser, Debug)]
#[command(name = "lyra")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Boot the Lyra kernel
    Boot {
        /// Path to the bootstrap record
        #[arg(short, long, env = "LYRA_CONFIG", default_value = "bootstrap.yaml")]
        config: PathBuf,

        /// Tick interval in milliseconds
        #[arg(short, long, env = "LYRA_TICK_INTERVAL", default_value_t = 1000)]
        interval: u64,

        /// Quorum threshold (0.0-1.0)
        #[arg(short, long, env = "LYRA_QUORUM_THRESHOLD", default_value_t = 0.66)]
        quorum: f64,

        /// Keystore directory
        #[arg(long, default_value = ".lyra/keys")]
        keystore: PathBuf,

        /// Ledger directory
        #[arg(long, default_value = ".lyra/ledger")]
        ledger: PathBuf,

        /// Start a conversation with this prompt once running
        #[arg(short, long)]
        prompt: Option<String>,

        /// Maximum number of conversation turns
        #[arg(long, default_value_t = 20)]
        max_turns: u64,

        /// Save the conversation log to this file on exit
        #[arg(long)]
        log_file: Option<PathBuf>,

        /// Enable debug logging
        #[arg(short, long)]
        debug: bool,
    },

    /// Run an agent worker for a model
    Run {
        /// Model to run
        model: String,

        /// Agent identifier (defaults to the model name)
        #[arg(long)]
        agent_id: Option<String>,

        /// Keystore directory
        #[arg(long, default_value = ".lyra/keys")]
        keystore: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let debug = matches!(cli.command, Commands::Boot { debug: true, .. });
    let default_filter = if debug { "lyra=debug" } else { "lyra=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result: Result<()> = match cli.command {
        Commands::Boot {
            config,
            interval,
            quorum,
            keystore,
            ledger,
            prompt,
            max_turns,
            log_file,
            debug: _,
        } => {
            commands::boot(commands::BootArgs {
                config,
                interval,
                quorum,
                keystore,
                ledger,
                prompt,
                max_turns,
                log_file,
            })
            .await
        }
        Commands::Run {
            model,
            agent_id,
            keystore,
        } => commands::run_worker(&model, agent_id.as_deref(), &keystore).await,
    };

    if let Err(err) = result {
        eprintln!("lyra: {err}");
        std::process::exit(1);
    }
}
