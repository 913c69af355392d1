//! CLI command implementations.

use anyhow::{Context, Result};
use lyra_kernel::{KernelConfig, KernelService};
use lyra_keyring::Keyring;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Arguments for the `boot` command.
pub struct BootArgs {
    pub config: PathBuf,
    pub interval: u64,
    pub quorum: f64,
    pub keystore: PathBuf,
    pub ledger: PathBuf,
    pub prompt: Option<String>,
    pub max_turns: u64,
    pub log_file: Option<PathBuf>,
}

/// Boots the kernel, optionally drives a conversation, and shuts down on
/// ctrl-c.
pub async fn boot(args: BootArgs) -> Result<()> {
    let mut config = KernelConfig::new(args.config);
    config.tick_interval_ms = args.interval;
    config.quorum_threshold = args.quorum;
    config.keystore_dir = args.keystore;
    config.ledger_dir = args.ledger;

    let kernel = Arc::new(KernelService::new(config).context("failed to initialize kernel")?);
    kernel.boot().await.context("boot failed")?;

    if let Some(prompt) = args.prompt {
        let scheduler = kernel
            .scheduler()
            .context("scheduler unavailable after boot")?;

        let conversation = {
            let scheduler = scheduler.clone();
            let max_turns = args.max_turns;
            tokio::spawn(async move { scheduler.run(&prompt, max_turns).await })
        };

        tokio::select! {
            result = conversation => {
                result.context("conversation task failed")??;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping orchestration");
                scheduler.stop();
            }
        }

        if let Some(path) = args.log_file {
            scheduler
                .save_log(&path)
                .with_context(|| format!("failed to save log to {}", path.display()))?;
        }
    } else {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        info!("interrupted, shutting down");
    }

    kernel.shutdown();
    Ok(())
}

/// Runs an agent worker: issues its keypair, prints the READY handshake,
/// and parks until terminated.
///
/// Prompt/response traffic is served in-process by the kernel's agent
/// shells; the worker's job is the signed boot handshake.
pub async fn run_worker(model: &str, agent_id: Option<&str>, keystore: &Path) -> Result<()> {
    let identity = worker_identity(model, agent_id);
    let keyring = Keyring::new(keystore).context("failed to open keystore")?;
    let (public_key, _) = keyring
        .get_or_create(identity)
        .with_context(|| format!("failed to issue keypair for {identity}"))?;

    println!("READY {public_key}");
    std::io::stdout().flush().ok();
    info!(agent_id = %identity, model = %model, "worker ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    Ok(())
}

fn worker_identity<'a>(model: &'a str, agent_id: Option<&'a str>) -> &'a str {
    agent_id.unwrap_or(model)
}
