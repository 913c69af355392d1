//! Worker process management.
//!
//! One worker process runs per agent. The contract is minimal: the worker
//! is spawned as `<program> run <model> --agent-id <id>` and must print a
//! single stdout line containing `READY <pubkey_b64>`. Exit codes are
//! logged but never interpreted.

use crate::error::KernelError;
use lyra_bus::{topics, Bus};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info};

/// Spawns a worker process for an agent with piped stdout.
///
/// # Errors
///
/// Fails when the process cannot be started.
pub fn spawn_worker(program: &Path, model: &str, agent_id: &str) -> Result<Child, KernelError> {
    let child = Command::new(program)
        .arg("run")
        .arg(model)
        .arg("--agent-id")
        .arg(agent_id)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;
    info!(agent_id = %agent_id, model = %model, "launched worker");
    Ok(child)
}

/// Watches a worker's stdout for the READY handshake and republishes it on
/// `global.bus` as `{type: "READY", agent_id, pubkey}`.
///
/// Runs until the worker closes stdout; the exit code is logged.
pub fn monitor_worker(bus: Arc<Bus>, agent_id: String, child: &mut Child) {
    let Some(stdout) = child.stdout.take() else {
        error!(agent_id = %agent_id, "worker has no piped stdout");
        return;
    };

    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!(agent_id = %agent_id, line = %line, "worker output");
                    if let Some(pubkey) = parse_ready(&line) {
                        bus.publish(
                            topics::GLOBAL,
                            serde_json::json!({
                                "type": "READY",
                                "agent_id": agent_id,
                                "pubkey": pubkey,
                            }),
                            Some(agent_id.clone()),
                        );
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    error!(agent_id = %agent_id, error = %err, "error reading worker output");
                    break;
                }
            }
        }
        info!(agent_id = %agent_id, "worker stdout closed");
    });
}

/// Extracts the base64 public key from a `READY <pubkey>` line.
///
/// The READY token may appear anywhere in the line; a line with READY but
/// no following token yields an empty key.
fn parse_ready(line: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    while let Some(token) = parts.next() {
        if token == "READY" {
            return Some(parts.next().unwrap_or_default().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_ready_extracts_pubkey() {
        assert_eq!(parse_ready("READY a2V5"), Some("a2V5".to_string()));
        assert_eq!(
            parse_ready("booting... READY a2V5 extra"),
            Some("a2V5".to_string())
        );
    }

    #[test]
    fn parse_ready_without_key_is_empty() {
        assert_eq!(parse_ready("READY"), Some(String::new()));
    }

    #[test]
    fn parse_non_ready_lines() {
        assert_eq!(parse_ready("loading model weights"), None);
        assert_eq!(parse_ready("NOT-READY yet"), None);
    }
}
