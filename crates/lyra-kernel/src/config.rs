//! Bootstrap record and kernel configuration.

use crate::error::KernelError;
use lyra_agents::AgentConfig;
use lyra_ticker::DEFAULT_INTERVAL_MS;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Default time the kernel waits for boot consensus.
pub const DEFAULT_BOOT_TIMEOUT: Duration = Duration::from_secs(30);

/// One agent entry in the bootstrap record.
///
/// Unknown fields are preserved verbatim and surface as agent metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapEntry {
    /// Stable identity; defaults to `agent_<index>` when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Model the agent's worker runs. Required.
    #[serde(default)]
    pub model: Option<String>,
    /// Whether boot waits for this agent's READY.
    #[serde(default = "default_required")]
    pub required: bool,
    /// Role tag.
    #[serde(default)]
    pub role: Option<String>,
    /// Specialty tag.
    #[serde(default)]
    pub specialty: Option<String>,
    /// System prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Specialty interrupt keywords.
    #[serde(default)]
    pub interrupt_keywords: Vec<String>,
    /// Interrupt-threshold base (0-100).
    #[serde(default)]
    pub interrupt_threshold: Option<u8>,
    /// Inference endpoint for the network-backed speaker.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Extra fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_required() -> bool {
    true
}

/// The parsed bootstrap record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapRecord {
    /// Agent entries in ring order.
    pub agents: Vec<BootstrapEntry>,
}

impl BootstrapRecord {
    /// Loads and parses a YAML bootstrap record.
    ///
    /// # Errors
    ///
    /// Fatal on a missing or unparsable file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KernelError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            KernelError::Config(format!(
                "cannot read bootstrap record {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let record: Self = serde_yaml::from_str(&raw)?;
        info!(
            path = %path.as_ref().display(),
            agents = record.agents.len(),
            "loaded bootstrap record"
        );
        Ok(record)
    }

    /// Resolves entries into agent configurations, applying identity
    /// defaults and validating required fields.
    ///
    /// # Errors
    ///
    /// Fatal when an entry has no `model`.
    pub fn resolve(self) -> Result<Vec<AgentConfig>, KernelError> {
        let mut configs = Vec::with_capacity(self.agents.len());
        for (index, entry) in self.agents.into_iter().enumerate() {
            let id = entry
                .id
                .unwrap_or_else(|| format!("agent_{index}"));
            let model = entry
                .model
                .ok_or_else(|| KernelError::Config(format!("missing 'model' for agent {id}")))?;

            let mut config = AgentConfig::new(id, model);
            config.role = entry.role;
            config.specialty = entry.specialty;
            config.system_prompt = entry.system_prompt;
            config.interrupt_keywords = entry.interrupt_keywords;
            if let Some(threshold) = entry.interrupt_threshold {
                config.interrupt_threshold = threshold;
            }
            config.required = entry.required;
            config.endpoint = entry.endpoint;
            config.metadata = entry.extra;
            configs.push(config);
        }
        Ok(configs)
    }
}

/// Kernel configuration.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Path to the bootstrap record.
    pub config_path: PathBuf,
    /// Tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Weighted-quorum threshold.
    pub quorum_threshold: f64,
    /// Keystore directory.
    pub keystore_dir: PathBuf,
    /// Ledger directory.
    pub ledger_dir: PathBuf,
    /// How long to wait for READY handshakes and boot consensus.
    pub boot_timeout: Duration,
    /// Worker program; defaults to the current executable.
    pub worker_program: Option<PathBuf>,
}

impl KernelConfig {
    /// Creates a configuration with defaults for everything but the
    /// bootstrap-record path.
    #[must_use]
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            tick_interval_ms: DEFAULT_INTERVAL_MS,
            quorum_threshold: lyra_consensus::DEFAULT_QUORUM_THRESHOLD,
            keystore_dir: PathBuf::from(".lyra/keys"),
            ledger_dir: PathBuf::from(".lyra/ledger"),
            boot_timeout: DEFAULT_BOOT_TIMEOUT,
            worker_program: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolve_defaults_ids_and_keeps_extras() {
        let record: BootstrapRecord = serde_yaml::from_str(
            r"
agents:
  - model: llama3
  - id: otto
    model: llama3
    required: false
    team: coordination
",
        )
        .unwrap();

        let configs = record.resolve().unwrap();
        assert_eq!(configs[0].id, "agent_0");
        assert!(configs[0].required);
        assert_eq!(configs[1].id, "otto");
        assert!(!configs[1].required);
        assert_eq!(
            configs[1].metadata.get("team"),
            Some(&serde_json::json!("coordination"))
        );
    }

    #[test]
    fn resolve_rejects_missing_model() {
        let record: BootstrapRecord = serde_yaml::from_str(
            r"
agents:
  - id: lyra
",
        )
        .unwrap();

        let err = record.resolve().unwrap_err();
        assert!(matches!(err, KernelError::Config(_)));
        assert!(err.to_string().contains("model"));
    }

    #[test]
    fn load_missing_file_is_fatal() {
        let err = BootstrapRecord::load("/nonexistent/bootstrap.yaml").unwrap_err();
        assert!(matches!(err, KernelError::Config(_)));
    }
}
