//! Trust-weight and CID stores.

use crate::cid::{consensus_cid, content_cid};
use crate::error::LedgerError;
use lyra_core::{AgentId, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Trust weight assumed for agents the ledger has never seen.
pub const DEFAULT_TRUST_WEIGHT: f64 = 0.5;

/// Number of history samples kept per agent (latest wins).
pub const MAX_TRUST_HISTORY: usize = 100;

/// One trust-weight observation: `(unix seconds, weight)`.
pub type TrustSample = (f64, f64);

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrustFile {
    weights: HashMap<AgentId, f64>,
    history: HashMap<AgentId, Vec<TrustSample>>,
    updated_at: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CidRecord {
    data: serde_json::Value,
    timestamp: f64,
}

/// Ledger for trust weights and consensus records.
///
/// All mutation persists immediately; persistence failures are logged and
/// never propagate into scheduling decisions.
pub struct Ledger {
    ledger_path: PathBuf,
    trust_weights: RwLock<HashMap<AgentId, f64>>,
    trust_history: RwLock<HashMap<AgentId, Vec<TrustSample>>>,
    cid_cache: RwLock<HashMap<String, CidRecord>>,
}

impl Ledger {
    /// Opens a ledger over the given directory, creating it if necessary
    /// and loading any persisted state best-effort.
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory cannot be created.
    pub fn new(ledger_path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let ledger_path = ledger_path.as_ref().to_path_buf();
        fs::create_dir_all(&ledger_path)?;

        let ledger = Self {
            ledger_path,
            trust_weights: RwLock::new(HashMap::new()),
            trust_history: RwLock::new(HashMap::new()),
            cid_cache: RwLock::new(HashMap::new()),
        };
        ledger.load();
        info!(path = %ledger.ledger_path.display(), "ledger initialized");
        Ok(ledger)
    }

    fn load(&self) {
        let trust_path = self.ledger_path.join("trust_weights.json");
        if trust_path.exists() {
            match fs::read_to_string(&trust_path)
                .map_err(LedgerError::from)
                .and_then(|raw| serde_json::from_str::<TrustFile>(&raw).map_err(LedgerError::from))
            {
                Ok(file) => {
                    info!(agents = file.weights.len(), "loaded trust weights");
                    *self.trust_weights.write() = file.weights;
                    *self.trust_history.write() = file.history;
                }
                Err(err) => error!(error = %err, "failed to load trust weights"),
            }
        }

        let cid_path = self.ledger_path.join("cid_cache.json");
        if cid_path.exists() {
            match fs::read_to_string(&cid_path)
                .map_err(LedgerError::from)
                .and_then(|raw| {
                    serde_json::from_str::<HashMap<String, CidRecord>>(&raw)
                        .map_err(LedgerError::from)
                })
            {
                Ok(cache) => {
                    info!(cids = cache.len(), "loaded CID cache");
                    *self.cid_cache.write() = cache;
                }
                Err(err) => error!(error = %err, "failed to load CID cache"),
            }
        }
    }

    fn save_trust_weights(&self) {
        let file = TrustFile {
            weights: self.trust_weights.read().clone(),
            history: self.trust_history.read().clone(),
            updated_at: Timestamp::now().as_secs_f64(),
        };
        let path = self.ledger_path.join("trust_weights.json");
        if let Err(err) = serde_json::to_string_pretty(&file)
            .map_err(LedgerError::from)
            .and_then(|raw| fs::write(&path, raw).map_err(LedgerError::from))
        {
            error!(error = %err, "failed to save trust weights");
        }
    }

    fn save_cid_cache(&self) {
        let cache = self.cid_cache.read().clone();
        let path = self.ledger_path.join("cid_cache.json");
        if let Err(err) = serde_json::to_string_pretty(&cache)
            .map_err(LedgerError::from)
            .and_then(|raw| fs::write(&path, raw).map_err(LedgerError::from))
        {
            error!(error = %err, "failed to save CID cache");
        }
    }

    /// Trust weight for an agent; [`DEFAULT_TRUST_WEIGHT`] when unknown.
    pub fn trust_weight(&self, agent_id: &str) -> f64 {
        self.trust_weights
            .read()
            .get(agent_id)
            .copied()
            .unwrap_or(DEFAULT_TRUST_WEIGHT)
    }

    /// Sets an agent's trust weight, clamped to `[0, 1]`, appending to its
    /// history and persisting.
    pub fn set_trust_weight(&self, agent_id: &str, weight: f64) {
        let weight = weight.clamp(0.0, 1.0);

        self.trust_weights
            .write()
            .insert(agent_id.to_string(), weight);

        {
            let mut history = self.trust_history.write();
            let samples = history.entry(agent_id.to_string()).or_default();
            samples.push((Timestamp::now().as_secs_f64(), weight));
            if samples.len() > MAX_TRUST_HISTORY {
                let excess = samples.len() - MAX_TRUST_HISTORY;
                samples.drain(..excess);
            }
        }

        self.save_trust_weights();
        debug!(agent_id = %agent_id, weight, "set trust weight");
    }

    /// Adjusts an agent's trust weight by `delta`, clamped to
    /// `[min_weight, max_weight]`.
    pub fn update_trust_weight(
        &self,
        agent_id: &str,
        delta: f64,
        min_weight: f64,
        max_weight: f64,
    ) {
        let current = self.trust_weight(agent_id);
        let updated = (current + delta).clamp(min_weight, max_weight);
        self.set_trust_weight(agent_id, updated);
        info!(
            agent_id = %agent_id,
            from = current,
            to = updated,
            delta,
            "updated trust weight"
        );
    }

    /// Trust-weight history for an agent, oldest first.
    pub fn trust_history(&self, agent_id: &str) -> Vec<TrustSample> {
        self.trust_history
            .read()
            .get(agent_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Deterministic consensus CID for a set of participant public keys.
    pub fn consensus_cid<S: AsRef<str>>(&self, pubkeys: &[S]) -> String {
        consensus_cid(pubkeys)
    }

    /// Stores data under a CID in the cache and persists.
    pub fn store_cid(&self, cid: &str, data: serde_json::Value) {
        self.cid_cache.write().insert(
            cid.to_string(),
            CidRecord {
                data,
                timestamp: Timestamp::now().as_secs_f64(),
            },
        );
        self.save_cid_cache();
        info!(cid = %cid, "stored CID data");
    }

    /// Returns cached data for a CID, if any.
    pub fn get_cid(&self, cid: &str) -> Option<serde_json::Value> {
        self.cid_cache.read().get(cid).map(|r| r.data.clone())
    }

    /// Pins a record: computes its content CID, caches it, and writes a
    /// standalone `data/<cid>.json` file.
    pub fn pin(&self, data: serde_json::Value) -> String {
        let cid = content_cid(&data);
        self.pin_as(&cid, data);
        cid
    }

    /// Pins a record under a caller-chosen CID (e.g. a consensus CID).
    pub fn pin_as(&self, cid: &str, data: serde_json::Value) {
        self.store_cid(cid, data.clone());

        let data_dir = self.ledger_path.join("data");
        let result = fs::create_dir_all(&data_dir)
            .map_err(LedgerError::from)
            .and_then(|()| serde_json::to_string_pretty(&data).map_err(LedgerError::from))
            .and_then(|raw| {
                fs::write(data_dir.join(format!("{cid}.json")), raw).map_err(LedgerError::from)
            });
        if let Err(err) = result {
            warn!(cid = %cid, error = %err, "failed to write pinned record");
        }

        info!(cid = %cid, "pinned record");
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("path", &self.ledger_path)
            .field("agents", &self.trust_weights.read().len())
            .field("cids", &self.cid_cache.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ledger() -> (tempfile::TempDir, Ledger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path()).unwrap();
        (dir, ledger)
    }

    #[test]
    fn unknown_agent_gets_default_weight() {
        let (_dir, ledger) = ledger();
        assert_eq!(ledger.trust_weight("ghost"), DEFAULT_TRUST_WEIGHT);
    }

    #[test]
    fn set_weight_clamps_and_records_history() {
        let (_dir, ledger) = ledger();
        ledger.set_trust_weight("lyra", 1.7);
        assert_eq!(ledger.trust_weight("lyra"), 1.0);

        ledger.set_trust_weight("lyra", -0.3);
        assert_eq!(ledger.trust_weight("lyra"), 0.0);

        let history = ledger.trust_history("lyra");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].1, 1.0);
        assert_eq!(history[1].1, 0.0);
    }

    #[test]
    fn update_weight_respects_band() {
        let (_dir, ledger) = ledger();
        ledger.set_trust_weight("otto", 0.5);

        ledger.update_trust_weight("otto", -0.9, 0.1, 1.0);
        assert_eq!(ledger.trust_weight("otto"), 0.1);

        ledger.update_trust_weight("otto", 5.0, 0.1, 0.8);
        assert_eq!(ledger.trust_weight("otto"), 0.8);
    }

    #[test]
    fn history_is_bounded() {
        let (_dir, ledger) = ledger();
        for i in 0..(MAX_TRUST_HISTORY + 10) {
            ledger.set_trust_weight("lyra", (i % 10) as f64 / 10.0);
        }
        let history = ledger.trust_history("lyra");
        assert_eq!(history.len(), MAX_TRUST_HISTORY);
    }

    #[test]
    fn trust_weights_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = Ledger::new(dir.path()).unwrap();
            ledger.set_trust_weight("lyra", 0.7);
        }

        let reopened = Ledger::new(dir.path()).unwrap();
        assert_eq!(reopened.trust_weight("lyra"), 0.7);
        assert_eq!(reopened.trust_history("lyra").len(), 1);
    }

    #[test]
    fn corrupt_trust_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("trust_weights.json"), "{oops").unwrap();

        let ledger = Ledger::new(dir.path()).unwrap();
        assert_eq!(ledger.trust_weight("lyra"), DEFAULT_TRUST_WEIGHT);
    }

    #[test]
    fn cid_store_round_trip() {
        let (_dir, ledger) = ledger();
        let cid = ledger.consensus_cid(&["pk1", "pk2"]);
        ledger.store_cid(&cid, serde_json::json!({"agents": ["a", "b"]}));

        assert_eq!(
            ledger.get_cid(&cid).unwrap(),
            serde_json::json!({"agents": ["a", "b"]})
        );
        assert!(ledger.get_cid("lyra1ffff").is_none());
    }

    #[test]
    fn pin_writes_data_file() {
        let (dir, ledger) = ledger();
        let cid = ledger.pin(serde_json::json!({"record": 1}));

        assert!(cid.starts_with(crate::CID_PREFIX));
        let path = dir.path().join("data").join(format!("{cid}.json"));
        assert!(path.exists());
        assert_eq!(
            ledger.get_cid(&cid).unwrap(),
            serde_json::json!({"record": 1})
        );
    }

    #[test]
    fn cid_cache_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cid = {
            let ledger = Ledger::new(dir.path()).unwrap();
            ledger.pin(serde_json::json!({"boot": true}))
        };

        let reopened = Ledger::new(dir.path()).unwrap();
        assert_eq!(
            reopened.get_cid(&cid).unwrap(),
            serde_json::json!({"boot": true})
        );
    }
}
