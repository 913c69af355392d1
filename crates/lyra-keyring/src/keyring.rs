//! Keystore-backed keyring.

use crate::error::{KeyringError, Result};
use crate::keypair::Keypair;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// On-disk format of a keystore entry.
#[derive(Debug, Serialize, Deserialize)]
struct KeyRecord {
    entity_id: String,
    public_key: String,
    private_key: String,
    #[serde(rename = "type")]
    key_type: String,
}

/// Keyring managing Ed25519 keypairs per entity identifier.
///
/// Keys live in memory and are mirrored to one JSON file per entity in the
/// keystore directory. `sign` and `verify` lazily load from the keystore
/// when the entity is not yet in memory.
pub struct Keyring {
    keystore_path: PathBuf,
    keys: RwLock<HashMap<String, Keypair>>,
}

impl Keyring {
    /// Creates a keyring over the given keystore directory, creating it if
    /// necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(keystore_path: impl AsRef<Path>) -> Result<Self> {
        let keystore_path = keystore_path.as_ref().to_path_buf();
        fs::create_dir_all(&keystore_path)?;
        info!(keystore = %keystore_path.display(), "keyring initialized");
        Ok(Self {
            keystore_path,
            keys: RwLock::new(HashMap::new()),
        })
    }

    /// Generates a new keypair for an entity and persists it.
    ///
    /// Returns `(public_key_b64, private_key_b64)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the keystore file cannot be written.
    pub fn generate(&self, entity_id: &str) -> Result<(String, String)> {
        let keypair = Keypair::generate();
        let public_b64 = keypair.public_key_b64();
        let private_b64 = keypair.secret_key_b64().to_string();

        self.save_record(entity_id, &public_b64, &private_b64)?;
        self.keys.write().insert(entity_id.to_string(), keypair);

        info!(entity_id = %entity_id, "generated new keypair");
        Ok((public_b64, private_b64))
    }

    /// Loads an entity's keypair from the keystore.
    ///
    /// Returns `None` when no keystore entry exists or the entry is
    /// unreadable (the problem is logged).
    #[must_use]
    pub fn load(&self, entity_id: &str) -> Option<(String, String)> {
        let path = self.record_path(entity_id);
        if !path.exists() {
            warn!(entity_id = %entity_id, "no keypair found");
            return None;
        }

        let record: KeyRecord = match fs::read_to_string(&path)
            .map_err(KeyringError::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(KeyringError::from))
        {
            Ok(record) => record,
            Err(err) => {
                error!(entity_id = %entity_id, error = %err, "failed to load keypair");
                return None;
            }
        };

        let keypair = match Keypair::from_secret_b64(&record.private_key) {
            Ok(keypair) => keypair,
            Err(err) => {
                error!(entity_id = %entity_id, error = %err, "invalid key data");
                return None;
            }
        };

        let public_b64 = keypair.public_key_b64();
        self.keys.write().insert(entity_id.to_string(), keypair);
        debug!(entity_id = %entity_id, "loaded keypair");
        Some((public_b64, record.private_key))
    }

    /// Returns the existing keypair for an entity, generating one if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if a new keypair cannot be persisted.
    pub fn get_or_create(&self, entity_id: &str) -> Result<(String, String)> {
        match self.load(entity_id) {
            Some(keys) => Ok(keys),
            None => self.generate(entity_id),
        }
    }

    /// Signs data with an entity's private key.
    ///
    /// The keypair is lazily loaded from the keystore if not in memory.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::KeyNotFound`] when no keypair is available.
    pub fn sign(&self, entity_id: &str, data: &[u8]) -> Result<String> {
        if let Some(keypair) = self.keys.read().get(entity_id) {
            return Ok(keypair.sign(data));
        }
        if self.load(entity_id).is_none() {
            warn!(entity_id = %entity_id, "no private key available for signing");
            return Err(KeyringError::KeyNotFound(entity_id.to_string()));
        }
        let keys = self.keys.read();
        let keypair = keys
            .get(entity_id)
            .ok_or_else(|| KeyringError::KeyNotFound(entity_id.to_string()))?;
        Ok(keypair.sign(data))
    }

    /// Verifies a signature with an entity's public key.
    ///
    /// Never fails: missing keys, malformed signatures, and verification
    /// failures all return `false`.
    #[must_use]
    pub fn verify(&self, entity_id: &str, data: &[u8], signature_b64: &str) -> bool {
        if let Some(keypair) = self.keys.read().get(entity_id) {
            return keypair.verify(data, signature_b64);
        }
        if self.load(entity_id).is_none() {
            warn!(entity_id = %entity_id, "no public key available for verification");
            return false;
        }
        self.keys
            .read()
            .get(entity_id)
            .is_some_and(|keypair| keypair.verify(data, signature_b64))
    }

    /// Returns an entity's base64 public key, lazily loading if needed.
    #[must_use]
    pub fn public_key(&self, entity_id: &str) -> Option<String> {
        if let Some(keypair) = self.keys.read().get(entity_id) {
            return Some(keypair.public_key_b64());
        }
        self.load(entity_id).map(|(public_b64, _)| public_b64)
    }

    fn record_path(&self, entity_id: &str) -> PathBuf {
        self.keystore_path.join(format!("{entity_id}.json"))
    }

    fn save_record(&self, entity_id: &str, public_b64: &str, private_b64: &str) -> Result<()> {
        let record = KeyRecord {
            entity_id: entity_id.to_string(),
            public_key: public_b64.to_string(),
            private_key: private_b64.to_string(),
            key_type: "ed25519".to_string(),
        };
        let path = self.record_path(entity_id);
        fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        debug!(entity_id = %entity_id, path = %path.display(), "saved keys");
        Ok(())
    }
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyring")
            .field("keystore_path", &self.keystore_path)
            .field("loaded", &self.keys.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keyring() -> (tempfile::TempDir, Keyring) {
        let dir = tempfile::tempdir().unwrap();
        let keyring = Keyring::new(dir.path()).unwrap();
        (dir, keyring)
    }

    #[test]
    fn generate_and_load() {
        let (_dir, keyring) = keyring();
        let (public_b64, private_b64) = keyring.generate("lyra").unwrap();

        let (loaded_public, loaded_private) = keyring.load("lyra").unwrap();
        assert_eq!(loaded_public, public_b64);
        assert_eq!(loaded_private, private_b64);
    }

    #[test]
    fn load_missing_entity() {
        let (_dir, keyring) = keyring();
        assert!(keyring.load("ghost").is_none());
    }

    #[test]
    fn load_corrupt_record() {
        let (dir, keyring) = keyring();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        assert!(keyring.load("broken").is_none());
    }

    #[test]
    fn get_or_create_is_stable() {
        let (_dir, keyring) = keyring();
        let first = keyring.get_or_create("otto").unwrap();
        let second = keyring.get_or_create("otto").unwrap();
        assert_eq!(first.0, second.0);
    }

    #[test]
    fn sign_verify_round_trip() {
        let (_dir, keyring) = keyring();
        keyring.generate("lyra").unwrap();

        let signature = keyring.sign("lyra", b"payload").unwrap();
        assert!(keyring.verify("lyra", b"payload", &signature));
        assert!(!keyring.verify("lyra", b"other payload", &signature));
    }

    #[test]
    fn sign_without_key_is_not_found() {
        let (_dir, keyring) = keyring();
        let err = keyring.sign("ghost", b"payload").unwrap_err();
        assert!(matches!(err, KeyringError::KeyNotFound(_)));
    }

    #[test]
    fn verify_without_key_is_false() {
        let (_dir, keyring) = keyring();
        assert!(!keyring.verify("ghost", b"payload", "c2ln"));
    }

    #[test]
    fn sign_lazily_loads_from_keystore() {
        let dir = tempfile::tempdir().unwrap();
        {
            let keyring = Keyring::new(dir.path()).unwrap();
            keyring.generate("lyra").unwrap();
        }

        // Fresh keyring over the same keystore: nothing in memory yet.
        let keyring = Keyring::new(dir.path()).unwrap();
        let signature = keyring.sign("lyra", b"payload").unwrap();
        assert!(keyring.verify("lyra", b"payload", &signature));
    }

    #[test]
    fn keystore_record_format() {
        let (dir, keyring) = keyring();
        keyring.generate("lyra").unwrap();

        let raw = fs::read_to_string(dir.path().join("lyra.json")).unwrap();
        let record: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(record["entity_id"], "lyra");
        assert_eq!(record["type"], "ed25519");
        assert!(record["public_key"].is_string());
        assert!(record["private_key"].is_string());
    }
}
