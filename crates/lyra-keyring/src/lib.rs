//! # Lyra Keyring
//!
//! Ed25519 key management for Lyra entities.
//!
//! Every agent (and the kernel itself) owns an Ed25519 keypair keyed by its
//! entity identifier. Keys are held in memory and mirrored to a keystore
//! directory with one JSON file per entity; public keys and signatures are
//! exchanged in raw-bytes base64 form.
//!
//! ## Example
//!
//! ```rust
//! use lyra_keyring::Keyring;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let keyring = Keyring::new(dir.path()).unwrap();
//!
//! keyring.get_or_create("lyra").unwrap();
//! let signature = keyring.sign("lyra", b"boot record").unwrap();
//! assert!(keyring.verify("lyra", b"boot record", &signature));
//! ```

#![forbid(unsafe_code)]

mod error;
mod keypair;
mod keyring;

pub use error::{KeyringError, Result};
pub use keypair::Keypair;
pub use keyring::Keyring;
