//! Ed25519 keypair for signing and verification.

use crate::error::{KeyringError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// An Ed25519 keypair for signing and verification.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generates a new random keypair.
    #[must_use]
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Creates a keypair from a raw 32-byte secret key.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret key is not exactly 32 bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(KeyringError::InvalidKey(format!(
                "secret key must be 32 bytes, got {}",
                bytes.len()
            )));
        }

        let mut secret = [0u8; 32];
        secret.copy_from_slice(bytes);
        let secret = Zeroizing::new(secret);

        let signing_key = SigningKey::from_bytes(&secret);
        Ok(Self { signing_key })
    }

    /// Creates a keypair from a base64-encoded raw secret key.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoding or key length is invalid.
    pub fn from_secret_b64(secret_b64: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            BASE64
                .decode(secret_b64)
                .map_err(|e| KeyringError::InvalidKey(e.to_string()))?,
        );
        Self::from_secret_bytes(&bytes)
    }

    /// Returns the public key as base64-encoded raw bytes.
    #[must_use]
    pub fn public_key_b64(&self) -> String {
        BASE64.encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Returns the secret key as base64-encoded raw bytes.
    ///
    /// Handle with care; the backing buffer is zeroized on drop.
    #[must_use]
    pub fn secret_key_b64(&self) -> Zeroizing<String> {
        Zeroizing::new(BASE64.encode(self.signing_key.to_bytes()))
    }

    /// Signs a message, returning the base64-encoded signature.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> String {
        let signature = self.signing_key.sign(message);
        BASE64.encode(signature.to_bytes())
    }

    /// Verifies a base64-encoded signature against a message.
    ///
    /// Malformed encodings and invalid signatures both return `false`.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature_b64: &str) -> bool {
        let Ok(bytes) = BASE64.decode(signature_b64) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&bytes) else {
            return false;
        };
        self.signing_key
            .verifying_key()
            .verify(message, &signature)
            .is_ok()
    }

}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key_b64())
            .finish_non_exhaustive()
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keypair_generate() {
        let kp1 = Keypair::generate();
        let kp2 = Keypair::generate();
        assert_ne!(kp1.public_key_b64(), kp2.public_key_b64());
    }

    #[test]
    fn keypair_sign_verify() {
        let kp = Keypair::generate();
        let signature = kp.sign(b"hello, lyra");
        assert!(kp.verify(b"hello, lyra", &signature));
    }

    #[test]
    fn keypair_wrong_message() {
        let kp = Keypair::generate();
        let signature = kp.sign(b"message 1");
        assert!(!kp.verify(b"message 2", &signature));
    }

    #[test]
    fn keypair_garbage_signature() {
        let kp = Keypair::generate();
        assert!(!kp.verify(b"message", "not base64!!"));
        assert!(!kp.verify(b"message", &BASE64.encode([0u8; 7])));
    }

    #[test]
    fn keypair_secret_round_trip() {
        let kp1 = Keypair::generate();
        let kp2 = Keypair::from_secret_b64(&kp1.secret_key_b64()).unwrap();
        assert_eq!(kp1.public_key_b64(), kp2.public_key_b64());
    }

    #[test]
    fn keypair_bad_secret_length() {
        assert!(Keypair::from_secret_bytes(&[0u8; 31]).is_err());
    }
}
