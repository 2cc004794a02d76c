//! Actor key material
//!
//! Every local actor owns exactly one RSA key pair, generated when the actor
//! is created and never rotated.

use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::FederationError;

/// Key size for production actors
pub const DEFAULT_KEY_BITS: usize = 2048;

/// RSA key pair in PEM form
#[derive(Clone)]
pub struct KeyPair {
    /// SPKI PEM
    pub public_key_pem: String,
    /// PKCS#8 PEM
    pub private_key_pem: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key_pem", &self.public_key_pem)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

/// Source of actor key pairs
///
/// Generation is a blocking CPU-bound call; async callers should run it on a
/// blocking thread.
#[cfg_attr(test, mockall::automock)]
pub trait KeyPairProvider: Send + Sync {
    fn generate(&self) -> Result<KeyPair, FederationError>;
}

/// Generates fresh RSA key pairs from the thread-local RNG
#[derive(Debug, Clone)]
pub struct RsaKeyPairProvider {
    bits: usize,
}

impl RsaKeyPairProvider {
    pub fn new() -> Self {
        Self {
            bits: DEFAULT_KEY_BITS,
        }
    }

    /// Provider with a custom key size (tests use smaller keys)
    pub fn with_bits(bits: usize) -> Self {
        Self { bits }
    }
}

impl Default for RsaKeyPairProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyPairProvider for RsaKeyPairProvider {
    fn generate(&self) -> Result<KeyPair, FederationError> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, self.bits)
            .map_err(|e| FederationError::Key(format!("Failed to generate RSA key: {}", e)))?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_key_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| FederationError::Key(format!("Failed to encode private key: {}", e)))?
            .to_string();
        let public_key_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| FederationError::Key(format!("Failed to encode public key: {}", e)))?;

        Ok(KeyPair {
            public_key_pem,
            private_key_pem,
        })
    }
}
