//! Client identity and message signing.
//!
//! The client authenticates to the locator with an Ed25519 keypair. Messages
//! are hashed with SHA-256 and the digest is signed, so signatures are
//! deterministic for a given key and message.

use crate::error::{FetchError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair as _, UnparsedPublicKey, ED25519};
use sha2::{Digest, Sha256};

/// DER prefix of an Ed25519 SubjectPublicKeyInfo (RFC 8410).
const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// Signs byte strings and exposes the public half of the identity.
pub trait Signer: Send + Sync {
    /// Sign the SHA-256 digest of `message`.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;

    /// Verify a signature produced by [`Signer::sign`]. Never panics.
    fn verify_sign(&self, message: &[u8], signature: &[u8]) -> bool;

    /// Raw public key bytes.
    fn public_key(&self) -> &[u8];

    /// PEM encoding of the public key, sent to the locator as client identity.
    fn public_key_pem(&self) -> String;
}

/// Ed25519 keypair backed by `ring`.
pub struct KeyPair {
    inner: Ed25519KeyPair,
}

impl KeyPair {
    /// Generate a fresh identity from the system CSPRNG.
    pub fn generate() -> Result<Self> {
        let pkcs8 = Self::generate_pkcs8()?;
        Self::from_pkcs8(&pkcs8)
    }

    /// Generate a PKCS#8 document for callers that persist their identity.
    pub fn generate_pkcs8() -> Result<Vec<u8>> {
        let rng = SystemRandom::new();
        let document = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|_| FetchError::KeyGeneration("system randomness unavailable".to_string()))?;
        Ok(document.as_ref().to_vec())
    }

    /// Load an identity from a PKCS#8 v2 document.
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self> {
        let inner = Ed25519KeyPair::from_pkcs8(pkcs8)
            .map_err(|e| FetchError::KeyGeneration(format!("rejected key: {}", e)))?;
        Ok(Self { inner })
    }

    fn digest(message: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(message);
        hasher.finalize().into()
    }
}

impl Signer for KeyPair {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let digest = Self::digest(message);
        Ok(self.inner.sign(&digest).as_ref().to_vec())
    }

    fn verify_sign(&self, message: &[u8], signature: &[u8]) -> bool {
        let digest = Self::digest(message);
        UnparsedPublicKey::new(&ED25519, self.public_key())
            .verify(&digest, signature)
            .is_ok()
    }

    fn public_key(&self) -> &[u8] {
        self.inner.public_key().as_ref()
    }

    fn public_key_pem(&self) -> String {
        let mut der = Vec::with_capacity(ED25519_SPKI_PREFIX.len() + 32);
        der.extend_from_slice(&ED25519_SPKI_PREFIX);
        der.extend_from_slice(self.public_key());
        pem_encode("PUBLIC KEY", &der)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &STANDARD.encode(self.public_key()))
            .finish()
    }
}

fn pem_encode(label: &str, der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {}-----\n", label);
    for line in body.as_bytes().chunks(64) {
        // base64 output is ASCII
        pem.push_str(std::str::from_utf8(line).unwrap_or_default());
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {}-----\n", label));
    pem
}
