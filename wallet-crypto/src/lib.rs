//! Cryptographic primitives used by the wallet.
//!
//! This crate hashes, signs and verifies raw bytes, derives symmetric keys from passwords
//! and WebAuthn PRF outputs, and seals data with an AEAD cipher. It is kept apart from the
//! protocol code so that the cryptographic surface can be reviewed in isolation.

use std::sync::Arc;

use thiserror::Error;

pub mod imp;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum CryptoProviderError {
    #[error("Missing hasher: `{0}`")]
    MissingHasher(String),
    #[error("Missing signer: `{0}`")]
    MissingSigner(String),
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum HasherError {
    #[error("Could not hash")]
    CouldNotHash,
    #[error("Crypto provider error: `{0}`")]
    CryptoError(#[from] CryptoProviderError),
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("Crypto provider error: `{0}`")]
    CryptoError(#[from] CryptoProviderError),
    #[error("Could not sign: `{0}`")]
    CouldNotSign(String),
    #[error("Could not extract keypair")]
    CouldNotExtractKeyPair,
    #[error("Could not extract public key: `{0}`")]
    CouldNotExtractPublicKey(String),
    #[error("Could not verify: `{0}`")]
    CouldNotVerify(String),
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Missing algorithm `{0}`")]
    MissingAlgorithm(String),
    #[error("Missing key")]
    MissingKey,
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum EncryptionError {
    #[error("Key derivation failed: `{0}`")]
    KeyDerivation(String),
    #[error("Encryption failed: `{0}`")]
    Encrypt(String),
    #[error("Decryption failed")]
    Decrypt,
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}

/// Provides hashing.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait Hasher: Send + Sync {
    /// Hash and encode the digest as base64url without padding.
    fn hash_base64(&self, input: &[u8]) -> Result<String, HasherError>;

    fn hash(&self, input: &[u8]) -> Result<Vec<u8>, HasherError>;
}

/// Direct signing and verification with raw key material.
///
/// Protocol code signs through the keystore, which never hands out private keys; this
/// trait is the layer underneath it.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait Signer: Send + Sync {
    fn sign(
        &self,
        input: &[u8],
        public_key: &[u8],
        private_key: &[u8],
    ) -> Result<Vec<u8>, SignerError>;

    fn verify(&self, input: &[u8], signature: &[u8], public_key: &[u8]) -> Result<(), SignerError>;
}

/// Returns hasher or signer instances by their registered name.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait CryptoProvider: Send + Sync {
    fn get_hasher(&self, hasher: &str) -> Result<Arc<dyn Hasher>, CryptoProviderError>;

    fn get_signer(&self, signer: &str) -> Result<Arc<dyn Signer>, CryptoProviderError>;
}
