//! Enumerates errors for the credential codecs and parser registry.

use thiserror::Error;

use wallet_crypto::{CryptoProviderError, HasherError, SignerError};

use crate::common_models::jwk::JwkError;
use crate::util::x509::CertificateError;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Could not sign: `{0}`")]
    CouldNotSign(String),
    #[error("Could not verify: `{0}`")]
    CouldNotVerify(String),
    #[error("Could not format: `{0}`")]
    CouldNotFormat(String),
    #[error("Could not extract credentials: `{0}`")]
    CouldNotExtractCredentials(String),
    #[error("Missing disclosure")]
    MissingDisclosure,
    #[error("Unreferenced disclosure")]
    UnreferencedDisclosure,
    #[error("Duplicate disclosure digest")]
    DuplicateDigest,
    #[error("Missing issuer")]
    MissingIssuer,
    #[error("Unsupported hash algorithm `{0}`")]
    UnsupportedHashAlgorithm(String),
    #[error("Unsupported signature algorithm `{0}`")]
    UnsupportedAlgorithm(String),
    #[error("Value digest mismatch for `{0}`")]
    DigestMismatch(String),
    #[error("Issuer key resolution failed: `{0}`")]
    KeyResolution(String),
    #[error("Certificate error: `{0}`")]
    Certificate(#[from] CertificateError),
    #[error("JWK error: `{0}`")]
    Jwk(#[from] JwkError),
    #[error("Crypto library error: `{0}`")]
    CryptoError(#[from] CryptoProviderError),
    #[error("Hasher error: `{0}`")]
    Hasher(#[from] HasherError),
    #[error("Signer error: `{0}`")]
    Signer(#[from] SignerError),
    #[error("JSON mapping error: `{0}`")]
    JsonMapping(String),
    #[error("CBOR error: `{0}`")]
    Cbor(String),
    #[error("All parsings failed")]
    AllParsingsFailed,
}
