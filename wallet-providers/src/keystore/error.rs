use thiserror::Error;

use wallet_crypto::{EncryptionError, SignerError};

use crate::common_models::jwk::JwkError;

#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("Keystore is locked")]
    Locked,
    #[error("No private data container loaded")]
    NotInitialized,
    #[error("Private data container already exists")]
    AlreadyInitialized,
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Unlock failed: `{0}`")]
    UnlockFailed(String),
    #[error("No passkey registered for this container")]
    NoPrfKey,
    #[error("Passkey `{0}` is not registered for this container")]
    UnknownPrfCredential(String),
    #[error("Authenticator does not support the PRF extension")]
    PrfNotSupported,
    #[error("Authenticator returned no PRF output after retry")]
    PrfRetryFailed,
    #[error("Authenticator error: `{0}`")]
    Authenticator(#[source] anyhow::Error),
    #[error("Private data was modified elsewhere")]
    ETagConflict,
    #[error("Session was claimed by another instance")]
    SessionSuperseded,
    #[error("Holder key `{0}` not found")]
    KeyNotFound(String),
    #[error("Credential `{0}` already stored")]
    DuplicateCredential(String),
    #[error("Malformed container: `{0}`")]
    MalformedContainer(String),
    #[error("Encryption error: `{0}`")]
    Encryption(#[from] EncryptionError),
    #[error("Signer error: `{0}`")]
    Signer(#[from] SignerError),
    #[error("JWK error: `{0}`")]
    Jwk(#[from] JwkError),
    #[error("Sync error: `{0}`")]
    Sync(#[from] SyncError),
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// `412 Precondition Failed`, carries the server ETag when it was sent.
    #[error("ETag precondition failed")]
    PreconditionFailed { etag: Option<String> },
    #[error("Missing `{0}` response header")]
    MissingHeader(&'static str),
    #[error("HTTP error: `{0}`")]
    Transport(#[source] anyhow::Error),
}
