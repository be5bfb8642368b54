use thiserror::Error;

use crate::credential_codec::error::CodecError;
use crate::credential_storage::StorageError;
use crate::keystore::error::KeystoreError;
use crate::util::json_path::JsonPathError;

#[derive(Debug, Error)]
pub enum OpenID4VPError {
    #[error("Invalid authorization request: `{0}`")]
    InvalidRequest(String),
    #[error("Verifier is not trusted: `{0}`")]
    NontrustedVerifier(String),
    #[error("Only one input descriptor is supported")]
    OnlyOneInputDescriptorIsSupported,
    #[error("No credential satisfies input descriptor `{0}`")]
    InsufficientCredentials(String),
    #[error("Another presentation is in progress")]
    PresentationInProgress,
    #[error("No presentation in progress")]
    NoPresentationInProgress,
    #[error("Invalid selection: `{0}`")]
    InvalidSelection(String),
    #[error("Unknown credential `{0}`")]
    UnknownCredential(String),
    #[error("Insecure URL: `{0}`")]
    InsecureTransport(String),
    #[error("Verifier rejected the presentation: `{0}`")]
    VerifierRejected(String),
    #[error("Credential selection cancelled")]
    Cancelled,

    #[error("HTTP error: `{0}`")]
    Transport(#[source] anyhow::Error),
    #[error("JSON error: `{0}`")]
    Json(#[from] serde_json::Error),
    #[error("JSON path error: `{0}`")]
    JsonPath(#[from] JsonPathError),
    #[error("Codec error: `{0}`")]
    Codec(#[from] CodecError),
    #[error("Keystore error: `{0}`")]
    Keystore(#[from] KeystoreError),
    #[error("Storage error: `{0}`")]
    Storage(#[from] StorageError),
}
