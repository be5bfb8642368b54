use thiserror::Error;

use wallet_crypto::HasherError;

use crate::credential_codec::error::CodecError;
use crate::credential_storage::StorageError;
use crate::dpop::DpopError;
use crate::keystore::error::KeystoreError;

#[derive(Debug, Error)]
pub enum OpenID4VCIError {
    #[error("Invalid credential offer: `{0}`")]
    InvalidOffer(String),
    #[error("Credential offer contains no supported grant")]
    UnsupportedGrant,
    #[error("Offer issuer `{actual}` differs from configured issuer `{expected}`")]
    IssuerMismatch { expected: String, actual: String },
    #[error("Unknown credential configuration `{0}`")]
    UnknownConfiguration(String),
    #[error("Transaction code required")]
    TxCodeRequired,
    #[error("Invalid transaction code")]
    InvalidTxCode,
    #[error("Insecure URL: `{0}`")]
    InsecureTransport(String),
    #[error("Missing endpoint: `{0}`")]
    MissingEndpoint(&'static str),
    #[error("Invalid authorization response: `{0}`")]
    InvalidAuthorizationResponse(String),
    #[error("Authorization denied: `{0}`")]
    AuthorizationDenied(String),
    #[error("Authorization challenge failed: `{0}`")]
    AuthorizationChallengeFailed(String),
    #[error("No issuance flow for the given state")]
    UnknownState,
    #[error("Authorization response state was already used")]
    StateAlreadyUsed,
    #[error("Token request failed: `{0}`")]
    TokenRequestFailed(String),
    #[error("Credential request failed: `{0}`")]
    CredentialRequestFailed(String),
    #[error("Deferred issuance is not supported")]
    DeferredIssuanceNotSupported,
    #[error("Received credential is invalid: `{0}`")]
    InvalidCredential(CodecError),

    #[error("HTTP error: `{0}`")]
    Transport(#[source] anyhow::Error),
    #[error("JSON error: `{0}`")]
    Json(#[from] serde_json::Error),
    #[error("Hasher error: `{0}`")]
    Hasher(#[from] HasherError),
    #[error("DPoP error: `{0}`")]
    Dpop(#[from] DpopError),
    #[error("Keystore error: `{0}`")]
    Keystore(#[from] KeystoreError),
    #[error("Storage error: `{0}`")]
    Storage(#[from] StorageError),
}
