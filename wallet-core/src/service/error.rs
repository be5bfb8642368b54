use strum_macros::{Display, EnumString};
use thiserror::Error;

use wallet_providers::credential_codec::error::CodecError;
use wallet_providers::credential_storage::StorageError;
use wallet_providers::exchange_protocol::openid4vci::error::OpenID4VCIError;
use wallet_providers::exchange_protocol::openid4vp::error::OpenID4VPError;
use wallet_providers::keystore::error::KeystoreError;
use wallet_providers::util::x509::CertificateError;

/// Stable identifiers of failures reported to the UI.
#[derive(Debug, Copy, Clone, Display, EnumString, PartialEq, Eq)]
pub enum ErrorCode {
    #[strum(serialize = "x-private-data-etag")]
    PrivateDataEtag,
    #[strum(serialize = "prf-not-supported")]
    PrfNotSupported,
    #[strum(serialize = "prf-retry-failed")]
    PrfRetryFailed,
    #[strum(serialize = "INVALID_PASSWORD")]
    InvalidPassword,
    #[strum(serialize = "KEYSTORE_LOCKED")]
    KeystoreLocked,
    #[strum(serialize = "SESSION_SUPERSEDED")]
    SessionSuperseded,
    #[strum(serialize = "NONTRUSTED_VERIFIER")]
    NontrustedVerifier,
    #[strum(serialize = "ONLY_ONE_INPUT_DESCRIPTOR_IS_SUPPORTED")]
    OnlyOneInputDescriptorIsSupported,
    #[strum(serialize = "INSUFFICIENT_CREDENTIALS")]
    InsufficientCredentials,
    #[strum(serialize = "PRESENTATION_IN_PROGRESS")]
    PresentationInProgress,
    #[strum(serialize = "INVALID_CREDENTIAL_OFFER")]
    InvalidCredentialOffer,
    #[strum(serialize = "UNSUPPORTED_GRANT")]
    UnsupportedGrant,
    #[strum(serialize = "ISSUER_MISMATCH")]
    IssuerMismatch,
    #[strum(serialize = "TX_CODE_REQUIRED")]
    TxCodeRequired,
    #[strum(serialize = "INVALID_TX_CODE")]
    InvalidTxCode,
    #[strum(serialize = "STATE_ALREADY_USED")]
    StateAlreadyUsed,
    #[strum(serialize = "INVALID_CREDENTIAL")]
    InvalidCredential,
    #[strum(serialize = "INSECURE_TRANSPORT")]
    InsecureTransport,
    #[strum(serialize = "TRANSPORT")]
    Transport,
    #[strum(serialize = "CANCELLED")]
    Cancelled,
    #[strum(serialize = "INTERNAL")]
    Internal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Issuance error: `{0}`")]
    Issuance(#[from] OpenID4VCIError),
    #[error("Presentation error: `{0}`")]
    Presentation(#[from] OpenID4VPError),
    #[error("Keystore error: `{0}`")]
    Keystore(#[from] KeystoreError),
    #[error("Codec error: `{0}`")]
    Codec(#[from] CodecError),
    #[error("Storage error: `{0}`")]
    Storage(#[from] StorageError),
    #[error("JSON error: `{0}`")]
    Json(#[from] serde_json::Error),
    #[error("Invalid trust anchor: `{0}`")]
    TrustAnchor(#[from] CertificateError),
}

impl ServiceError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Issuance(error) => issuance_error_code(error),
            Self::Presentation(error) => presentation_error_code(error),
            Self::Keystore(error) => keystore_error_code(error),
            Self::Codec(_) => ErrorCode::InvalidCredential,
            Self::Storage(_) => ErrorCode::Transport,
            Self::Json(_) | Self::TrustAnchor(_) => ErrorCode::Internal,
        }
    }
}

fn issuance_error_code(error: &OpenID4VCIError) -> ErrorCode {
    match error {
        OpenID4VCIError::InvalidOffer(_) | OpenID4VCIError::UnknownConfiguration(_) => {
            ErrorCode::InvalidCredentialOffer
        }
        OpenID4VCIError::UnsupportedGrant => ErrorCode::UnsupportedGrant,
        OpenID4VCIError::IssuerMismatch { .. } => ErrorCode::IssuerMismatch,
        OpenID4VCIError::TxCodeRequired => ErrorCode::TxCodeRequired,
        OpenID4VCIError::InvalidTxCode => ErrorCode::InvalidTxCode,
        OpenID4VCIError::StateAlreadyUsed => ErrorCode::StateAlreadyUsed,
        OpenID4VCIError::InsecureTransport(_) => ErrorCode::InsecureTransport,
        OpenID4VCIError::InvalidCredential(_) => ErrorCode::InvalidCredential,
        OpenID4VCIError::Transport(_) => ErrorCode::Transport,
        OpenID4VCIError::Keystore(error) => keystore_error_code(error),
        _ => ErrorCode::Internal,
    }
}

fn presentation_error_code(error: &OpenID4VPError) -> ErrorCode {
    match error {
        OpenID4VPError::NontrustedVerifier(_) => ErrorCode::NontrustedVerifier,
        OpenID4VPError::OnlyOneInputDescriptorIsSupported => {
            ErrorCode::OnlyOneInputDescriptorIsSupported
        }
        OpenID4VPError::InsufficientCredentials(_) => ErrorCode::InsufficientCredentials,
        OpenID4VPError::PresentationInProgress => ErrorCode::PresentationInProgress,
        OpenID4VPError::InsecureTransport(_) => ErrorCode::InsecureTransport,
        OpenID4VPError::Cancelled => ErrorCode::Cancelled,
        OpenID4VPError::Transport(_) | OpenID4VPError::VerifierRejected(_) => {
            ErrorCode::Transport
        }
        OpenID4VPError::Keystore(error) => keystore_error_code(error),
        _ => ErrorCode::Internal,
    }
}

fn keystore_error_code(error: &KeystoreError) -> ErrorCode {
    match error {
        KeystoreError::ETagConflict => ErrorCode::PrivateDataEtag,
        KeystoreError::PrfNotSupported => ErrorCode::PrfNotSupported,
        KeystoreError::PrfRetryFailed => ErrorCode::PrfRetryFailed,
        KeystoreError::InvalidPassword => ErrorCode::InvalidPassword,
        KeystoreError::Locked => ErrorCode::KeystoreLocked,
        KeystoreError::SessionSuperseded => ErrorCode::SessionSuperseded,
        KeystoreError::Sync(_) => ErrorCode::Transport,
        _ => ErrorCode::Internal,
    }
}
