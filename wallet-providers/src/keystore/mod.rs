//! Encrypted holder keystore: holder keys, credentials and presentation history sealed in
//! one container that is synchronized with the backend under an ETag precondition.

use std::sync::Arc;

use async_trait::async_trait;

use wallet_crypto::SignerError;

use self::error::KeystoreError;
use self::model::HolderKeyRef;
use crate::common_models::credential::StorableCredential;
use crate::common_models::presentation::PresentationRecord;
use crate::credential_codec::model::SignatureProvider;

pub mod container;
pub mod error;
pub mod imp;
pub mod model;
pub mod session_guard;
pub mod sync;
pub mod webauthn;

/// Operations protocol engines need from the unlocked keystore. Every mutation is uploaded
/// before it becomes visible locally.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait HolderKeystore: Send + Sync {
    async fn generate_holder_keys(&self, count: usize) -> Result<Vec<HolderKeyRef>, KeystoreError>;

    async fn sign(&self, key_id: &str, message: &[u8]) -> Result<Vec<u8>, KeystoreError>;

    async fn add_credentials(
        &self,
        credentials: Vec<StorableCredential>,
    ) -> Result<(), KeystoreError>;

    async fn credentials(&self) -> Result<Vec<StorableCredential>, KeystoreError>;

    /// Appends the audit record and increments `sigCount` of every credential it used.
    async fn record_presentation(&self, record: PresentationRecord) -> Result<(), KeystoreError>;
}

/// Signs with a holder key through the keystore.
pub struct HolderKeySigner {
    keystore: Arc<dyn HolderKeystore>,
    key: HolderKeyRef,
    public_key: Vec<u8>,
}

impl HolderKeySigner {
    pub fn new(keystore: Arc<dyn HolderKeystore>, key: HolderKeyRef) -> Result<Self, KeystoreError> {
        Ok(Self {
            public_key: key.public_jwk.to_sec1()?,
            keystore,
            key,
        })
    }
}

#[async_trait]
impl SignatureProvider for HolderKeySigner {
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        self.keystore
            .sign(&self.key.key_id, message)
            .await
            .map_err(|e| SignerError::CouldNotSign(e.to_string()))
    }

    fn get_key_id(&self) -> Option<String> {
        Some(self.key.key_id.to_owned())
    }

    fn get_public_key(&self) -> Vec<u8> {
        self.public_key.clone()
    }
}
