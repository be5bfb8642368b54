//! Local listing store for credentials and the presentation history shown to the user.
//! The encrypted keystore stays authoritative; this store is written after it.

use async_trait::async_trait;
use thiserror::Error;

use crate::common_models::credential::StorableCredential;
use crate::common_models::presentation::PresentationRecord;

pub mod imp;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("HTTP error: `{0}`")]
    Transport(#[source] anyhow::Error),
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait CredentialStorage: Send + Sync {
    async fn store_credentials(
        &self,
        credentials: Vec<StorableCredential>,
    ) -> Result<(), StorageError>;

    async fn get_credentials(&self) -> Result<Vec<StorableCredential>, StorageError>;

    async fn store_presentation(&self, record: PresentationRecord) -> Result<(), StorageError>;

    async fn get_presentations(&self) -> Result<Vec<PresentationRecord>, StorageError>;
}
