use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::common_models::credential::StorableCredential;
use crate::common_models::presentation::PresentationRecord;
use crate::credential_storage::{CredentialStorage, StorageError};

#[derive(Default)]
pub struct InMemoryCredentialStorage {
    credentials: Mutex<Vec<StorableCredential>>,
    presentations: Mutex<Vec<PresentationRecord>>,
}

#[async_trait]
impl CredentialStorage for InMemoryCredentialStorage {
    async fn store_credentials(
        &self,
        credentials: Vec<StorableCredential>,
    ) -> Result<(), StorageError> {
        let mut stored = self.credentials.lock().await;
        for credential in credentials {
            match stored
                .iter_mut()
                .find(|c| c.credential_identifier == credential.credential_identifier)
            {
                Some(existing) => *existing = credential,
                None => stored.push(credential),
            }
        }
        Ok(())
    }

    async fn get_credentials(&self) -> Result<Vec<StorableCredential>, StorageError> {
        Ok(self.credentials.lock().await.clone())
    }

    async fn store_presentation(&self, record: PresentationRecord) -> Result<(), StorageError> {
        self.presentations.lock().await.push(record);
        Ok(())
    }

    async fn get_presentations(&self) -> Result<Vec<PresentationRecord>, StorageError> {
        Ok(self.presentations.lock().await.clone())
    }
}
