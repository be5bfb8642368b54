use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use crate::common_models::credential::StorableCredential;
use crate::common_models::presentation::PresentationRecord;
use crate::credential_storage::{CredentialStorage, StorageError};
use crate::http_client::HttpClient;


const CREDENTIALS_PATH: &str = "/storage/vc";
const PRESENTATIONS_PATH: &str = "/storage/vp";

/// Storage endpoints served next to the wallet frontend.
pub struct HttpCredentialStorage {
    client: Arc<dyn HttpClient>,
    base_url: String,
}

impl HttpCredentialStorage {
    pub fn new(client: Arc<dyn HttpClient>, base_url: String) -> Self {
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    async fn post<T: serde::Serialize + Send + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<(), StorageError> {
        self.client
            .post(&self.url(path))
            .json(body)
            .context("serialization error")
            .map_err(StorageError::Transport)?
            .send()
            .await
            .context("send error")
            .and_then(|response| response.error_for_status().context("status error"))
            .map_err(StorageError::Transport)?;
        Ok(())
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, StorageError> {
        self.client
            .get(&self.url(path))
            .send()
            .await
            .context("send error")
            .and_then(|response| response.error_for_status().context("status error"))
            .and_then(|response| response.json().context("parsing error"))
            .map_err(StorageError::Transport)
    }
}

#[async_trait]
impl CredentialStorage for HttpCredentialStorage {
    async fn store_credentials(
        &self,
        credentials: Vec<StorableCredential>,
    ) -> Result<(), StorageError> {
        self.post(CREDENTIALS_PATH, &credentials).await
    }

    async fn get_credentials(&self) -> Result<Vec<StorableCredential>, StorageError> {
        self.get(CREDENTIALS_PATH).await
    }

    async fn store_presentation(&self, record: PresentationRecord) -> Result<(), StorageError> {
        self.post(PRESENTATIONS_PATH, &record).await
    }

    async fn get_presentations(&self) -> Result<Vec<PresentationRecord>, StorageError> {
        self.get(PRESENTATIONS_PATH).await
    }
}
