//! Remote storage of the encrypted private data container.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use super::error::SyncError;
use crate::http_client::HttpClient;

#[cfg(test)]
mod test;

pub const IF_MATCH_HEADER: &str = "X-Private-Data-If-Match";
pub const ETAG_HEADER: &str = "X-Private-Data-Etag";
const PRIVATE_DATA_PATH: &str = "/user/session/private-data";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemotePrivateData {
    pub container: String,
    pub etag: String,
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait PrivateDataSync: Send + Sync {
    /// Uploads `container` if the remote copy still carries `if_match`; returns the new ETag.
    async fn update_private_data(
        &self,
        container: String,
        if_match: Option<String>,
    ) -> Result<String, SyncError>;

    async fn fetch_private_data(&self) -> Result<Option<RemotePrivateData>, SyncError>;
}

pub struct HttpPrivateDataSync {
    client: Arc<dyn HttpClient>,
    base_url: String,
}

impl HttpPrivateDataSync {
    pub fn new(client: Arc<dyn HttpClient>, base_url: String) -> Self {
        Self { client, base_url }
    }

    fn url(&self) -> String {
        format!("{}{PRIVATE_DATA_PATH}", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PrivateDataSync for HttpPrivateDataSync {
    async fn update_private_data(
        &self,
        container: String,
        if_match: Option<String>,
    ) -> Result<String, SyncError> {
        let mut request = self
            .client
            .post(&self.url())
            .header("Content-Type", "application/json")
            .body(container.into_bytes());
        if let Some(etag) = &if_match {
            request = request.header(IF_MATCH_HEADER, etag);
        }

        let response = request
            .send()
            .await
            .context("send error")
            .map_err(SyncError::Transport)?;

        if response.status.0 == 412 {
            let etag = response.header_get(ETAG_HEADER).cloned();
            tracing::warn!(?etag, "private data upload rejected, remote copy changed");
            return Err(SyncError::PreconditionFailed { etag });
        }

        let response = response
            .error_for_status()
            .context("status error")
            .map_err(SyncError::Transport)?;

        let etag = response
            .header_get(ETAG_HEADER)
            .cloned()
            .ok_or(SyncError::MissingHeader(ETAG_HEADER))?;

        tracing::debug!("private data uploaded");
        Ok(etag)
    }

    async fn fetch_private_data(&self) -> Result<Option<RemotePrivateData>, SyncError> {
        let response = self
            .client
            .get(&self.url())
            .send()
            .await
            .context("send error")
            .map_err(SyncError::Transport)?;

        if response.status.0 == 204 || response.status.0 == 404 {
            return Ok(None);
        }

        let response = response
            .error_for_status()
            .context("status error")
            .map_err(SyncError::Transport)?;

        let etag = response
            .header_get(ETAG_HEADER)
            .cloned()
            .ok_or(SyncError::MissingHeader(ETAG_HEADER))?;
        let container = response
            .text()
            .context("parsing error")
            .map_err(SyncError::Transport)?;

        Ok(Some(RemotePrivateData { container, etag }))
    }
}
