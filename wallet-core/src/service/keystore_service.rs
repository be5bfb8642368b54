//! Unlocking and maintenance of the encrypted private data container.

use std::sync::Arc;

use serde_json::json;
use zeroize::Zeroizing;

use wallet_providers::exchange_protocol::openid4vci::flow_state::IssuanceFlowRepository;
use wallet_providers::keystore::container::EncryptedContainer;
use wallet_providers::keystore::error::KeystoreError;
use wallet_providers::keystore::imp::ContainerUpgrade;
use wallet_providers::keystore::sync::PrivateDataSync;
use wallet_providers::keystore::webauthn::PrfClient;

use crate::service::error::ServiceError;
use crate::session::Session;

pub struct KeystoreService {
    sync: Arc<dyn PrivateDataSync>,
    flows: Arc<dyn IssuanceFlowRepository>,
}

impl KeystoreService {
    pub fn new(sync: Arc<dyn PrivateDataSync>, flows: Arc<dyn IssuanceFlowRepository>) -> Self {
        Self { sync, flows }
    }

    /// Loads the latest remote container. Returns `false` if the user has none yet.
    pub async fn open(&self, session: &Session) -> Result<bool, ServiceError> {
        let Some(remote) = self
            .sync
            .fetch_private_data()
            .await
            .map_err(KeystoreError::from)?
        else {
            return Ok(false);
        };

        let container = EncryptedContainer::from_json(&remote.container)?;
        session.keystore().load(container, Some(remote.etag)).await;
        Ok(true)
    }

    pub async fn initialize(
        &self,
        session: &Session,
        password: Zeroizing<String>,
    ) -> Result<(), ServiceError> {
        session.keystore().initialize(&password).await?;
        Ok(())
    }

    pub async fn unlock_with_password(
        &self,
        session: &Session,
        password: Zeroizing<String>,
    ) -> Result<(), ServiceError> {
        let upgrade = session.keystore().unlock_with_password(&password).await?;
        self.after_unlock(session, upgrade).await
    }

    pub async fn unlock_with_prf(
        &self,
        session: &Session,
        client: &dyn PrfClient,
    ) -> Result<(), ServiceError> {
        let upgrade = session.keystore().unlock_with_prf(client).await?;
        self.after_unlock(session, upgrade).await
    }

    pub async fn add_prf_key(
        &self,
        session: &Session,
        client: &dyn PrfClient,
    ) -> Result<String, ServiceError> {
        Ok(session.keystore().add_prf_key(client).await?)
    }

    /// Reloads the remote copy after an `x-private-data-etag` conflict.
    pub async fn reconcile(&self, session: &Session) -> Result<(), ServiceError> {
        if session.keystore().fetch_latest().await? && session.keystore().is_unlocked().await {
            self.restore_flows(session).await?;
        }
        Ok(())
    }

    /// Locks the keystore and forgets the issuance flows it carried.
    pub async fn lock(&self, session: &Session) -> Result<(), ServiceError> {
        session.keystore().lock().await;
        self.flows.restore(json!({})).await?;
        Ok(())
    }

    async fn after_unlock(
        &self,
        session: &Session,
        upgrade: Option<ContainerUpgrade>,
    ) -> Result<(), ServiceError> {
        if let Some(upgrade) = upgrade {
            let etag = session
                .keystore()
                .update_private_data(&upgrade.container)
                .await?;
            session.keystore().commit_upgrade(upgrade, etag).await;
            tracing::info!("private data container upgraded");
        }

        self.restore_flows(session).await
    }

    async fn restore_flows(&self, session: &Session) -> Result<(), ServiceError> {
        let snapshot = session.keystore().issuance_flows().await?;
        self.flows.restore(snapshot.unwrap_or(json!({}))).await?;
        Ok(())
    }
}
