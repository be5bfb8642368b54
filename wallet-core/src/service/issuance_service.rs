//! Credential issuance on behalf of the session user.

use std::sync::Arc;

use time::OffsetDateTime;

use wallet_providers::exchange_protocol::openid4vci::flow_state::IssuanceFlowRepository;
use wallet_providers::exchange_protocol::openid4vci::model::{
    AuthorizationRequestResult, CredentialOfferResult, IssuanceResult,
};
use wallet_providers::exchange_protocol::openid4vci::OpenID4VCIClient;

use crate::service::error::ServiceError;
use crate::session::Session;

pub struct IssuanceService {
    client: Arc<dyn OpenID4VCIClient>,
    flows: Arc<dyn IssuanceFlowRepository>,
}

impl IssuanceService {
    pub fn new(client: Arc<dyn OpenID4VCIClient>, flows: Arc<dyn IssuanceFlowRepository>) -> Self {
        Self { client, flows }
    }

    pub async fn handle_credential_offer(
        &self,
        url: &str,
    ) -> Result<CredentialOfferResult, ServiceError> {
        Ok(self.client.handle_credential_offer(url).await?)
    }

    /// Returns the redirect the user has to follow, or the issued credentials when no user
    /// interaction was needed.
    pub async fn start_authorization(
        &self,
        session: &Session,
        offer: &CredentialOfferResult,
    ) -> Result<AuthorizationRequestResult, ServiceError> {
        let result = self
            .client
            .generate_authorization_request(
                &offer.selected_credential_configuration_id,
                session.user_handle(),
                offer.issuer_state.clone(),
            )
            .await;

        self.persist_flows(session).await?;
        Ok(result?)
    }

    pub async fn handle_authorization_response(
        &self,
        session: &Session,
        url: &str,
        dpop_nonce: Option<String>,
    ) -> Result<IssuanceResult, ServiceError> {
        let result = self
            .client
            .handle_authorization_response(url, session.user_handle(), dpop_nonce)
            .await;

        self.persist_flows(session).await?;
        Ok(result?)
    }

    pub async fn accept_pre_authorized_offer(
        &self,
        session: &Session,
        offer: CredentialOfferResult,
        tx_code: Option<String>,
    ) -> Result<IssuanceResult, ServiceError> {
        let result = self
            .client
            .pre_authorized_code_grant(offer, session.user_handle(), tx_code)
            .await;

        self.persist_flows(session).await?;
        Ok(result?)
    }

    pub async fn sweep_expired_flows(&self, session: &Session) -> Result<usize, ServiceError> {
        let removed = self
            .client
            .sweep_expired_flows(OffsetDateTime::now_utc())
            .await;
        if removed > 0 {
            self.persist_flows(session).await?;
        }
        Ok(removed)
    }

    /// Flow state survives reloads inside the encrypted private data.
    async fn persist_flows(&self, session: &Session) -> Result<(), ServiceError> {
        let snapshot = self.flows.snapshot().await?;
        session.keystore().store_issuance_flows(snapshot).await?;
        Ok(())
    }
}
