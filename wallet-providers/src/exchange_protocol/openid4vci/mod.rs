//! OpenID4VCI issuance client: credential offers, pushed or first-party authorization,
//! DPoP-bound token exchange and batch credential requests.

use async_trait::async_trait;
use time::OffsetDateTime;

use self::error::OpenID4VCIError;
use self::model::{AuthorizationRequestResult, CredentialOfferResult, IssuanceResult};

pub mod error;
pub mod flow_state;
pub mod imp;
pub mod model;

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait OpenID4VCIClient: Send + Sync {
    /// Parses an offer URL and validates it against the issuer metadata. Has no side effects
    /// besides the metadata cache.
    async fn handle_credential_offer(
        &self,
        url: &str,
    ) -> Result<CredentialOfferResult, OpenID4VCIError>;

    /// Reuses a live access token or refresh token when possible, otherwise starts a new
    /// authorization.
    async fn generate_authorization_request(
        &self,
        credential_configuration_id: &str,
        user_handle: &str,
        issuer_state: Option<String>,
    ) -> Result<AuthorizationRequestResult, OpenID4VCIError>;

    async fn handle_authorization_response(
        &self,
        url: &str,
        user_handle: &str,
        dpop_nonce: Option<String>,
    ) -> Result<IssuanceResult, OpenID4VCIError>;

    async fn pre_authorized_code_grant(
        &self,
        offer: CredentialOfferResult,
        user_handle: &str,
        tx_code: Option<String>,
    ) -> Result<IssuanceResult, OpenID4VCIError>;

    async fn sweep_expired_flows(&self, now: OffsetDateTime) -> usize;
}
