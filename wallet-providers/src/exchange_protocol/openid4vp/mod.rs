//! OpenID4VP holder engine: authorization request parsing and verifier trust, credential
//! matching against presentation definitions and selective disclosure responses.

use async_trait::async_trait;

use self::error::OpenID4VPError;
use self::model::{AuthorizationRequestResult, SelectionMap};

pub mod error;
pub mod imp;
pub mod model;
pub mod selection;
pub mod state;

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait OpenID4VPEngine: Send + Sync {
    /// Verifies the request and matches held credentials. Presentation state is stored only
    /// when every check passed.
    async fn handle_authorization_request(
        &self,
        url: &str,
    ) -> Result<AuthorizationRequestResult, OpenID4VPError>;

    /// Answers the stored request with the selected credentials; returns the verifier redirect.
    /// The presentation state is consumed whatever the outcome.
    async fn send_authorization_response(
        &self,
        selection: SelectionMap,
    ) -> Result<Option<String>, OpenID4VPError>;

    /// Drops the stored request without answering it.
    async fn cancel(&self);
}

/// Corroborates a request signing certificate against the live verifier endpoint.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait VerifierTrustProbe: Send + Sync {
    async fn corroborate(&self, host: String, leaf_certificate: Vec<u8>) -> Result<bool, anyhow::Error>;
}
