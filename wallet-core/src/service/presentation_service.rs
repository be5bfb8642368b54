//! Presentations driven end to end: request handling, user selection and the response.

use std::sync::Arc;

use tokio::runtime::Handle;
use wallet_providers::exchange_protocol::openid4vp::selection::{
    SelectionOutcome, SelectionRequester,
};
use wallet_providers::exchange_protocol::openid4vp::OpenID4VPEngine;

use crate::service::error::ServiceError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresentationOutcome {
    Sent { redirect_uri: Option<String> },
    Cancelled,
}

pub struct PresentationService {
    engine: Arc<dyn OpenID4VPEngine>,
    selection: SelectionRequester,
}

impl PresentationService {
    pub fn new(engine: Arc<dyn OpenID4VPEngine>, selection: SelectionRequester) -> Self {
        Self { engine, selection }
    }

    /// Handles the authorization request, waits for the user to pick credentials and answers
    /// the verifier. A dismissed selection drops the stored request, and so does dropping the
    /// returned future before the response was sent.
    pub async fn present(&self, url: &str) -> Result<PresentationOutcome, ServiceError> {
        let request = self.engine.handle_authorization_request(url).await?;
        let pending = PendingPresentation::new(self.engine.clone());

        let outcome = match self.selection.request(request).await {
            SelectionOutcome::Resolved(selection) => {
                let result = self.engine.send_authorization_response(selection).await;
                pending.disarm();
                PresentationOutcome::Sent {
                    redirect_uri: result?,
                }
            }
            SelectionOutcome::Cancelled => {
                tracing::debug!("credential selection cancelled");
                self.engine.cancel().await;
                pending.disarm();
                PresentationOutcome::Cancelled
            }
        };

        Ok(outcome)
    }

    /// Drops the stored presentation request, if any.
    pub async fn cancel(&self) {
        self.engine.cancel().await;
    }
}

/// Clears the engine's stored request when a presentation is abandoned mid-flight.
struct PendingPresentation {
    engine: Option<Arc<dyn OpenID4VPEngine>>,
}

impl PendingPresentation {
    fn new(engine: Arc<dyn OpenID4VPEngine>) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    fn disarm(mut self) {
        self.engine = None;
    }
}

impl Drop for PendingPresentation {
    fn drop(&mut self) {
        let Some(engine) = self.engine.take() else {
            return;
        };

        match Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("presentation abandoned, dropping the stored request");
                handle.spawn(async move { engine.cancel().await });
            }
            Err(_) => {
                tracing::warn!("presentation abandoned outside a runtime, request left in place")
            }
        }
    }
}
