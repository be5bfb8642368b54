//! Single presentation slot. At most one request is answered at a time.

use tokio::sync::Mutex;

use super::error::OpenID4VPError;
use super::model::PresentationFlowState;


#[derive(Default)]
pub struct PresentationSlot {
    state: Mutex<Option<PresentationFlowState>>,
}

impl PresentationSlot {
    pub async fn is_occupied(&self) -> bool {
        self.state.lock().await.is_some()
    }

    pub async fn occupy(&self, state: PresentationFlowState) -> Result<(), OpenID4VPError> {
        let mut slot = self.state.lock().await;
        if slot.is_some() {
            return Err(OpenID4VPError::PresentationInProgress);
        }
        *slot = Some(state);
        Ok(())
    }

    /// Empties the slot, whatever happens to the returned state afterwards.
    pub async fn take(&self) -> Option<PresentationFlowState> {
        self.state.lock().await.take()
    }

    pub async fn clear(&self) {
        self.state.lock().await.take();
    }
}
