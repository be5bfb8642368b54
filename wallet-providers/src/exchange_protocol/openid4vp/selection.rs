//! Credential selection handed to the UI as an explicit request/response channel.
//!
//! The engine sends a [`SelectionRequested`] and waits for it to be resolved. Dropping the
//! request or closing the receiving side resolves to [`SelectionOutcome::Cancelled`], so a
//! waiting presentation never hangs.

use tokio::sync::{mpsc, oneshot};

use super::model::{AuthorizationRequestResult, SelectionMap};


#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionOutcome {
    Resolved(SelectionMap),
    Cancelled,
}

#[derive(Debug)]
pub struct SelectionRequested {
    pub request: AuthorizationRequestResult,
    responder: oneshot::Sender<SelectionMap>,
}

impl SelectionRequested {
    pub fn resolve(self, selection: SelectionMap) {
        if self.responder.send(selection).is_err() {
            tracing::debug!("selection resolved after the presentation was abandoned");
        }
    }

    /// Dismisses the selection. Dropping the responder resolves the waiting presentation to
    /// [`SelectionOutcome::Cancelled`].
    pub fn cancel(self) {
        drop(self.responder);
    }
}

#[derive(Clone)]
pub struct SelectionRequester {
    sender: mpsc::Sender<SelectionRequested>,
}

pub fn selection_channel(buffer: usize) -> (SelectionRequester, mpsc::Receiver<SelectionRequested>) {
    let (sender, receiver) = mpsc::channel(buffer);
    (SelectionRequester { sender }, receiver)
}

impl SelectionRequester {
    pub async fn request(&self, request: AuthorizationRequestResult) -> SelectionOutcome {
        let (responder, response) = oneshot::channel();

        if self
            .sender
            .send(SelectionRequested { request, responder })
            .await
            .is_err()
        {
            return SelectionOutcome::Cancelled;
        }

        match response.await {
            Ok(selection) => SelectionOutcome::Resolved(selection),
            Err(_) => SelectionOutcome::Cancelled,
        }
    }
}
