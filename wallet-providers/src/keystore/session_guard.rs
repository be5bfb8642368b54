//! Single-tab ownership of the unlocked session.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Shared slot naming the instance that currently owns the session, e.g. backed by
/// browser storage observed by every open tab.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait SessionOwnerStore: Send + Sync {
    async fn owner(&self) -> Option<Uuid>;
    async fn set_owner(&self, owner: Uuid);
}

#[derive(Default)]
pub struct InMemorySessionOwnerStore {
    owner: Mutex<Option<Uuid>>,
}

#[async_trait]
impl SessionOwnerStore for InMemorySessionOwnerStore {
    async fn owner(&self) -> Option<Uuid> {
        *self.owner.lock().await
    }

    async fn set_owner(&self, owner: Uuid) {
        *self.owner.lock().await = Some(owner);
    }
}

#[derive(Clone)]
pub struct SessionGuard {
    id: Uuid,
    store: Arc<dyn SessionOwnerStore>,
}

impl SessionGuard {
    pub fn new(store: Arc<dyn SessionOwnerStore>) -> Self {
        Self {
            id: Uuid::new_v4(),
            store,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Takes over the session, superseding whichever instance held it.
    pub async fn claim(&self) {
        self.store.set_owner(self.id).await;
    }

    /// An unclaimed slot counts as active so a freshly started instance can work before
    /// the first unlock.
    pub async fn is_active(&self) -> bool {
        self.store
            .owner()
            .await
            .map_or(true, |owner| owner == self.id)
    }
}
