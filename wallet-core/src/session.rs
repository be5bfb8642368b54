use std::sync::Arc;

use wallet_providers::keystore::imp::EncryptedKeystore;

/// The signed-in user and the keystore holding their private data. Passed explicitly to
/// every service call acting on behalf of the user.
#[derive(Clone)]
pub struct Session {
    user_handle: String,
    keystore: Arc<EncryptedKeystore>,
}

impl Session {
    pub fn new(user_handle: impl Into<String>, keystore: Arc<EncryptedKeystore>) -> Self {
        Self {
            user_handle: user_handle.into(),
            keystore,
        }
    }

    pub fn user_handle(&self) -> &str {
        &self.user_handle
    }

    pub fn keystore(&self) -> &Arc<EncryptedKeystore> {
        &self.keystore
    }
}
