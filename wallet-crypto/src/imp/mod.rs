use std::collections::HashMap;
use std::sync::Arc;

use super::{CryptoProvider, CryptoProviderError, Hasher, Signer};

pub mod encryption;
pub mod hasher;
pub mod password;
pub mod prf;
pub mod signer;
pub mod utilities;

#[cfg(test)]
mod test;

#[derive(Clone)]
pub struct CryptoProviderImpl {
    hashers: HashMap<String, Arc<dyn Hasher>>,
    signers: HashMap<String, Arc<dyn Signer>>,
}

impl CryptoProviderImpl {
    pub fn new(
        hashers: HashMap<String, Arc<dyn Hasher>>,
        signers: HashMap<String, Arc<dyn Signer>>,
    ) -> Self {
        Self { hashers, signers }
    }
}

impl CryptoProvider for CryptoProviderImpl {
    fn get_hasher(&self, hasher: &str) -> Result<Arc<dyn Hasher>, CryptoProviderError> {
        self.hashers
            .get(hasher)
            .cloned()
            .ok_or(CryptoProviderError::MissingHasher(hasher.to_owned()))
    }

    fn get_signer(&self, signer: &str) -> Result<Arc<dyn Signer>, CryptoProviderError> {
        self.signers
            .get(signer)
            .cloned()
            .ok_or(CryptoProviderError::MissingSigner(signer.to_owned()))
    }
}
