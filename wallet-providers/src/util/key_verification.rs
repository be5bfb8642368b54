//! Utilities for signature verification.

use std::sync::Arc;

use async_trait::async_trait;

use wallet_crypto::{CryptoProvider, SignerError};

use crate::credential_codec::model::{KeySource, TokenVerifier};
use crate::credential_codec::IssuerKeyResolver;

#[derive(Clone)]
pub struct KeyVerification {
    pub key_resolver: Arc<dyn IssuerKeyResolver>,
    pub crypto: Arc<dyn CryptoProvider>,
}

#[async_trait]
impl TokenVerifier for KeyVerification {
    async fn verify<'a>(
        &self,
        key_source: KeySource,
        algorithm: &'a str,
        token: &'a [u8],
        signature: &'a [u8],
    ) -> Result<(), SignerError> {
        if algorithm != "ES256" {
            return Err(SignerError::MissingAlgorithm(algorithm.to_owned()));
        }

        let public_key = self
            .key_resolver
            .resolve(&key_source)
            .await
            .map_err(|e| SignerError::CouldNotVerify(e.to_string()))?;

        let signer = self.crypto.get_signer(algorithm)?;

        signer.verify(token, signature, &public_key)
    }
}
