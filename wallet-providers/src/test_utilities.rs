use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ct_codecs::{Base64, Base64UrlSafeNoPadding, Decoder, Encoder};
use wallet_crypto::imp::hasher::sha256::SHA256;
use wallet_crypto::imp::signer::es256::ES256Signer;
use wallet_crypto::imp::CryptoProviderImpl;
use wallet_crypto::{CryptoProvider, Hasher, Signer, SignerError};

use crate::credential_codec::model::SignatureProvider;

/// P-256 key the certificates below were issued for.
pub const FIXTURE_PRIVATE_KEY_HEX: &str =
    "c8d2708542316a35e76c1a09ba98e11739331ca9c820930096a885bddc928f66";

/// SAN: `verifier.example.com`, `www.verifier.example.com`.
pub const VERIFIER_CERT: &str = "MIIB0zCCAXigAwIBAgIUZnTPXVbiUNT6JcXDzAHZFIgwZsMwCgYIKoZIzj0EAwIwHzEdMBsGA1UEAwwUdmVyaWZpZXIuZXhhbXBsZS5jb20wIBcNMjYxMDE5MDgzMDMxWhgPMjEyNjA5MjUwODMwMzFaMB8xHTAbBgNVBAMMFHZlcmlmaWVyLmV4YW1wbGUuY29tMFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEjOoghndcNpKjklP+RW9WAFsZ5Lnh6w0thT9Fv1g7P3F2lXjLdKxGUlA7IX9V4DYO+an5vs407kavCq21fQhwzKOBjzCBjDAdBgNVHQ4EFgQU6hgxcR1l4S+lbB3VYpz8oiGjPAAwHwYDVR0jBBgwFoAU6hgxcR1l4S+lbB3VYpz8oiGjPAAwDwYDVR0TAQH/BAUwAwEB/zA5BgNVHREEMjAwghR2ZXJpZmllci5leGFtcGxlLmNvbYIYd3d3LnZlcmlmaWVyLmV4YW1wbGUuY29tMAoGCCqGSM49BAMCA0kAMEYCIQD8R44v5vHXJu5OeEkJT+8GjBTseq6SbMSOV7izSdJgYQIhAIdQ9AmVv29htSJ1BhE77/PudX8meyapt8KaZUuzOSEK";

/// SAN: `other.example.org`.
pub const OTHER_DOMAIN_CERT: &str = "MIIBrjCCAVOgAwIBAgIUS1w4VUIN4tk7lAbC3IraAjFJxDcwCgYIKoZIzj0EAwIwHDEaMBgGA1UEAwwRb3RoZXIuZXhhbXBsZS5vcmcwIBcNMjYxMDE5MDgzMDMxWhgPMjEyNjA5MjUwODMwMzFaMBwxGjAYBgNVBAMMEW90aGVyLmV4YW1wbGUub3JnMFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEjOoghndcNpKjklP+RW9WAFsZ5Lnh6w0thT9Fv1g7P3F2lXjLdKxGUlA7IX9V4DYO+an5vs407kavCq21fQhwzKNxMG8wHQYDVR0OBBYEFOoYMXEdZeEvpWwd1WKc/KIhozwAMB8GA1UdIwQYMBaAFOoYMXEdZeEvpWwd1WKc/KIhozwAMA8GA1UdEwEB/wQFMAMBAf8wHAYDVR0RBBUwE4IRb3RoZXIuZXhhbXBsZS5vcmcwCgYIKoZIzj0EAwIDSQAwRgIhANjXbNGSyw0kD/Anvpa1/0GJ4zlJxg8ZWykXgo416Pb9AiEA0WfxpDyJ+k1JYPdYmr+fIF3TMnWhx16KGFW52tiQyj0=";

/// CN `verifier.example.com` without a SAN extension.
pub const NO_SAN_CERT: &str = "MIIBlTCCATugAwIBAgIUeP0X0e5N8EgPrMqBXcanP8TqEy4wCgYIKoZIzj0EAwIwHzEdMBsGA1UEAwwUdmVyaWZpZXIuZXhhbXBsZS5jb20wIBcNMjYxMDE5MDgzMDMxWhgPMjEyNjA5MjUwODMwMzFaMB8xHTAbBgNVBAMMFHZlcmlmaWVyLmV4YW1wbGUuY29tMFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEjOoghndcNpKjklP+RW9WAFsZ5Lnh6w0thT9Fv1g7P3F2lXjLdKxGUlA7IX9V4DYO+an5vs407kavCq21fQhwzKNTMFEwHQYDVR0OBBYEFOoYMXEdZeEvpWwd1WKc/KIhozwAMB8GA1UdIwQYMBaAFOoYMXEdZeEvpWwd1WKc/KIhozwAMA8GA1UdEwEB/wQFMAMBAf8wCgYIKoZIzj0EAwIDSAAwRQIgFFHN0ohUsZyHIclMBEatol2rD8gtqmYnA2MB2wE6B9MCIQCtAV+N20vjAUJgsU+3cODmysrT3pcpYbTDYOdgJfEBaA==";

pub fn fixture_private_key() -> Vec<u8> {
    (0..FIXTURE_PRIVATE_KEY_HEX.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&FIXTURE_PRIVATE_KEY_HEX[i..i + 2], 16).unwrap())
        .collect()
}

pub fn cert_der(cert: &str) -> Vec<u8> {
    Base64::decode_to_vec(cert, None).unwrap()
}

/// ES256 signing with raw key material.
#[derive(Clone)]
pub struct EcKeySigner {
    pub private_key: Vec<u8>,
    pub public_key: Vec<u8>,
}

impl EcKeySigner {
    pub fn random() -> Self {
        let (private_key, public_key) = ES256Signer::random();
        Self {
            private_key,
            public_key,
        }
    }

    pub fn fixture() -> Self {
        let private_key = fixture_private_key();
        let public_key = ES256Signer::public_key_from_private(&private_key).unwrap();
        Self {
            private_key,
            public_key,
        }
    }
}

#[async_trait]
impl SignatureProvider for EcKeySigner {
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        ES256Signer {}.sign(message, &self.public_key, &self.private_key)
    }

    fn get_key_id(&self) -> Option<String> {
        None
    }

    fn get_public_key(&self) -> Vec<u8> {
        self.public_key.clone()
    }
}

pub struct MockAuth<F: Fn(&[u8]) -> Vec<u8> + Send + Sync>(pub F);

#[async_trait]
impl<F: Fn(&[u8]) -> Vec<u8> + Send + Sync> SignatureProvider for MockAuth<F> {
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        Ok(self.0(message))
    }

    fn get_key_id(&self) -> Option<String> {
        None
    }

    fn get_public_key(&self) -> Vec<u8> {
        vec![]
    }
}

/// Compact JWS over the given JSON header and payload.
pub fn sign_jwt(header: serde_json::Value, payload: serde_json::Value, signer: &EcKeySigner) -> String {
    let input = format!(
        "{}.{}",
        Base64UrlSafeNoPadding::encode_to_string(header.to_string()).unwrap(),
        Base64UrlSafeNoPadding::encode_to_string(payload.to_string()).unwrap()
    );
    let signature = ES256Signer {}
        .sign(input.as_bytes(), &signer.public_key, &signer.private_key)
        .unwrap();
    format!(
        "{input}.{}",
        Base64UrlSafeNoPadding::encode_to_string(signature).unwrap()
    )
}

pub fn test_crypto() -> Arc<dyn CryptoProvider> {
    Arc::new(CryptoProviderImpl::new(
        HashMap::from([("sha-256".to_owned(), Arc::new(SHA256 {}) as Arc<dyn Hasher>)]),
        HashMap::from([("ES256".to_owned(), Arc::new(ES256Signer {}) as Arc<dyn Signer>)]),
    ))
}
