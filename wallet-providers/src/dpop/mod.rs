//! DPoP proofs (RFC 9449) and OpenID4VCI key proofs.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

use wallet_crypto::imp::signer::es256::ES256Signer;
use wallet_crypto::imp::utilities::generate_nonce;
use wallet_crypto::{CryptoProvider, CryptoProviderError, HasherError, SignerError};

use crate::common_models::jwk::{EcPrivateJwk, EcPublicJwk, JwkError};
use crate::credential_codec::error::CodecError;
use crate::credential_codec::imp::jwt::model::{JWTHeader, JWTPayload};
use crate::credential_codec::imp::jwt::Jwt;
use crate::credential_codec::model::{AuthenticationFn, SignatureProvider};
use crate::http_client::Method;

pub mod model;


use self::model::{DpopClaims, KeyProofClaims};

pub const DPOP_JWT_TYPE: &str = "dpop+jwt";
pub const KEY_PROOF_JWT_TYPE: &str = "openid4vci-proof+jwt";
pub const DPOP_ALGORITHM: &str = "ES256";

#[derive(Debug, PartialEq, Eq, Error)]
pub enum DpopError {
    #[error("Invalid target URL: `{0}`")]
    InvalidUrl(String),
    #[error("Codec error: `{0}`")]
    Codec(#[from] CodecError),
    #[error("JWK error: `{0}`")]
    Jwk(#[from] JwkError),
    #[error("Signer error: `{0}`")]
    Signer(#[from] SignerError),
    #[error("Hasher error: `{0}`")]
    Hasher(#[from] HasherError),
    #[error("Crypto provider error: `{0}`")]
    CryptoProvider(#[from] CryptoProviderError),
}

/// Proof-of-possession key generated once per issuance flow and persisted with it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DpopKeyPair {
    pub alg: String,
    pub private_jwk: EcPrivateJwk,
    pub public_jwk: EcPublicJwk,
    /// `jti` of the most recent proof, a retry must never repeat it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_jti: Option<String>,
}

impl DpopKeyPair {
    pub fn generate() -> Result<Self, DpopError> {
        let (private_key, _) = ES256Signer::random();
        let private_jwk = EcPrivateJwk::from_secret_bytes(&private_key)?;

        Ok(Self {
            alg: DPOP_ALGORITHM.to_owned(),
            public_jwk: private_jwk.public(),
            private_jwk,
            last_jti: None,
        })
    }
}

/// Request a DPoP proof is bound to.
#[derive(Clone, Debug)]
pub struct DpopProofParams {
    pub method: Method,
    pub url: String,
    pub access_token: Option<String>,
    /// Last `DPoP-Nonce` received from the server.
    pub nonce: Option<String>,
}

/// Builds proof JWTs. DPoP proofs are signed with the flow key, key proofs with the holder
/// key held by the keystore.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ProofEngine: Send + Sync {
    /// Signs a fresh proof (new `jti`) and records the `jti` on `key`.
    async fn dpop_proof(
        &self,
        key: &mut DpopKeyPair,
        params: DpopProofParams,
    ) -> Result<String, DpopError>;

    async fn key_proof(
        &self,
        issuer: &str,
        c_nonce: Option<String>,
        auth_fn: AuthenticationFn,
    ) -> Result<String, DpopError>;
}

pub struct ProofEngineImpl {
    crypto: Arc<dyn CryptoProvider>,
}

impl ProofEngineImpl {
    pub fn new(crypto: Arc<dyn CryptoProvider>) -> Self {
        Self { crypto }
    }
}

#[async_trait]
impl ProofEngine for ProofEngineImpl {
    async fn dpop_proof(
        &self,
        key: &mut DpopKeyPair,
        params: DpopProofParams,
    ) -> Result<String, DpopError> {
        let access_token_hash = params
            .access_token
            .as_deref()
            .map(|token| {
                self.crypto
                    .get_hasher("sha-256")?
                    .hash_base64(token.as_bytes())
                    .map_err(DpopError::from)
            })
            .transpose()?;

        let jti = generate_nonce();

        let mut header = JWTHeader::new(DPOP_JWT_TYPE, &key.alg);
        header.jwk = Some(key.public_jwk.clone());

        let jwt = Jwt::new(
            header,
            JWTPayload {
                issued_at: Some(OffsetDateTime::now_utc()),
                jwt_id: Some(jti.clone()),
                nonce: params.nonce,
                custom: DpopClaims {
                    htm: params.method.as_str().to_owned(),
                    htu: target_uri(&params.url)?,
                    ath: access_token_hash,
                },
                ..Default::default()
            },
        );

        let signer = FlowKeySigner {
            crypto: self.crypto.clone(),
            private_key: key.private_jwk.clone(),
            public_key: key.public_jwk.to_sec1()?,
            algorithm: key.alg.clone(),
        };
        let proof = jwt.tokenize(Box::new(signer)).await?;

        key.last_jti = Some(jti);
        Ok(proof)
    }

    async fn key_proof(
        &self,
        issuer: &str,
        c_nonce: Option<String>,
        auth_fn: AuthenticationFn,
    ) -> Result<String, DpopError> {
        let mut header = JWTHeader::new(KEY_PROOF_JWT_TYPE, DPOP_ALGORITHM);
        header.jwk = Some(EcPublicJwk::from_sec1(&auth_fn.get_public_key())?);

        let jwt = Jwt::new(
            header,
            JWTPayload {
                issued_at: Some(OffsetDateTime::now_utc()),
                audience: Some(issuer.to_owned()),
                nonce: c_nonce,
                custom: KeyProofClaims {},
                ..Default::default()
            },
        );

        Ok(jwt.tokenize(auth_fn).await?)
    }
}

/// `htu` is the request URI without query and fragment.
fn target_uri(url: &str) -> Result<String, DpopError> {
    let mut url = Url::parse(url).map_err(|e| DpopError::InvalidUrl(e.to_string()))?;
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

struct FlowKeySigner {
    crypto: Arc<dyn CryptoProvider>,
    private_key: EcPrivateJwk,
    public_key: Vec<u8>,
    algorithm: String,
}

#[async_trait]
impl SignatureProvider for FlowKeySigner {
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        let private_key = self
            .private_key
            .secret_bytes()
            .map_err(|_| SignerError::CouldNotExtractKeyPair)?;
        self.crypto
            .get_signer(&self.algorithm)?
            .sign(message, &self.public_key, &private_key)
    }

    fn get_key_id(&self) -> Option<String> {
        None
    }

    fn get_public_key(&self) -> Vec<u8> {
        self.public_key.clone()
    }
}
