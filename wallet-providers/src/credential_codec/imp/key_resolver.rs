//! Issuer key resolution from certificate chains and `jwt-vc-issuer` metadata.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use crate::common_models::jwk::EcPublicJwk;
use crate::credential_codec::error::CodecError;
use crate::credential_codec::model::KeySource;
use crate::credential_codec::IssuerKeyResolver;
use crate::http_client::HttpClient;
use crate::util::x509;


#[derive(Debug, Deserialize)]
struct JwtVcIssuerMetadata {
    issuer: String,
    #[serde(default)]
    jwks: Option<Jwks>,
    #[serde(default)]
    jwks_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<serde_json::Value>,
}

pub struct X509JwksKeyResolver {
    client: Arc<dyn HttpClient>,
    trust_anchors: Vec<Vec<u8>>,
    jwks_cache: Mutex<HashMap<String, Vec<EcPublicJwk>>>,
}

impl X509JwksKeyResolver {
    /// With no trust anchors any well-formed chain is accepted and the leaf key is used.
    pub fn new(client: Arc<dyn HttpClient>, trust_anchors: Vec<Vec<u8>>) -> Self {
        Self {
            client,
            trust_anchors,
            jwks_cache: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CodecError> {
        self.client
            .get(url)
            .send()
            .await
            .context("send error")
            .and_then(|response| response.error_for_status().context("status error"))
            .and_then(|response| response.json().context("parsing error"))
            .map_err(|e| CodecError::KeyResolution(format!("{url}: {e:#}")))
    }

    async fn issuer_keys(&self, issuer: &str) -> Result<Vec<EcPublicJwk>, CodecError> {
        if let Some(keys) = self.jwks_cache.lock().await.get(issuer) {
            return Ok(keys.to_owned());
        }

        let metadata: JwtVcIssuerMetadata = self.fetch(&well_known_url(issuer)?).await?;
        if metadata.issuer.trim_end_matches('/') != issuer.trim_end_matches('/') {
            return Err(CodecError::KeyResolution(format!(
                "issuer metadata is for `{}`",
                metadata.issuer
            )));
        }

        let jwks = match (metadata.jwks, metadata.jwks_uri) {
            (Some(jwks), _) => jwks,
            (None, Some(jwks_uri)) => self.fetch(&jwks_uri).await?,
            (None, None) => {
                return Err(CodecError::KeyResolution(
                    "issuer metadata has no keys".to_owned(),
                ))
            }
        };

        let keys: Vec<EcPublicJwk> = jwks
            .keys
            .iter()
            .filter_map(|key| EcPublicJwk::from_json(key).ok())
            .collect();

        tracing::debug!(issuer, keys = keys.len(), "resolved issuer JWKS");
        self.jwks_cache
            .lock()
            .await
            .insert(issuer.to_owned(), keys.clone());

        Ok(keys)
    }
}

#[async_trait]
impl IssuerKeyResolver for X509JwksKeyResolver {
    async fn resolve(&self, source: &KeySource) -> Result<Vec<u8>, CodecError> {
        match source {
            KeySource::CertificateChain(chain) => {
                let leaf = chain.first().ok_or(x509::CertificateError::EmptyChain)?;
                if !self.trust_anchors.is_empty() {
                    x509::verify_chain(chain, &self.trust_anchors)?;
                }
                Ok(x509::public_key(leaf)?)
            }
            KeySource::Issuer { issuer, key_id } => {
                let keys = self.issuer_keys(issuer).await?;

                let key = match key_id {
                    Some(key_id) => keys
                        .iter()
                        .find(|key| key.kid.as_deref() == Some(key_id.as_str())),
                    None if keys.len() == 1 => keys.first(),
                    None => None,
                }
                .ok_or_else(|| CodecError::KeyResolution(format!("no matching key for {issuer}")))?;

                Ok(key.to_sec1()?)
            }
        }
    }
}

/// `https://iss.example/tenant` resolves to `https://iss.example/.well-known/jwt-vc-issuer/tenant`.
fn well_known_url(issuer: &str) -> Result<String, CodecError> {
    let url = Url::parse(issuer).map_err(|e| CodecError::KeyResolution(e.to_string()))?;
    let host = url
        .host_str()
        .ok_or(CodecError::KeyResolution("issuer has no host".to_owned()))?;
    let port = url.port().map(|port| format!(":{port}")).unwrap_or_default();
    let path = url.path().trim_end_matches('/');

    Ok(format!(
        "{}://{host}{port}/.well-known/jwt-vc-issuer{path}",
        url.scheme()
    ))
}
