use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use wallet_crypto::imp::hasher::sha256::SHA256;

use crate::common_models::credential::CredentialFormat;
use crate::credential_codec::error::CodecError;
use crate::credential_codec::model::{
    CredentialDisplay, CredentialMetadata, DecodedCredential, IssuerDisplay, ParsedCredential,
    TypeMetadata,
};
use crate::credential_codec::registry::CredentialParserRegistry;
use crate::credential_codec::CredentialCodec;


const PARSE_ORDER: [CredentialFormat; 2] = [CredentialFormat::SdJwt, CredentialFormat::MsoMdoc];
const DEFAULT_CREDENTIAL_NAME: &str = "Credential";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryParams {
    /// Clock skew tolerated on validity checks, in seconds.
    pub leeway: u64,
    #[serde(default = "default_display_language")]
    pub display_language: String,
}

fn default_display_language() -> String {
    "en".to_owned()
}

impl Default for RegistryParams {
    fn default() -> Self {
        Self {
            leeway: 60,
            display_language: default_display_language(),
        }
    }
}

pub struct CredentialParserRegistryImpl {
    sd_jwt: Arc<dyn CredentialCodec>,
    mdoc: Arc<dyn CredentialCodec>,
    params: RegistryParams,
    cache: Mutex<HashMap<String, Arc<DecodedCredential>>>,
}

impl CredentialParserRegistryImpl {
    pub fn new(
        sd_jwt: Arc<dyn CredentialCodec>,
        mdoc: Arc<dyn CredentialCodec>,
        params: RegistryParams,
    ) -> Self {
        Self {
            sd_jwt,
            mdoc,
            params,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn codec(&self, format: CredentialFormat) -> &Arc<dyn CredentialCodec> {
        match format {
            CredentialFormat::SdJwt => &self.sd_jwt,
            CredentialFormat::MsoMdoc => &self.mdoc,
        }
    }

    async fn verified(&self, raw: &str) -> Result<Arc<DecodedCredential>, CodecError> {
        let key = SHA256::content_key(raw.as_bytes())?;
        if let Some(decoded) = self.cache.lock().await.get(&key) {
            return Ok(decoded.clone());
        }

        for format in PARSE_ORDER {
            match self.codec(format).verify(raw).await {
                Ok(decoded) => {
                    let decoded = Arc::new(decoded);
                    self.cache.lock().await.insert(key, decoded.clone());
                    return Ok(decoded);
                }
                Err(error) => {
                    tracing::debug!(%format, %error, "credential codec did not accept input");
                }
            }
        }

        Err(CodecError::AllParsingsFailed)
    }

    fn display(
        &self,
        decoded: &DecodedCredential,
        issuer_display: Option<IssuerDisplay>,
    ) -> CredentialDisplay {
        if let Some(type_metadata) = &decoded.type_metadata {
            if let Some(display) = self.type_metadata_display(type_metadata) {
                return display;
            }
        }

        if let Some(issuer_display) = issuer_display {
            return CredentialDisplay {
                name: issuer_display.name,
                image: issuer_display.logo,
                type_metadata: decoded.type_metadata.clone(),
            };
        }

        CredentialDisplay {
            name: decoded
                .credential_type
                .clone()
                .unwrap_or(DEFAULT_CREDENTIAL_NAME.to_owned()),
            image: None,
            type_metadata: decoded.type_metadata.clone(),
        }
    }

    fn type_metadata_display(&self, type_metadata: &TypeMetadata) -> Option<CredentialDisplay> {
        let display = type_metadata
            .display
            .iter()
            .find(|display| display.lang.as_deref() == Some(&self.params.display_language))
            .or(type_metadata.display.first());

        let name = display
            .map(|display| display.name.to_owned())
            .or(type_metadata.name.clone())?;

        let image = display
            .and_then(|display| display.rendering.as_ref())
            .and_then(|rendering| rendering.simple.as_ref())
            .and_then(|simple| simple.logo.as_ref())
            .map(|logo| logo.uri.to_owned());

        Some(CredentialDisplay {
            name,
            image,
            type_metadata: Some(type_metadata.to_owned()),
        })
    }
}

#[async_trait]
impl CredentialParserRegistry for CredentialParserRegistryImpl {
    async fn parse(
        &self,
        raw: &str,
        issuer_display: Option<IssuerDisplay>,
    ) -> Result<Arc<ParsedCredential>, CodecError> {
        let decoded = self.verified(raw).await?;

        let now = OffsetDateTime::now_utc();
        let leeway = Duration::seconds(i64::try_from(self.params.leeway).unwrap_or(i64::MAX));

        Ok(Arc::new(ParsedCredential {
            format: decoded.format,
            issuer: decoded.issuer.clone(),
            credential_type: decoded.credential_type.clone(),
            signed_claims: decoded.claims.clone(),
            metadata: CredentialMetadata {
                credential: self.display(&decoded, issuer_display),
            },
            valid_until: decoded.valid_until,
            is_expired: decoded
                .valid_until
                .and_then(|valid_until| valid_until.checked_add(leeway))
                .is_some_and(|valid_until| valid_until < now),
            is_not_yet_valid: decoded
                .valid_from
                .and_then(|valid_from| valid_from.checked_sub(leeway))
                .is_some_and(|valid_from| valid_from > now),
        }))
    }

    async fn invalidate(&self, raw: &str) {
        if let Ok(key) = SHA256::content_key(raw.as_bytes()) {
            self.cache.lock().await.remove(&key);
        }
    }

    async fn clear(&self) {
        self.cache.lock().await.clear();
    }
}
