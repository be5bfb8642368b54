use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use wallet_crypto::SignerError;

use crate::common_models::credential::CredentialFormat;
use crate::common_models::jwk::EcPublicJwk;

pub type AuthenticationFn = Box<dyn SignatureProvider>;
pub type VerificationFn = Box<dyn TokenVerifier>;

/// Where the key that signed a token can be found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeySource {
    /// DER certificates, leaf first (`x5c` header or COSE `x5chain`).
    CertificateChain(Vec<Vec<u8>>),
    /// Issuer published JWKS (`/.well-known/jwt-vc-issuer`).
    Issuer {
        issuer: String,
        key_id: Option<String>,
    },
}

/// Method for verifying a token signature.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify<'a>(
        &self,
        key_source: KeySource,
        algorithm: &'a str,
        token: &'a [u8],
        signature: &'a [u8],
    ) -> Result<(), SignerError>;
}

/// Method for signing with a private key without exposing it.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait SignatureProvider: Send + Sync {
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError>;
    fn get_key_id(&self) -> Option<String>;
    fn get_public_key(&self) -> Vec<u8>;
}

#[async_trait]
impl<T: SignatureProvider + ?Sized> SignatureProvider for Arc<T> {
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        self.as_ref().sign(message).await
    }

    fn get_key_id(&self) -> Option<String> {
        self.as_ref().get_key_id()
    }

    fn get_public_key(&self) -> Vec<u8> {
        self.as_ref().get_public_key()
    }
}

/// Credential type metadata carried in the SD-JWT `vctm` header.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeMetadata {
    pub vct: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub display: Vec<TypeMetadataDisplay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeMetadataDisplay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendering: Option<TypeMetadataRendering>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeMetadataRendering {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simple: Option<SimpleRendering>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimpleRendering {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<RenderingLogo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderingLogo {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

/// Canonical, format independent view of a credential.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedCredential {
    pub format: CredentialFormat,
    pub issuer: Option<String>,
    /// `vct` for SD-JWT VC, `docType` for mdoc.
    pub credential_type: Option<String>,
    pub claims: serde_json::Value,
    pub issued_at: Option<OffsetDateTime>,
    pub valid_from: Option<OffsetDateTime>,
    pub valid_until: Option<OffsetDateTime>,
    pub type_metadata: Option<TypeMetadata>,
    pub holder_key: Option<EcPublicJwk>,
}

/// Display hints advertised by the issuer for the credential configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerDisplay {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDisplay {
    pub name: String,
    pub image: Option<String>,
    #[serde(rename = "TypeMetadata", skip_serializing_if = "Option::is_none")]
    pub type_metadata: Option<TypeMetadata>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CredentialMetadata {
    pub credential: CredentialDisplay,
}

/// Result of [`crate::credential_codec::registry::CredentialParserRegistry::parse`]. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCredential {
    pub format: CredentialFormat,
    pub issuer: Option<String>,
    pub credential_type: Option<String>,
    pub signed_claims: serde_json::Value,
    pub metadata: CredentialMetadata,
    #[serde(with = "time::serde::timestamp::option")]
    pub valid_until: Option<OffsetDateTime>,
    pub is_expired: bool,
    pub is_not_yet_valid: bool,
}
