//! Credential codecs: decoding of SD-JWT VC and ISO mdoc credentials into a canonical claim
//! tree, issuer signature verification and holder-side selective disclosure.

use async_trait::async_trait;

use crate::common_models::credential::CredentialFormat;
use crate::common_models::jwk::EcPublicJwk;
use crate::util::json_path::PathSegment;

use self::error::CodecError;
use self::imp::sdjwt::model::KeyBindingParams;
use self::model::{AuthenticationFn, DecodedCredential, KeySource};

pub mod error;
pub mod imp;
pub mod model;
pub mod registry;

/// Format specific decoding and verification.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait CredentialCodec: Send + Sync {
    fn format(&self) -> CredentialFormat;

    /// Structural decoding only, no signature checks.
    fn decode(&self, raw: &str) -> Result<DecodedCredential, CodecError>;

    /// Decodes and checks the issuer signature and integrity protection.
    async fn verify(&self, raw: &str) -> Result<DecodedCredential, CodecError>;
}

/// Resolves the issuer public key a credential or request object is signed with.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait IssuerKeyResolver: Send + Sync {
    /// Returns the SEC1 encoded public key.
    async fn resolve(&self, source: &KeySource) -> Result<Vec<u8>, CodecError>;
}

/// Holder side selective disclosure.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait CredentialPresenter: Send + Sync {
    /// Key the credential is bound to (`cnf.jwk`), if any.
    fn holder_key(&self, raw: &str) -> Result<Option<EcPublicJwk>, CodecError>;

    /// Discloses exactly what `paths` need and appends the key binding proof if requested.
    async fn prepare_presentation(
        &self,
        raw: &str,
        paths: &[Vec<PathSegment>],
        key_binding: Option<(KeyBindingParams, AuthenticationFn)>,
    ) -> Result<String, CodecError>;
}
