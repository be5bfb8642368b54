//! SD-JWT VC implementation.

use std::sync::Arc;

use async_trait::async_trait;
use ct_codecs::{Base64UrlSafeNoPadding, Decoder};
use time::OffsetDateTime;

use wallet_crypto::{CryptoProvider, Hasher};

use self::disclosures::{extract_disclosures, reconstruct_claims, select_disclosures};
use self::model::{
    KeyBindingParams, KeyBindingPayload, SdJwtVcClaims, DEFAULT_HASH_ALGORITHM,
    KEY_BINDING_JWT_TYPE, SD_JWT_VC_TYPES,
};
use super::jwt::model::{JWTHeader, JWTPayload};
use super::jwt::Jwt;
use crate::common_models::credential::CredentialFormat;
use crate::credential_codec::error::CodecError;
use crate::credential_codec::model::{AuthenticationFn, DecodedCredential, TypeMetadata};
use crate::common_models::jwk::EcPublicJwk;
use crate::credential_codec::{CredentialCodec, CredentialPresenter, IssuerKeyResolver};
use crate::util::json_path::PathSegment;
use crate::util::key_verification::KeyVerification;

pub mod disclosures;
pub mod model;


pub struct SDJWTCodec {
    crypto: Arc<dyn CryptoProvider>,
    key_resolver: Arc<dyn IssuerKeyResolver>,
}

#[async_trait]
impl CredentialCodec for SDJWTCodec {
    fn format(&self) -> CredentialFormat {
        CredentialFormat::SdJwt
    }

    fn decode(&self, raw: &str) -> Result<DecodedCredential, CodecError> {
        self.decode_internal(raw)
    }

    async fn verify(&self, raw: &str) -> Result<DecodedCredential, CodecError> {
        let decomposed = extract_disclosures(raw)?;

        let verification = KeyVerification {
            key_resolver: self.key_resolver.clone(),
            crypto: self.crypto.clone(),
        };
        Jwt::<SdJwtVcClaims>::build_from_token(decomposed.jwt, Some(Box::new(verification)))
            .await?;

        self.decode_internal(raw)
    }
}

#[async_trait]
impl CredentialPresenter for SDJWTCodec {
    fn holder_key(&self, raw: &str) -> Result<Option<EcPublicJwk>, CodecError> {
        Ok(self.decode_internal(raw)?.holder_key)
    }

    async fn prepare_presentation(
        &self,
        raw: &str,
        paths: &[Vec<PathSegment>],
        key_binding: Option<(KeyBindingParams, AuthenticationFn)>,
    ) -> Result<String, CodecError> {
        self.present(raw, paths, key_binding).await
    }
}

impl SDJWTCodec {
    pub fn new(crypto: Arc<dyn CryptoProvider>, key_resolver: Arc<dyn IssuerKeyResolver>) -> Self {
        Self {
            crypto,
            key_resolver,
        }
    }

    fn hasher(&self, algorithm: Option<&str>) -> Result<Arc<dyn Hasher>, CodecError> {
        let algorithm = algorithm.unwrap_or(DEFAULT_HASH_ALGORITHM);
        if algorithm != DEFAULT_HASH_ALGORITHM {
            return Err(CodecError::UnsupportedHashAlgorithm(algorithm.to_owned()));
        }
        Ok(self.crypto.get_hasher(algorithm)?)
    }

    fn decode_internal(&self, raw: &str) -> Result<DecodedCredential, CodecError> {
        let decomposed = extract_disclosures(raw)?;
        let token = Jwt::<SdJwtVcClaims>::decompose_token(decomposed.jwt)?;

        if let Some(typ) = &token.header.signature_type {
            if !SD_JWT_VC_TYPES.contains(&typ.as_str()) {
                return Err(CodecError::CouldNotExtractCredentials(format!(
                    "unexpected token type `{typ}`"
                )));
            }
        }

        let hasher = self.hasher(token.payload.custom.hash_alg.as_deref())?;

        let payload: serde_json::Value = serde_json::from_str(&token.payload_json)
            .map_err(|e| CodecError::JsonMapping(e.to_string()))?;
        let claims = reconstruct_claims(&payload, &decomposed.deserialized_disclosures, &*hasher)?;

        let vct = token.payload.custom.vct;
        let type_metadata = match &token.header.vctm {
            Some(vctm) => select_type_metadata(vctm, vct.as_deref())?,
            None => None,
        };

        Ok(DecodedCredential {
            format: CredentialFormat::SdJwt,
            issuer: token.payload.issuer,
            credential_type: vct,
            claims,
            issued_at: token.payload.issued_at,
            valid_from: token.payload.invalid_before,
            valid_until: token.payload.expires_at,
            type_metadata,
            holder_key: token.payload.custom.cnf.map(|cnf| cnf.jwk),
        })
    }

    /// Keeps only the disclosures needed for `paths` and appends a key binding JWT when
    /// requested. The issuer signed part is passed through untouched.
    async fn present(
        &self,
        raw: &str,
        paths: &[Vec<PathSegment>],
        key_binding: Option<(KeyBindingParams, AuthenticationFn)>,
    ) -> Result<String, CodecError> {
        let decomposed = extract_disclosures(raw)?;
        let token = Jwt::<SdJwtVcClaims>::decompose_token(decomposed.jwt)?;
        let hasher = self.hasher(token.payload.custom.hash_alg.as_deref())?;

        let payload: serde_json::Value = serde_json::from_str(&token.payload_json)
            .map_err(|e| CodecError::JsonMapping(e.to_string()))?;

        let selected =
            select_disclosures(&payload, &decomposed.deserialized_disclosures, &*hasher, paths)?;

        let mut presentation = decomposed.jwt.to_owned();
        for disclosure in selected {
            presentation.push('~');
            presentation.push_str(&disclosure.base64_encoded_disclosure);
        }
        presentation.push('~');

        if let Some((params, auth_fn)) = key_binding {
            let sd_hash = hasher.hash_base64(presentation.as_bytes())?;

            let jwt = Jwt::new(
                JWTHeader::new(KEY_BINDING_JWT_TYPE, "ES256"),
                JWTPayload {
                    issued_at: Some(OffsetDateTime::now_utc()),
                    audience: Some(params.audience),
                    nonce: Some(params.nonce),
                    custom: KeyBindingPayload { sd_hash },
                    ..Default::default()
                },
            );
            presentation.push_str(&jwt.tokenize(auth_fn).await?);
        }

        Ok(presentation)
    }
}

fn select_type_metadata(
    vctm: &[String],
    vct: Option<&str>,
) -> Result<Option<TypeMetadata>, CodecError> {
    let documents = vctm
        .iter()
        .map(|encoded| {
            let decoded = Base64UrlSafeNoPadding::decode_to_vec(encoded, None)
                .map_err(|e| CodecError::CouldNotExtractCredentials(e.to_string()))?;
            serde_json::from_slice::<TypeMetadata>(&decoded)
                .map_err(|e| CodecError::JsonMapping(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let matching = documents
        .iter()
        .position(|document| Some(document.vct.as_str()) == vct)
        .unwrap_or(0);

    Ok(documents.into_iter().nth(matching))
}
