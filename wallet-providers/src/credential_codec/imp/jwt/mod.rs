use std::fmt::Debug;

use async_trait::async_trait;
use ct_codecs::{Base64UrlSafeNoPadding, Decoder};
use serde::{de::DeserializeOwned, Serialize};

use wallet_crypto::SignerError;

use self::mapper::{bin_to_b64url_string, json_from_decoded, string_to_b64url_string};
use self::model::{DecomposedToken, JWTHeader, JWTPayload};
use crate::credential_codec::error::CodecError;
use crate::credential_codec::model::{AuthenticationFn, KeySource, TokenVerifier};
use crate::util::x509::decode_x5c;


pub mod mapper;
pub mod model;

#[async_trait]
impl TokenVerifier for Box<dyn TokenVerifier> {
    async fn verify<'a>(
        &self,
        key_source: KeySource,
        algorithm: &'a str,
        token: &'a [u8],
        signature: &'a [u8],
    ) -> Result<(), SignerError> {
        self.as_ref()
            .verify(key_source, algorithm, token, signature)
            .await
    }
}

#[derive(Debug)]
pub struct Jwt<Payload: Serialize + DeserializeOwned + Debug> {
    pub header: JWTHeader,
    pub payload: JWTPayload<Payload>,
}

impl<Payload: Serialize + DeserializeOwned + Debug> Jwt<Payload> {
    pub fn new(header: JWTHeader, payload: JWTPayload<Payload>) -> Jwt<Payload> {
        Jwt { header, payload }
    }

    pub async fn build_from_token(
        token: &str,
        verification: Option<Box<dyn TokenVerifier>>,
    ) -> Result<Jwt<Payload>, CodecError> {
        let DecomposedToken {
            header,
            payload,
            signature,
            unverified_jwt,
            ..
        } = Jwt::decompose_token(token)?;

        if let Some(verification) = verification {
            let key_source = key_source(&header, payload.issuer.as_deref())?;

            verification
                .verify(
                    key_source,
                    &header.algorithm,
                    unverified_jwt.as_bytes(),
                    &signature,
                )
                .await
                .map_err(|e| CodecError::CouldNotVerify(e.to_string()))?;
        }

        Ok(Jwt { header, payload })
    }

    pub async fn tokenize(&self, auth_fn: AuthenticationFn) -> Result<String, CodecError> {
        let jwt_header_json = serde_json::to_string(&self.header)
            .map_err(|e| CodecError::CouldNotFormat(e.to_string()))?;
        let payload_json = serde_json::to_string(&self.payload)
            .map_err(|e| CodecError::CouldNotFormat(e.to_string()))?;
        let mut token = format!(
            "{}.{}",
            string_to_b64url_string(&jwt_header_json)?,
            string_to_b64url_string(&payload_json)?,
        );

        let signature = auth_fn
            .sign(token.as_bytes())
            .await
            .map_err(|e| CodecError::CouldNotSign(e.to_string()))?;

        if !signature.is_empty() {
            let signature_encoded = bin_to_b64url_string(&signature)?;

            token.push('.');
            token.push_str(&signature_encoded);
        }

        Ok(token)
    }

    pub fn decompose_token(token: &str) -> Result<DecomposedToken<Payload>, CodecError> {
        let token = token.trim_matches(|c: char| c == '.' || c.is_whitespace());
        let mut jwt_parts = token.splitn(3, '.');

        let (Some(header), Some(payload), Some(signature)) =
            (jwt_parts.next(), jwt_parts.next(), jwt_parts.next())
        else {
            return Err(CodecError::CouldNotExtractCredentials(
                "Missing token part".to_owned(),
            ));
        };

        let header_decoded = Base64UrlSafeNoPadding::decode_to_vec(header, None)
            .map_err(|e| CodecError::CouldNotExtractCredentials(e.to_string()))?;

        let parsed_header: JWTHeader = serde_json::from_slice(&header_decoded)
            .map_err(|e| CodecError::CouldNotExtractCredentials(e.to_string()))?;

        let payload_decoded = Base64UrlSafeNoPadding::decode_to_vec(payload, None)
            .map_err(|e| CodecError::CouldNotExtractCredentials(e.to_string()))?;

        let parsed_payload: JWTPayload<Payload> = serde_json::from_slice(&payload_decoded)
            .map_err(|e| CodecError::CouldNotExtractCredentials(e.to_string()))?;

        let signature_decoded = Base64UrlSafeNoPadding::decode_to_vec(signature, None)
            .map_err(|e| CodecError::CouldNotExtractCredentials(e.to_string()))?;

        Ok(DecomposedToken {
            header: parsed_header,
            header_json: json_from_decoded(header_decoded)?,
            payload: parsed_payload,
            payload_json: json_from_decoded(payload_decoded)?,
            signature: signature_decoded,
            unverified_jwt: format!("{header}.{payload}"),
        })
    }
}

/// `x5c` takes precedence over issuer metadata lookup.
pub(crate) fn key_source(header: &JWTHeader, issuer: Option<&str>) -> Result<KeySource, CodecError> {
    if let Some(x5c) = &header.x5c {
        return Ok(KeySource::CertificateChain(decode_x5c(x5c)?));
    }

    let issuer = issuer.ok_or(CodecError::MissingIssuer)?;
    Ok(KeySource::Issuer {
        issuer: issuer.to_owned(),
        key_id: header.key_id.to_owned(),
    })
}
