//! ISO/IEC 18013-5 mdoc (`mso_mdoc`) support.
//!
//! Credentials are stored as base64url encoded `IssuerSigned` structures. Verification
//! checks the `issuerAuth` COSE_Sign1 signature with the key from the `x5chain` header and
//! every disclosed element against the digests in the mobile security object.

use std::sync::Arc;

use async_trait::async_trait;
use ciborium::Value;
use ct_codecs::{Base64UrlSafeNoPadding, Decoder};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use wallet_crypto::CryptoProvider;

use self::model::{
    as_map, as_text, cbor_error, cbor_to_json, decode_cbor, decode_embedded, encode_cbor,
    map_get, map_get_int, require, CoseSign1, IssuerSigned, IssuerSignedItem,
    MobileSecurityObject, COSE_ALG_ES256, COSE_HEADER_ALG, COSE_HEADER_X5CHAIN,
    TAG_COSE_SIGN1, TAG_ENCODED_CBOR,
};
use crate::common_models::credential::CredentialFormat;
use crate::common_models::jwk::EcPublicJwk;
use crate::credential_codec::error::CodecError;
use crate::credential_codec::model::{DecodedCredential, KeySource};
use crate::credential_codec::{CredentialCodec, IssuerKeyResolver};

pub mod model;


pub struct MdocCodec {
    crypto: Arc<dyn CryptoProvider>,
    key_resolver: Arc<dyn IssuerKeyResolver>,
}

#[async_trait]
impl CredentialCodec for MdocCodec {
    fn format(&self) -> CredentialFormat {
        CredentialFormat::MsoMdoc
    }

    fn decode(&self, raw: &str) -> Result<DecodedCredential, CodecError> {
        to_decoded_credential(&parse_issuer_signed(raw)?)
    }

    async fn verify(&self, raw: &str) -> Result<DecodedCredential, CodecError> {
        let issuer_signed = parse_issuer_signed(raw)?;
        let cose = &issuer_signed.issuer_auth;

        let protected = if cose.protected.is_empty() {
            vec![]
        } else {
            as_map(&decode_cbor(&cose.protected)?)?.to_vec()
        };

        let algorithm = map_get_int(&protected, COSE_HEADER_ALG)
            .and_then(Value::as_integer)
            .map(i128::from);
        if algorithm != Some(COSE_ALG_ES256) {
            return Err(CodecError::UnsupportedAlgorithm(format!("{algorithm:?}")));
        }

        let x5chain = map_get_int(&cose.unprotected, COSE_HEADER_X5CHAIN)
            .or_else(|| map_get_int(&protected, COSE_HEADER_X5CHAIN))
            .ok_or(CodecError::KeyResolution("missing x5chain".to_owned()))?;
        let chain = match x5chain {
            Value::Bytes(der) => vec![der.to_owned()],
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_bytes()
                        .cloned()
                        .ok_or_else(|| cbor_error("x5chain entry is not a byte string"))
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(cbor_error("invalid x5chain")),
        };

        let public_key = self
            .key_resolver
            .resolve(&KeySource::CertificateChain(chain))
            .await?;

        let sig_structure = encode_cbor(&Value::Array(vec![
            Value::Text("Signature1".to_owned()),
            Value::Bytes(cose.protected.to_owned()),
            Value::Bytes(vec![]),
            Value::Bytes(cose.payload.to_owned()),
        ]))?;

        self.crypto
            .get_signer("ES256")?
            .verify(&sig_structure, &cose.signature, &public_key)
            .map_err(|e| CodecError::CouldNotVerify(e.to_string()))?;

        self.verify_digests(&issuer_signed)?;

        to_decoded_credential(&issuer_signed)
    }
}

impl MdocCodec {
    pub fn new(crypto: Arc<dyn CryptoProvider>, key_resolver: Arc<dyn IssuerKeyResolver>) -> Self {
        Self {
            crypto,
            key_resolver,
        }
    }

    fn verify_digests(&self, issuer_signed: &IssuerSigned) -> Result<(), CodecError> {
        let mso = &issuer_signed.mso;
        if mso.digest_algorithm != "SHA-256" {
            return Err(CodecError::UnsupportedHashAlgorithm(
                mso.digest_algorithm.to_owned(),
            ));
        }
        let hasher = self.crypto.get_hasher("sha-256")?;

        for item in &issuer_signed.items {
            let namespace_digests = map_get(&mso.value_digests, &item.namespace)
                .map(as_map)
                .transpose()?
                .ok_or_else(|| CodecError::DigestMismatch(item.namespace.to_owned()))?;

            let expected = map_get_int(namespace_digests, item.digest_id)
                .and_then(Value::as_bytes)
                .ok_or_else(|| CodecError::DigestMismatch(item.element_identifier.to_owned()))?;

            if hasher.hash(&item.tagged_bytes)? != *expected {
                return Err(CodecError::DigestMismatch(
                    item.element_identifier.to_owned(),
                ));
            }
        }

        Ok(())
    }
}

fn parse_cose_sign1(value: &Value) -> Result<CoseSign1, CodecError> {
    let value = match value {
        Value::Tag(TAG_COSE_SIGN1, inner) => inner.as_ref(),
        other => other,
    };

    let parts = value
        .as_array()
        .ok_or_else(|| cbor_error("issuerAuth is not an array"))?;
    let [protected, unprotected, payload, signature] = parts.as_slice() else {
        return Err(cbor_error("issuerAuth must have four elements"));
    };

    let bytes = |value: &Value, name: &str| {
        value
            .as_bytes()
            .cloned()
            .ok_or_else(|| CodecError::Cbor(format!("{name} is not a byte string")))
    };

    Ok(CoseSign1 {
        protected: bytes(protected, "protected header")?,
        unprotected: as_map(unprotected)?.to_vec(),
        payload: bytes(payload, "payload")?,
        signature: bytes(signature, "signature")?,
    })
}

fn parse_mso(payload: &[u8]) -> Result<MobileSecurityObject, CodecError> {
    let mso = decode_embedded(&decode_cbor(payload)?)?;
    let mso = as_map(&mso)?;

    let validity = as_map(require(mso, "validityInfo")?)?;
    let optional_text = |key: &str| -> Result<Option<String>, CodecError> {
        map_get(validity, key)
            .map(|value| as_text(value).map(ToOwned::to_owned))
            .transpose()
    };

    Ok(MobileSecurityObject {
        digest_algorithm: as_text(require(mso, "digestAlgorithm")?)?.to_owned(),
        doc_type: as_text(require(mso, "docType")?)?.to_owned(),
        value_digests: as_map(require(mso, "valueDigests")?)?.to_vec(),
        device_key: map_get(mso, "deviceKeyInfo")
            .and_then(Value::as_map)
            .and_then(|info| map_get(info, "deviceKey"))
            .and_then(Value::as_map)
            .cloned(),
        signed: optional_text("signed")?,
        valid_from: optional_text("validFrom")?,
        valid_until: optional_text("validUntil")?,
    })
}

fn parse_item(namespace: &str, value: &Value) -> Result<IssuerSignedItem, CodecError> {
    let tagged_bytes = encode_cbor(value)?;
    if !matches!(value, Value::Tag(TAG_ENCODED_CBOR, _)) {
        return Err(cbor_error("issuer signed item is not embedded CBOR"));
    }

    let item = decode_embedded(value)?;
    let item = as_map(&item)?;

    Ok(IssuerSignedItem {
        namespace: namespace.to_owned(),
        digest_id: require(item, "digestID")?
            .as_integer()
            .map(i128::from)
            .ok_or_else(|| cbor_error("digestID is not an integer"))?,
        element_identifier: as_text(require(item, "elementIdentifier")?)?.to_owned(),
        element_value: require(item, "elementValue")?.to_owned(),
        tagged_bytes,
    })
}

pub(crate) fn parse_issuer_signed(raw: &str) -> Result<IssuerSigned, CodecError> {
    let bytes = Base64UrlSafeNoPadding::decode_to_vec(raw.trim().trim_end_matches('='), None)
        .map_err(|e| CodecError::CouldNotExtractCredentials(e.to_string()))?;
    let issuer_signed = decode_cbor(&bytes)?;
    let issuer_signed = as_map(&issuer_signed)?;

    let issuer_auth = parse_cose_sign1(require(issuer_signed, "issuerAuth")?)?;
    let mso = parse_mso(&issuer_auth.payload)?;

    let mut items = vec![];
    if let Some(namespaces) = map_get(issuer_signed, "nameSpaces") {
        for (namespace, elements) in as_map(namespaces)? {
            let namespace = as_text(namespace)?;
            let elements = elements
                .as_array()
                .ok_or_else(|| cbor_error("namespace elements are not an array"))?;
            for element in elements {
                items.push(parse_item(namespace, element)?);
            }
        }
    }

    Ok(IssuerSigned {
        items,
        issuer_auth,
        mso,
    })
}

fn parse_date(value: &Option<String>) -> Result<Option<OffsetDateTime>, CodecError> {
    value
        .as_deref()
        .map(|value| {
            OffsetDateTime::parse(value, &Rfc3339)
                .map_err(|e| CodecError::CouldNotExtractCredentials(e.to_string()))
        })
        .transpose()
}

fn device_key_jwk(device_key: &[(Value, Value)]) -> Option<EcPublicJwk> {
    // COSE_Key: 1 kty (2 = EC2), -1 crv (1 = P-256), -2 x, -3 y
    let x = map_get_int(device_key, -2).and_then(Value::as_bytes)?;
    let y = map_get_int(device_key, -3).and_then(Value::as_bytes)?;

    let mut sec1 = vec![0x04];
    sec1.extend_from_slice(x);
    sec1.extend_from_slice(y);
    EcPublicJwk::from_sec1(&sec1).ok()
}

fn to_decoded_credential(issuer_signed: &IssuerSigned) -> Result<DecodedCredential, CodecError> {
    let mut claims = serde_json::Map::new();
    for item in &issuer_signed.items {
        let namespace = claims
            .entry(item.namespace.to_owned())
            .or_insert_with(|| serde_json::Value::Object(Default::default()));
        if let serde_json::Value::Object(namespace) = namespace {
            namespace.insert(
                item.element_identifier.to_owned(),
                cbor_to_json(&item.element_value)?,
            );
        }
    }

    let mso = &issuer_signed.mso;
    Ok(DecodedCredential {
        format: CredentialFormat::MsoMdoc,
        issuer: None,
        credential_type: Some(mso.doc_type.to_owned()),
        claims: serde_json::Value::Object(claims),
        issued_at: parse_date(&mso.signed)?,
        valid_from: parse_date(&mso.valid_from)?,
        valid_until: parse_date(&mso.valid_until)?,
        type_metadata: None,
        holder_key: mso.device_key.as_deref().and_then(device_key_jwk),
    })
}
