use ciborium::Value;

use crate::credential_codec::error::CodecError;

pub(super) const TAG_ENCODED_CBOR: u64 = 24;
pub(super) const TAG_COSE_SIGN1: u64 = 18;
pub(super) const COSE_HEADER_ALG: i128 = 1;
pub(super) const COSE_HEADER_X5CHAIN: i128 = 33;
pub(super) const COSE_ALG_ES256: i128 = -7;

/// `COSE_Sign1` as carried in `issuerAuth`.
#[derive(Debug, Clone)]
pub struct CoseSign1 {
    pub protected: Vec<u8>,
    pub unprotected: Vec<(Value, Value)>,
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

/// One disclosed data element together with the exact bytes its digest was computed over.
#[derive(Debug, Clone)]
pub struct IssuerSignedItem {
    pub namespace: String,
    pub digest_id: i128,
    pub element_identifier: String,
    pub element_value: Value,
    pub tagged_bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MobileSecurityObject {
    pub digest_algorithm: String,
    pub doc_type: String,
    pub value_digests: Vec<(Value, Value)>,
    pub device_key: Option<Vec<(Value, Value)>>,
    pub signed: Option<String>,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IssuerSigned {
    pub items: Vec<IssuerSignedItem>,
    pub issuer_auth: CoseSign1,
    pub mso: MobileSecurityObject,
}

pub(super) fn cbor_error(error: impl std::fmt::Display) -> CodecError {
    CodecError::Cbor(error.to_string())
}

pub(super) fn map_get<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}

pub(super) fn map_get_int(map: &[(Value, Value)], key: i128) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| k.as_integer().map(i128::from) == Some(key))
        .map(|(_, v)| v)
}

pub(super) fn require<'a>(
    map: &'a [(Value, Value)],
    key: &str,
) -> Result<&'a Value, CodecError> {
    map_get(map, key).ok_or_else(|| CodecError::Cbor(format!("missing `{key}`")))
}

pub(super) fn as_map(value: &Value) -> Result<&[(Value, Value)], CodecError> {
    value
        .as_map()
        .map(Vec::as_slice)
        .ok_or_else(|| cbor_error("expected map"))
}

pub(super) fn as_text(value: &Value) -> Result<&str, CodecError> {
    untag(value)
        .as_text()
        .ok_or_else(|| cbor_error("expected text"))
}

pub(super) fn untag(value: &Value) -> &Value {
    match value {
        Value::Tag(_, inner) => untag(inner),
        other => other,
    }
}

pub(super) fn decode_cbor(bytes: &[u8]) -> Result<Value, CodecError> {
    ciborium::de::from_reader(bytes).map_err(cbor_error)
}

pub(super) fn encode_cbor(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut buffer = vec![];
    ciborium::ser::into_writer(value, &mut buffer).map_err(cbor_error)?;
    Ok(buffer)
}

/// Unwraps `#6.24(bstr .cbor T)`.
pub(super) fn decode_embedded(value: &Value) -> Result<Value, CodecError> {
    match value {
        Value::Tag(TAG_ENCODED_CBOR, inner) => match inner.as_ref() {
            Value::Bytes(bytes) => decode_cbor(bytes),
            _ => Err(cbor_error("embedded CBOR is not a byte string")),
        },
        _ => Err(cbor_error("expected embedded CBOR")),
    }
}

/// JSON projection of a CBOR element value. Byte strings become base64url text, tagged
/// dates become their text form.
pub(super) fn cbor_to_json(value: &Value) -> Result<serde_json::Value, CodecError> {
    use ct_codecs::{Base64UrlSafeNoPadding, Encoder};

    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(value) => serde_json::Value::Bool(*value),
        Value::Integer(value) => {
            let value = i128::from(*value);
            match i64::try_from(value) {
                Ok(value) => serde_json::Value::from(value),
                Err(_) => serde_json::Value::String(value.to_string()),
            }
        }
        Value::Float(value) => serde_json::Number::from_f64(*value)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(value) => serde_json::Value::String(value.to_owned()),
        Value::Bytes(value) => serde_json::Value::String(
            Base64UrlSafeNoPadding::encode_to_string(value).map_err(cbor_error)?,
        ),
        Value::Tag(_, inner) => cbor_to_json(inner)?,
        Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(cbor_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Map(entries) => {
            let mut object = serde_json::Map::new();
            for (key, value) in entries {
                let key = match untag(key) {
                    Value::Text(text) => text.to_owned(),
                    Value::Integer(integer) => i128::from(*integer).to_string(),
                    _ => return Err(cbor_error("unsupported map key")),
                };
                object.insert(key, cbor_to_json(value)?);
            }
            serde_json::Value::Object(object)
        }
        _ => return Err(cbor_error("unsupported CBOR value")),
    })
}
