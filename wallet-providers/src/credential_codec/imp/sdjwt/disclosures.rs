use std::collections::{HashMap, HashSet};

use ct_codecs::{Base64UrlSafeNoPadding, Decoder};
use serde_json::Value;

use wallet_crypto::Hasher;

use super::model::{
    DecomposedToken, Disclosure, ARRAY_ELEMENT_MARKER, HASH_ALGORITHM_MARKER,
    SELECTIVE_DISCLOSURE_MARKER,
};
use crate::credential_codec::error::CodecError;
use crate::util::json_path::PathSegment;

pub(crate) fn parse_disclosure(encoded: &str) -> Result<Disclosure, CodecError> {
    let decoded = Base64UrlSafeNoPadding::decode_to_vec(encoded, None)
        .map_err(|e| CodecError::CouldNotExtractCredentials(e.to_string()))?;
    let original_disclosure = String::from_utf8(decoded)
        .map_err(|e| CodecError::CouldNotExtractCredentials(e.to_string()))?;

    let parts: Vec<Value> = serde_json::from_str(&original_disclosure)
        .map_err(|e| CodecError::CouldNotExtractCredentials(e.to_string()))?;

    let (salt, key, value) = match parts.as_slice() {
        [Value::String(salt), Value::String(key), value] => {
            if key == SELECTIVE_DISCLOSURE_MARKER || key == ARRAY_ELEMENT_MARKER {
                return Err(CodecError::CouldNotExtractCredentials(format!(
                    "reserved disclosure key `{key}`"
                )));
            }
            (salt, Some(key.to_owned()), value)
        }
        [Value::String(salt), value] => (salt, None, value),
        _ => {
            return Err(CodecError::CouldNotExtractCredentials(
                "invalid disclosure".to_owned(),
            ))
        }
    };

    Ok(Disclosure {
        salt: salt.to_owned(),
        key,
        value: value.to_owned(),
        original_disclosure,
        base64_encoded_disclosure: encoded.to_owned(),
    })
}

/// Splits `<jwt>~<disclosure>~...~[<kb-jwt>]`.
pub(crate) fn extract_disclosures(token: &str) -> Result<DecomposedToken<'_>, CodecError> {
    let token = token.trim();
    let mut parts = token.split('~');

    let jwt = parts
        .next()
        .filter(|jwt| !jwt.is_empty())
        .ok_or(CodecError::CouldNotExtractCredentials(
            "missing issuer JWT".to_owned(),
        ))?;

    let mut rest: Vec<&str> = parts.collect();
    let key_binding_jwt = match rest.pop() {
        Some(last) if !last.is_empty() => Some(last),
        _ => None,
    };

    let deserialized_disclosures = rest
        .into_iter()
        .filter(|part| !part.is_empty())
        .map(parse_disclosure)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DecomposedToken {
        jwt,
        deserialized_disclosures,
        key_binding_jwt,
    })
}

impl Disclosure {
    pub fn hash(&self, hasher: &dyn Hasher) -> Result<String, CodecError> {
        Ok(hasher.hash_base64(self.base64_encoded_disclosure.as_bytes())?)
    }
}

struct DigestIndex<'a> {
    by_digest: HashMap<String, &'a Disclosure>,
}

impl<'a> DigestIndex<'a> {
    fn new(disclosures: &'a [Disclosure], hasher: &dyn Hasher) -> Result<Self, CodecError> {
        let mut by_digest = HashMap::new();
        for disclosure in disclosures {
            if by_digest.insert(disclosure.hash(hasher)?, disclosure).is_some() {
                return Err(CodecError::DuplicateDigest);
            }
        }
        Ok(Self { by_digest })
    }

    fn get(&self, digest: &Value) -> Option<(&'a Disclosure, String)> {
        let digest = digest.as_str()?;
        self.by_digest
            .get(digest)
            .map(|disclosure| (*disclosure, digest.to_owned()))
    }
}

fn sd_digests(object: &serde_json::Map<String, Value>) -> &[Value] {
    object
        .get(SELECTIVE_DISCLOSURE_MARKER)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn array_element_digest(value: &Value) -> Option<&Value> {
    match value.as_object() {
        Some(object) if object.len() == 1 => object.get(ARRAY_ELEMENT_MARKER),
        _ => None,
    }
}

/// Rebuilds the plain claim tree from the issuer payload and the disclosures.
/// Digests without a matching disclosure are decoys and are dropped.
pub(crate) fn reconstruct_claims(
    payload: &Value,
    disclosures: &[Disclosure],
    hasher: &dyn Hasher,
) -> Result<Value, CodecError> {
    let index = DigestIndex::new(disclosures, hasher)?;
    let mut used = HashSet::new();

    let result = resolve(payload, &index, &mut used)?;

    if used.len() != disclosures.len() {
        return Err(CodecError::UnreferencedDisclosure);
    }

    Ok(result)
}

fn resolve(
    value: &Value,
    index: &DigestIndex,
    used: &mut HashSet<String>,
) -> Result<Value, CodecError> {
    match value {
        Value::Object(object) => {
            let mut result = serde_json::Map::new();

            for (key, value) in object {
                if key == SELECTIVE_DISCLOSURE_MARKER || key == HASH_ALGORITHM_MARKER {
                    continue;
                }
                result.insert(key.to_owned(), resolve(value, index, used)?);
            }

            for digest in sd_digests(object) {
                let Some((disclosure, digest)) = index.get(digest) else {
                    continue;
                };
                let key = disclosure
                    .key
                    .as_ref()
                    .ok_or(CodecError::CouldNotExtractCredentials(
                        "array element disclosure referenced from object".to_owned(),
                    ))?;
                if !used.insert(digest) {
                    return Err(CodecError::DuplicateDigest);
                }
                if result.contains_key(key) {
                    return Err(CodecError::CouldNotExtractCredentials(format!(
                        "disclosed claim `{key}` already present"
                    )));
                }
                result.insert(key.to_owned(), resolve(&disclosure.value, index, used)?);
            }

            Ok(Value::Object(result))
        }
        Value::Array(items) => {
            let mut result = vec![];

            for item in items {
                match array_element_digest(item) {
                    Some(digest) => {
                        let Some((disclosure, digest)) = index.get(digest) else {
                            continue;
                        };
                        if disclosure.key.is_some() {
                            return Err(CodecError::CouldNotExtractCredentials(
                                "object property disclosure referenced from array".to_owned(),
                            ));
                        }
                        if !used.insert(digest) {
                            return Err(CodecError::DuplicateDigest);
                        }
                        result.push(resolve(&disclosure.value, index, used)?);
                    }
                    None => result.push(resolve(item, index, used)?),
                }
            }

            Ok(Value::Array(result))
        }
        other => Ok(other.to_owned()),
    }
}

/// Disclosures needed to reveal every path: the disclosures along each path plus everything
/// nested below its end. Returned in their original order.
pub(crate) fn select_disclosures<'a>(
    payload: &Value,
    disclosures: &'a [Disclosure],
    hasher: &dyn Hasher,
    paths: &[Vec<PathSegment>],
) -> Result<Vec<&'a Disclosure>, CodecError> {
    let index = DigestIndex::new(disclosures, hasher)?;
    let mut selected = HashSet::new();

    for path in paths {
        select_along_path(payload, path, &index, &mut selected);
    }

    disclosures
        .iter()
        .filter_map(|disclosure| match disclosure.hash(hasher) {
            Ok(digest) => selected.contains(&digest).then_some(Ok(disclosure)),
            Err(e) => Some(Err(e)),
        })
        .collect()
}

fn select_along_path(
    value: &Value,
    path: &[PathSegment],
    index: &DigestIndex,
    selected: &mut HashSet<String>,
) {
    let Some((segment, rest)) = path.split_first() else {
        select_subtree(value, index, selected);
        return;
    };

    match (segment, value) {
        (PathSegment::Key(key), Value::Object(object)) => {
            if let Some(child) = object.get(key) {
                select_along_path(child, rest, index, selected);
                return;
            }
            for digest in sd_digests(object) {
                if let Some((disclosure, digest)) = index.get(digest) {
                    if disclosure.key.as_deref() == Some(key.as_str()) {
                        selected.insert(digest);
                        select_along_path(&disclosure.value, rest, index, selected);
                    }
                }
            }
        }
        (PathSegment::Wildcard, Value::Object(object)) => {
            for (key, child) in object {
                if key != SELECTIVE_DISCLOSURE_MARKER && key != HASH_ALGORITHM_MARKER {
                    select_along_path(child, rest, index, selected);
                }
            }
            for digest in sd_digests(object) {
                if let Some((disclosure, digest)) = index.get(digest) {
                    selected.insert(digest);
                    select_along_path(&disclosure.value, rest, index, selected);
                }
            }
        }
        (PathSegment::Index(position), Value::Array(items)) => {
            // positions refer to the disclosed array, decoys excluded
            if let Some(item) = visible_items(items, index).into_iter().nth(*position) {
                select_array_item(item, rest, index, selected);
            }
        }
        (PathSegment::Wildcard, Value::Array(items)) => {
            for item in visible_items(items, index) {
                select_array_item(item, rest, index, selected);
            }
        }
        _ => {}
    }
}

enum ArrayItem<'a, 'b> {
    Plain(&'a Value),
    Disclosed(&'b Disclosure, String),
}

fn visible_items<'a, 'b>(items: &'a [Value], index: &DigestIndex<'b>) -> Vec<ArrayItem<'a, 'b>> {
    items
        .iter()
        .filter_map(|item| match array_element_digest(item) {
            Some(digest) => index
                .get(digest)
                .map(|(disclosure, digest)| ArrayItem::Disclosed(disclosure, digest)),
            None => Some(ArrayItem::Plain(item)),
        })
        .collect()
}

fn select_array_item(
    item: ArrayItem,
    rest: &[PathSegment],
    index: &DigestIndex,
    selected: &mut HashSet<String>,
) {
    match item {
        ArrayItem::Plain(value) => select_along_path(value, rest, index, selected),
        ArrayItem::Disclosed(disclosure, digest) => {
            selected.insert(digest);
            select_along_path(&disclosure.value, rest, index, selected);
        }
    }
}

fn select_subtree(value: &Value, index: &DigestIndex, selected: &mut HashSet<String>) {
    if value.is_object() || value.is_array() {
        select_along_path(value, &[PathSegment::Wildcard], index, selected);
    }
}
