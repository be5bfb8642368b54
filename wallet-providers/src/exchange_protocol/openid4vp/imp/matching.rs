//! Matching of held credentials against a presentation definition input descriptor.

use std::sync::Arc;

use itertools::Itertools;
use serde_json::Value;

use crate::common_models::credential::{CredentialFormat, StorableCredential};
use crate::credential_codec::model::ParsedCredential;
use crate::exchange_protocol::openid4vp::error::OpenID4VPError;
use crate::exchange_protocol::openid4vp::model::{
    ConformantCredentials, OpenID4VPPresentationDefinitionConstraintField,
    OpenID4VPPresentationDefinitionInputDescriptor,
};
use crate::util::json_path::{get_claim_name_by_json_path, parse_json_path, select, PathSegment};


const SD_JWT_FORMATS: [&str; 2] = ["vc+sd-jwt", "dc+sd-jwt"];

pub(super) struct Candidate {
    pub credential: StorableCredential,
    pub parsed: Arc<ParsedCredential>,
}

pub(super) fn match_descriptor(
    descriptor: &OpenID4VPPresentationDefinitionInputDescriptor,
    candidates: &[Candidate],
) -> Result<ConformantCredentials, OpenID4VPError> {
    let requested_fields = descriptor
        .constraints
        .fields
        .iter()
        .map(|field| get_claim_name_by_json_path(&field.path))
        .collect::<Result<Vec<_>, _>>()?;

    let mut conforming = vec![];
    for candidate in candidates {
        if is_conformant(descriptor, &candidate.parsed)? {
            conforming.push(&candidate.credential);
        }
    }

    // one instance per batch, the least used one
    let credentials: Vec<String> = conforming
        .into_iter()
        .into_group_map_by(|credential| credential.batch_id)
        .into_values()
        .filter_map(|batch| {
            batch
                .into_iter()
                .min_by_key(|credential| (credential.sig_count, credential.instance_id))
        })
        .map(|credential| credential.credential_identifier.to_owned())
        .sorted()
        .collect();

    if credentials.is_empty() {
        return Err(OpenID4VPError::InsufficientCredentials(
            descriptor.id.to_owned(),
        ));
    }

    Ok(ConformantCredentials {
        credentials,
        requested_fields,
    })
}

pub(super) fn is_conformant(
    descriptor: &OpenID4VPPresentationDefinitionInputDescriptor,
    parsed: &ParsedCredential,
) -> Result<bool, OpenID4VPError> {
    if parsed.format != CredentialFormat::SdJwt
        || parsed.is_expired
        || parsed.is_not_yet_valid
        || !accepts_sd_jwt(descriptor)
    {
        return Ok(false);
    }

    for field in &descriptor.constraints.fields {
        if field.optional.unwrap_or(false) {
            continue;
        }
        if first_matching_path(field, &parsed.signed_claims)?.is_none() {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Claim paths to disclose: the first satisfied alternative of every field.
pub(super) fn disclosure_paths(
    fields: &[OpenID4VPPresentationDefinitionConstraintField],
    claims: &Value,
) -> Result<Vec<Vec<PathSegment>>, OpenID4VPError> {
    let mut paths = vec![];
    for field in fields {
        if let Some(path) = first_matching_path(field, claims)? {
            paths.push(path);
        }
    }
    Ok(paths)
}

fn accepts_sd_jwt(descriptor: &OpenID4VPPresentationDefinitionInputDescriptor) -> bool {
    descriptor.format.is_empty()
        || SD_JWT_FORMATS
            .iter()
            .any(|format| descriptor.format.contains_key(*format))
}

fn first_matching_path(
    field: &OpenID4VPPresentationDefinitionConstraintField,
    claims: &Value,
) -> Result<Option<Vec<PathSegment>>, OpenID4VPError> {
    for path in &field.path {
        let segments = parse_json_path(path)?;
        let satisfied = select(claims, &segments).into_iter().any(|value| {
            field
                .filter
                .as_ref()
                .map_or(true, |filter| matches_filter(value, filter))
        });
        if satisfied {
            return Ok(Some(segments));
        }
    }
    Ok(None)
}

/// JSON schema subset used in field filters: `type`, `const` and `enum`.
fn matches_filter(value: &Value, filter: &Value) -> bool {
    if let Some(expected) = filter.get("const") {
        if value != expected {
            return false;
        }
    }

    if let Some(Value::Array(allowed)) = filter.get("enum") {
        if !allowed.contains(value) {
            return false;
        }
    }

    match filter.get("type").and_then(Value::as_str) {
        None => true,
        Some("string") => value.is_string(),
        Some("number") => value.is_number(),
        Some("integer") => value.is_i64() || value.is_u64(),
        Some("boolean") => value.is_boolean(),
        Some("array") => value.is_array(),
        Some("object") => value.is_object(),
        Some("null") => value.is_null(),
        Some(_) => false,
    }
}
