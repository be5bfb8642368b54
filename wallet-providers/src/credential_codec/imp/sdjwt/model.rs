use serde::{Deserialize, Serialize};

use crate::common_models::jwk::EcPublicJwk;

pub(crate) const SELECTIVE_DISCLOSURE_MARKER: &str = "_sd";
pub(crate) const HASH_ALGORITHM_MARKER: &str = "_sd_alg";
pub(crate) const ARRAY_ELEMENT_MARKER: &str = "...";
pub(crate) const DEFAULT_HASH_ALGORITHM: &str = "sha-256";

pub const SD_JWT_VC_TYPES: [&str; 2] = ["vc+sd-jwt", "dc+sd-jwt"];
pub const KEY_BINDING_JWT_TYPE: &str = "kb+jwt";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Disclosure {
    pub salt: String,
    /// `None` for array element disclosures.
    pub key: Option<String>,
    pub value: serde_json::Value,
    pub original_disclosure: String,
    pub base64_encoded_disclosure: String,
}

pub struct DecomposedToken<'a> {
    pub jwt: &'a str,
    pub deserialized_disclosures: Vec<Disclosure>,
    pub key_binding_jwt: Option<&'a str>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SdJwtVcClaims {
    #[serde(rename = "_sd_alg", default, skip_serializing_if = "Option::is_none")]
    pub hash_alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vct: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnf: Option<Confirmation>,
    #[serde(flatten)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Confirmation {
    pub jwk: EcPublicJwk,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct KeyBindingPayload {
    pub sd_hash: String,
}

/// Holder key binding requested by a verifier.
#[derive(Clone, Debug)]
pub struct KeyBindingParams {
    pub audience: String,
    pub nonce: String,
}
