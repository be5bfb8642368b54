use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_with::json::JsonString;
use serde_with::serde_as;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenID4VPParams {
    #[serde(default)]
    pub allow_insecure_http_transport: bool,
    /// Ask the trust probe to corroborate signed requests against the live verifier.
    #[serde(default)]
    pub corroborate_verifier_tls: bool,
}

/// Query parameters of an authorization request URL.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OpenID4VPAuthorizationRequestQueryParams {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_id_scheme: Option<String>,
    #[serde(default)]
    pub response_type: Option<String>,
    #[serde(default)]
    pub response_mode: Option<String>,
    #[serde(default)]
    pub response_uri: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// JSON encoded presentation definition.
    #[serde(default)]
    pub presentation_definition: Option<String>,
    #[serde(default)]
    pub presentation_definition_uri: Option<String>,
    #[serde(default)]
    pub request_uri: Option<String>,
}

/// Claims of a signed request object fetched from `request_uri`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct OpenID4VPRequestObjectClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id_scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_definition: Option<OpenID4VPPresentationDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_definition_uri: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OpenID4VPPresentationDefinition {
    pub id: String,
    pub input_descriptors: Vec<OpenID4VPPresentationDefinitionInputDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OpenID4VPPresentationDefinitionInputDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    /// Keyed by format identifier (`vc+sd-jwt`, `dc+sd-jwt`, `mso_mdoc`).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub format: HashMap<String, serde_json::Value>,
    pub constraints: OpenID4VPPresentationDefinitionConstraint,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OpenID4VPPresentationDefinitionConstraint {
    pub fields: Vec<OpenID4VPPresentationDefinitionConstraintField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_disclosure: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OpenID4VPPresentationDefinitionConstraintField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_to_retain: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PresentationSubmissionMappingDTO {
    pub id: String,
    pub definition_id: String,
    pub descriptor_map: Vec<PresentationSubmissionDescriptorDTO>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PresentationSubmissionDescriptorDTO {
    pub id: String,
    pub format: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_nested: Option<NestedPresentationSubmissionDescriptorDTO>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NestedPresentationSubmissionDescriptorDTO {
    pub format: String,
    pub path: String,
}

#[serde_as]
#[derive(Clone, Debug, Serialize)]
pub struct OpenID4VPDirectPostRequestDTO {
    pub vp_token: String,
    #[serde_as(as = "JsonString")]
    pub presentation_submission: PresentationSubmissionMappingDTO,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct OpenID4VPDirectPostResponseDTO {
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

/// The request being answered. Lives in the single presentation slot.
#[derive(Clone, Debug, PartialEq)]
pub struct PresentationFlowState {
    pub presentation_definition: OpenID4VPPresentationDefinition,
    pub nonce: String,
    pub response_uri: String,
    pub client_id: String,
    pub state: Option<String>,
    pub verifier_domain: String,
}

/// Candidates for one input descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConformantCredentials {
    pub credentials: Vec<String>,
    pub requested_fields: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequestResult {
    pub conformant_credentials_map: HashMap<String, ConformantCredentials>,
    pub verifier_domain_name: String,
}

/// Input descriptor id to the chosen credential identifier.
pub type SelectionMap = HashMap<String, String>;
