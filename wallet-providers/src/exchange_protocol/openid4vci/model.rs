use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::common_models::credential::{CredentialFormat, StorableCredential};
use crate::credential_codec::model::IssuerDisplay;

fn default_true() -> bool {
    true
}

fn default_remember_issuer_for_seconds() -> u64 {
    86_400
}

fn default_batch_size() -> usize {
    1
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenID4VCIParams {
    pub client_id: String,
    pub redirect_uri: String,
    /// The only issuer this client accepts offers from.
    pub credential_issuer: String,
    #[serde(default = "default_remember_issuer_for_seconds")]
    pub remember_issuer_for_seconds: u64,
    /// Upper bound of credential instances requested per issuance.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub allow_insecure_http_transport: bool,
    #[serde(default = "default_true")]
    pub use_par: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct OpenID4VCICredentialOfferDTO {
    pub credential_issuer: String,
    pub credential_configuration_ids: Vec<String>,
    #[serde(default)]
    pub grants: OpenID4VCIGrants,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct OpenID4VCIGrants {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<OpenID4VCIAuthorizationCodeGrant>,
    #[serde(
        rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pre_authorized_code: Option<OpenID4VCIPreAuthorizedCodeGrant>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct OpenID4VCIAuthorizationCodeGrant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct OpenID4VCIPreAuthorizedCodeGrant {
    #[serde(rename = "pre-authorized_code")]
    pub pre_authorized_code: String,
    #[serde(default)]
    pub user_pin_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_code: Option<OpenID4VCITxCode>,
}

impl OpenID4VCIPreAuthorizedCodeGrant {
    pub fn requires_tx_code(&self) -> bool {
        self.user_pin_required || self.tx_code.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct OpenID4VCITxCode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpenID4VCIIssuerMetadataResponseDTO {
    pub credential_issuer: String,
    pub credential_endpoint: String,
    #[serde(default)]
    pub authorization_servers: Vec<String>,
    #[serde(default)]
    pub nonce_endpoint: Option<String>,
    #[serde(default)]
    pub batch_credential_issuance: Option<OpenID4VCIBatchCredentialIssuance>,
    #[serde(default)]
    pub credential_configurations_supported:
        HashMap<String, OpenID4VCICredentialConfigurationDTO>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpenID4VCIBatchCredentialIssuance {
    pub batch_size: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpenID4VCICredentialConfigurationDTO {
    pub format: CredentialFormat,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub vct: Option<String>,
    #[serde(default)]
    pub doctype: Option<String>,
    #[serde(default)]
    pub display: Vec<OpenID4VCICredentialDisplayDTO>,
}

impl OpenID4VCICredentialConfigurationDTO {
    pub fn issuer_display(&self) -> Option<IssuerDisplay> {
        self.display.first().map(|display| IssuerDisplay {
            name: display.name.to_owned(),
            logo: display.logo.as_ref().map(|logo| logo.uri.to_owned()),
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpenID4VCICredentialDisplayDTO {
    pub name: String,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub logo: Option<OpenID4VCILogoDTO>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpenID4VCILogoDTO {
    pub uri: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpenID4VCIDiscoveryResponseDTO {
    pub issuer: String,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: String,
    #[serde(default)]
    pub pushed_authorization_request_endpoint: Option<String>,
    #[serde(default)]
    pub authorization_challenge_endpoint: Option<String>,
    #[serde(default)]
    pub dpop_signing_alg_values_supported: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "grant_type")]
pub enum OpenID4VCITokenRequestDTO {
    #[serde(rename = "authorization_code")]
    AuthorizationCode {
        code: String,
        code_verifier: String,
        redirect_uri: String,
        client_id: String,
    },
    #[serde(rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code")]
    PreAuthorizedCode {
        #[serde(rename = "pre-authorized_code")]
        pre_authorized_code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tx_code: Option<String>,
    },
    #[serde(rename = "refresh_token")]
    RefreshToken {
        refresh_token: String,
        client_id: String,
    },
}

impl OpenID4VCITokenRequestDTO {
    pub fn is_pre_authorized_code(&self) -> bool {
        matches!(self, Self::PreAuthorizedCode { .. })
    }

    pub fn is_refresh_token(&self) -> bool {
        matches!(self, Self::RefreshToken { .. })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpenID4VCITokenResponseDTO {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub c_nonce: Option<String>,
    #[serde(default)]
    pub c_nonce_expires_in: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OpenID4VCIErrorResponseDTO {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct OpenID4VCIParRequestDTO {
    pub client_id: String,
    pub response_type: &'static str,
    pub redirect_uri: String,
    pub state: String,
    pub code_challenge: String,
    pub code_challenge_method: &'static str,
    /// JSON encoded `authorization_details`.
    pub authorization_details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpenID4VCIParResponseDTO {
    pub request_uri: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// First-party authorization, the code is returned without a browser redirect.
#[derive(Clone, Debug, Serialize)]
pub struct OpenID4VCIAuthorizationChallengeRequestDTO {
    pub client_id: String,
    pub state: String,
    pub code_challenge: String,
    pub code_challenge_method: &'static str,
    pub authorization_details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpenID4VCIAuthorizationChallengeResponseDTO {
    pub authorization_code: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct OpenID4VCIAuthorizationDetailDTO {
    pub r#type: &'static str,
    pub credential_configuration_id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpenID4VCINonceResponseDTO {
    pub c_nonce: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OpenID4VCICredentialRequestDTO {
    pub credential_configuration_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<OpenID4VCIProofRequestDTO>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proofs: Option<OpenID4VCIProofsRequestDTO>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OpenID4VCIProofRequestDTO {
    pub proof_type: &'static str,
    pub jwt: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OpenID4VCIProofsRequestDTO {
    pub jwt: Vec<String>,
}

impl OpenID4VCICredentialRequestDTO {
    /// Single proofs go into `proof`, batches into `proofs`.
    pub fn new(credential_configuration_id: String, mut proofs: Vec<String>) -> Self {
        if proofs.len() == 1 {
            Self {
                credential_configuration_id,
                proof: proofs.pop().map(|jwt| OpenID4VCIProofRequestDTO {
                    proof_type: "jwt",
                    jwt,
                }),
                proofs: None,
            }
        } else {
            Self {
                credential_configuration_id,
                proof: None,
                proofs: Some(OpenID4VCIProofsRequestDTO { jwt: proofs }),
            }
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpenID4VCICredentialResponseDTO {
    #[serde(default)]
    pub credentials: Vec<OpenID4VCICredentialInstanceDTO>,
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub c_nonce: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpenID4VCICredentialInstanceDTO {
    pub credential: String,
}

impl OpenID4VCICredentialResponseDTO {
    pub fn into_credentials(self) -> Vec<String> {
        let mut credentials: Vec<String> = self
            .credentials
            .into_iter()
            .map(|instance| instance.credential)
            .collect();
        credentials.extend(self.credential);
        credentials
    }
}

/// Outcome of [`super::OpenID4VCIClient::handle_credential_offer`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialOfferResult {
    pub credential_issuer: String,
    pub selected_credential_configuration_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
    #[serde(skip)]
    pub pre_authorized_code: Option<OpenID4VCIPreAuthorizedCodeGrant>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AuthorizationRequestResult {
    /// The user agent has to be sent to `url`.
    Redirect { url: String },
    /// Issuance completed without user interaction.
    Issued(IssuanceResult),
}

#[derive(Clone, Debug, PartialEq)]
pub struct IssuanceResult {
    pub batch_id: Uuid,
    pub credentials: Vec<StorableCredential>,
}

/// Tokens held by a flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_nonce: Option<String>,
    #[serde(with = "time::serde::timestamp")]
    pub expiration_timestamp: OffsetDateTime,
    #[serde(
        default,
        with = "time::serde::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub c_nonce_expiration_timestamp: Option<OffsetDateTime>,
}

impl TokenState {
    pub fn from_response(response: OpenID4VCITokenResponseDTO, now: OffsetDateTime) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            c_nonce: response.c_nonce,
            expiration_timestamp: now + time::Duration::seconds(response.expires_in),
            c_nonce_expiration_timestamp: response
                .c_nonce_expires_in
                .map(|expires_in| now + time::Duration::seconds(expires_in)),
        }
    }

    pub fn is_access_token_valid(&self, now: OffsetDateTime) -> bool {
        self.expiration_timestamp > now
    }

    /// `c_nonce` if it has not expired.
    pub fn valid_c_nonce(&self, now: OffsetDateTime) -> Option<String> {
        match self.c_nonce_expiration_timestamp {
            Some(expiration) if expiration <= now => None,
            _ => self.c_nonce.to_owned(),
        }
    }
}
