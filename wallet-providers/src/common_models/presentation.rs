use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Audit trail entry written for every presentation sent to a verifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationRecord {
    pub presentation_identifier: String,
    pub client_id: String,
    pub verifier_domain: String,
    pub credential_identifiers: Vec<String>,
    pub vp_token: serde_json::Value,
    pub presentation_submission: serde_json::Value,
    #[serde(with = "time::serde::timestamp")]
    pub presentation_time: OffsetDateTime,
}
