use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use wallet_crypto::imp::password::DEFAULT_PBKDF2_ITERATIONS;

use crate::common_models::credential::StorableCredential;
use crate::common_models::jwk::{EcPrivateJwk, EcPublicJwk};
use crate::common_models::presentation::PresentationRecord;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystoreParams {
    pub pbkdf2_iterations: u32,
    /// HKDF `info` used when deriving wrapping keys from PRF outputs.
    pub prf_key_info: String,
}

impl Default for KeystoreParams {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            prf_key_info: "wallet-main-key-wrap".to_owned(),
        }
    }
}

/// Decrypted content of the private data container.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateData {
    #[serde(default)]
    pub holder_keys: Vec<HolderKey>,
    #[serde(default)]
    pub credentials: Vec<StorableCredential>,
    #[serde(default)]
    pub presentations: Vec<PresentationRecord>,
    /// Serialized issuance flow repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuance_flows: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderKey {
    pub key_id: String,
    pub private_jwk: EcPrivateJwk,
    #[serde(with = "time::serde::timestamp")]
    pub created: OffsetDateTime,
}

/// Public handle of a holder key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HolderKeyRef {
    pub key_id: String,
    pub public_jwk: EcPublicJwk,
}

impl From<&HolderKey> for HolderKeyRef {
    fn from(key: &HolderKey) -> Self {
        Self {
            key_id: key.key_id.to_owned(),
            public_jwk: key.private_jwk.public(),
        }
    }
}
