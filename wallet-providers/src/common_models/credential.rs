use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Credential formats the wallet can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum CredentialFormat {
    #[serde(rename = "vc+sd-jwt", alias = "dc+sd-jwt")]
    #[strum(to_string = "vc+sd-jwt", serialize = "dc+sd-jwt")]
    SdJwt,
    #[serde(rename = "mso_mdoc")]
    #[strum(serialize = "mso_mdoc")]
    MsoMdoc,
}

/// A credential as persisted by the wallet. Entries are only ever appended; a batch
/// issuance appends `N` instances sharing one `batch_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorableCredential {
    pub credential_identifier: String,
    /// Raw compact form as received from the issuer.
    pub credential: String,
    pub format: CredentialFormat,
    pub credential_configuration_id: String,
    pub credential_issuer_identifier: String,
    pub sig_count: u64,
    pub instance_id: u32,
    pub batch_id: Uuid,
}

impl StorableCredential {
    pub fn is_same_batch(&self, other: &StorableCredential) -> bool {
        self.batch_id == other.batch_id
    }
}
