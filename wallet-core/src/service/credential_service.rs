use std::sync::Arc;

use serde::Serialize;

use wallet_providers::common_models::credential::StorableCredential;
use wallet_providers::common_models::presentation::PresentationRecord;
use wallet_providers::credential_codec::model::ParsedCredential;
use wallet_providers::credential_codec::registry::CredentialParserRegistry;
use wallet_providers::keystore::HolderKeystore;

use crate::service::error::ServiceError;
use crate::session::Session;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialListItem {
    pub credential_identifier: String,
    pub credential_configuration_id: String,
    pub credential_issuer_identifier: String,
    pub batch_id: String,
    pub parsed: ParsedCredential,
}

pub struct CredentialService {
    registry: Arc<dyn CredentialParserRegistry>,
}

impl CredentialService {
    pub fn new(registry: Arc<dyn CredentialParserRegistry>) -> Self {
        Self { registry }
    }

    /// One entry per batch, the instance used least often standing in for its siblings.
    /// Credentials that no longer parse are left out.
    pub async fn get_credential_list(
        &self,
        session: &Session,
    ) -> Result<Vec<CredentialListItem>, ServiceError> {
        let credentials = session.keystore().credentials().await?;

        let mut items = Vec::new();
        for credential in representatives(credentials) {
            match self.registry.parse(&credential.credential, None).await {
                Ok(parsed) => items.push(CredentialListItem {
                    credential_identifier: credential.credential_identifier,
                    credential_configuration_id: credential.credential_configuration_id,
                    credential_issuer_identifier: credential.credential_issuer_identifier,
                    batch_id: credential.batch_id.to_string(),
                    parsed: parsed.as_ref().clone(),
                }),
                Err(error) => {
                    tracing::warn!(
                        credential = credential.credential_identifier,
                        "skipping unparsable credential: {error}"
                    );
                }
            }
        }

        Ok(items)
    }

    pub async fn get_presentation_history(
        &self,
        session: &Session,
    ) -> Result<Vec<PresentationRecord>, ServiceError> {
        let mut presentations = session.keystore().presentations().await?;
        presentations.sort_by(|a, b| b.presentation_time.cmp(&a.presentation_time));
        Ok(presentations)
    }
}

fn representatives(credentials: Vec<StorableCredential>) -> Vec<StorableCredential> {
    let mut batches: Vec<StorableCredential> = Vec::new();
    for credential in credentials {
        match batches
            .iter_mut()
            .find(|current| current.is_same_batch(&credential))
        {
            Some(current) => {
                if (credential.sig_count, credential.instance_id)
                    < (current.sig_count, current.instance_id)
                {
                    *current = credential;
                }
            }
            None => batches.push(credential),
        }
    }
    batches
}
