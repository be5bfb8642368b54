//! WebAuthn PRF extension access.

use std::collections::HashMap;

use async_trait::async_trait;
use ct_codecs::{Base64UrlSafeNoPadding, Encoder};
use serde::Serialize;
use zeroize::Zeroizing;

use super::error::KeystoreError;

#[cfg(test)]
mod test;

/// PRF result reported by the authenticator for one ceremony.
#[derive(Clone, Debug)]
pub enum PrfOutcome {
    Output(Zeroizing<Vec<u8>>),
    /// The authenticator does not implement the extension.
    Unsupported,
    /// The extension is supported but produced no output, e.g. during registration.
    Missing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrfCredential {
    pub credential_id: String,
    pub salt: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct PrfAssertion {
    pub credential_id: String,
    pub outcome: PrfOutcome,
}

/// Runs WebAuthn ceremonies with the PRF extension on behalf of the keystore.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait PrfClient: Send + Sync {
    /// `navigator.credentials.create` with `extensions.prf.eval.first = salt`.
    async fn register(&self, salt: Vec<u8>) -> Result<PrfAssertion, anyhow::Error>;

    /// `navigator.credentials.get` restricted to `credentials`, each evaluated with its salt.
    async fn authenticate(
        &self,
        credentials: Vec<PrfCredential>,
    ) -> Result<PrfAssertion, anyhow::Error>;
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PrfValues {
    pub first: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrfExtensionInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval: Option<PrfValues>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub eval_by_credential: HashMap<String, PrfValues>,
}

impl PrfExtensionInput {
    /// `{eval: {first: salt}}` for registration.
    pub fn registration(salt: &[u8]) -> Result<Self, KeystoreError> {
        Ok(Self {
            eval: Some(PrfValues {
                first: encode_salt(salt)?,
            }),
            eval_by_credential: HashMap::new(),
        })
    }

    pub fn authentication(credentials: &[PrfCredential]) -> Result<Self, KeystoreError> {
        Ok(Self {
            eval: None,
            eval_by_credential: credentials
                .iter()
                .map(|credential| {
                    Ok((
                        credential.credential_id.to_owned(),
                        PrfValues {
                            first: encode_salt(&credential.salt)?,
                        },
                    ))
                })
                .collect::<Result<_, KeystoreError>>()?,
        })
    }
}

fn encode_salt(salt: &[u8]) -> Result<String, KeystoreError> {
    Base64UrlSafeNoPadding::encode_to_string(salt)
        .map_err(|e| KeystoreError::MalformedContainer(e.to_string()))
}

/// Runs `first` and, when the authenticator produced no output, retries exactly once with
/// an assertion over `retry_credentials`.
pub(crate) async fn prf_output(
    client: &dyn PrfClient,
    first: PrfAssertion,
    retry_credentials: Vec<PrfCredential>,
) -> Result<(String, Zeroizing<Vec<u8>>), KeystoreError> {
    match first.outcome {
        PrfOutcome::Output(output) => return Ok((first.credential_id, output)),
        PrfOutcome::Unsupported => return Err(KeystoreError::PrfNotSupported),
        PrfOutcome::Missing => {}
    }

    tracing::debug!("authenticator returned no PRF output, retrying once");
    let retry = client
        .authenticate(retry_credentials)
        .await
        .map_err(KeystoreError::Authenticator)?;

    match retry.outcome {
        PrfOutcome::Output(output) => Ok((retry.credential_id, output)),
        PrfOutcome::Unsupported => Err(KeystoreError::PrfNotSupported),
        PrfOutcome::Missing => Err(KeystoreError::PrfRetryFailed),
    }
}
