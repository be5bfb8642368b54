use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use wallet_crypto::imp::encryption::generate_key;
use wallet_crypto::imp::signer::es256::ES256Signer;
use wallet_crypto::imp::utilities::generate_random_seed_32;
use wallet_crypto::CryptoProvider;

use super::container::{
    decode, open_legacy, password_method, prf_method, unwrap_with_password, unwrap_with_prf,
    ContainerV2, EncryptedContainer, MainKey, UnlockMethod,
};
use super::error::{KeystoreError, SyncError};
use super::model::{HolderKey, HolderKeyRef, KeystoreParams, PrivateData};
use super::session_guard::SessionGuard;
use super::sync::PrivateDataSync;
use super::webauthn::{prf_output, PrfClient, PrfCredential};
use super::HolderKeystore;
use crate::common_models::credential::StorableCredential;
use crate::common_models::jwk::EcPrivateJwk;
use crate::common_models::presentation::PresentationRecord;


/// Re-encrypted container produced while unlocking an older scheme.
///
/// Upload it with [`EncryptedKeystore::update_private_data`] and only then pass the
/// returned ETag to [`EncryptedKeystore::commit_upgrade`].
#[derive(Clone, Debug)]
pub struct ContainerUpgrade {
    pub container: EncryptedContainer,
}

struct Unlocked {
    main_key: MainKey,
    unlock_methods: Vec<UnlockMethod>,
    data: PrivateData,
}

#[derive(Default)]
struct KeystoreState {
    container: Option<EncryptedContainer>,
    etag: Option<String>,
    unlocked: Option<Unlocked>,
}

pub struct EncryptedKeystore {
    crypto: Arc<dyn CryptoProvider>,
    sync: Arc<dyn PrivateDataSync>,
    guard: SessionGuard,
    params: KeystoreParams,
    state: Mutex<KeystoreState>,
}

impl EncryptedKeystore {
    pub fn new(
        crypto: Arc<dyn CryptoProvider>,
        sync: Arc<dyn PrivateDataSync>,
        guard: SessionGuard,
        params: KeystoreParams,
    ) -> Self {
        Self {
            crypto,
            sync,
            guard,
            params,
            state: Mutex::new(KeystoreState::default()),
        }
    }

    /// Sets the container and ETag last seen on the backend. Clears any unlocked state.
    pub async fn load(&self, container: EncryptedContainer, etag: Option<String>) {
        let mut state = self.state.lock().await;
        state.container = Some(container);
        state.etag = etag;
        state.unlocked = None;
    }

    pub async fn container(&self) -> Option<(EncryptedContainer, Option<String>)> {
        let state = self.state.lock().await;
        state
            .container
            .clone()
            .map(|container| (container, state.etag.clone()))
    }

    pub async fn is_unlocked(&self) -> bool {
        self.state.lock().await.unlocked.is_some()
    }

    /// Creates and uploads an empty container protected by `password`.
    pub async fn initialize(&self, password: &str) -> Result<(), KeystoreError> {
        self.guard.claim().await;
        let mut state = self.state.lock().await;
        if state.container.is_some() {
            return Err(KeystoreError::AlreadyInitialized);
        }

        let main_key = generate_key();
        let unlock_methods = vec![password_method(
            password,
            self.params.pbkdf2_iterations,
            &main_key,
        )?];
        let data = PrivateData::default();
        let container =
            EncryptedContainer::V2(ContainerV2::seal(&main_key, unlock_methods.clone(), &data)?);

        let etag = self.upload(&container, None).await?;

        state.container = Some(container);
        state.etag = Some(etag);
        state.unlocked = Some(Unlocked {
            main_key,
            unlock_methods,
            data,
        });
        tracing::info!("private data container initialized");
        Ok(())
    }

    pub async fn unlock_with_password(
        &self,
        password: &str,
    ) -> Result<Option<ContainerUpgrade>, KeystoreError> {
        let mut state = self.state.lock().await;
        let container = state.container.clone().ok_or(KeystoreError::NotInitialized)?;

        let (unlocked, upgrade) = match container {
            EncryptedContainer::V1(legacy) => {
                let data = open_legacy(&legacy, password)?;
                let main_key = generate_key();
                let unlock_methods = vec![password_method(
                    password,
                    self.params.pbkdf2_iterations,
                    &main_key,
                )?];
                let upgraded = ContainerV2::seal(&main_key, unlock_methods.clone(), &data)?;

                tracing::info!("legacy private data container needs upgrade");
                (
                    Unlocked {
                        main_key,
                        unlock_methods,
                        data,
                    },
                    Some(ContainerUpgrade {
                        container: EncryptedContainer::V2(upgraded),
                    }),
                )
            }
            EncryptedContainer::V2(container) => {
                let method = container
                    .password_method()
                    .ok_or(KeystoreError::InvalidPassword)?;
                let main_key = unwrap_with_password(method, password)?;
                let data = container.open(&main_key)?;
                (
                    Unlocked {
                        main_key,
                        unlock_methods: container.unlock_methods,
                        data,
                    },
                    None,
                )
            }
        };

        self.guard.claim().await;
        state.unlocked = Some(unlocked);
        Ok(upgrade)
    }

    pub async fn unlock_with_prf(
        &self,
        client: &dyn PrfClient,
    ) -> Result<Option<ContainerUpgrade>, KeystoreError> {
        let mut state = self.state.lock().await;
        let Some(EncryptedContainer::V2(container)) = state.container.clone() else {
            return Err(if state.container.is_none() {
                KeystoreError::NotInitialized
            } else {
                KeystoreError::NoPrfKey
            });
        };

        let credentials = container
            .unlock_methods
            .iter()
            .filter_map(|method| match method {
                UnlockMethod::Prf {
                    credential_id,
                    prf_salt,
                    ..
                } => Some(decode(prf_salt).map(|salt| PrfCredential {
                    credential_id: credential_id.to_owned(),
                    salt,
                })),
                UnlockMethod::Password { .. } => None,
            })
            .collect::<Result<Vec<_>, _>>()?;
        if credentials.is_empty() {
            return Err(KeystoreError::NoPrfKey);
        }

        let first = client
            .authenticate(credentials.clone())
            .await
            .map_err(KeystoreError::Authenticator)?;
        let (credential_id, output) = prf_output(client, first, credentials).await?;

        let position = container
            .unlock_methods
            .iter()
            .position(|method| {
                matches!(method, UnlockMethod::Prf { credential_id: id, .. } if *id == credential_id)
            })
            .ok_or(KeystoreError::UnknownPrfCredential(credential_id.clone()))?;

        let main_key = unwrap_with_prf(&container.unlock_methods[position], &output)?;
        let data = container.open(&main_key)?;

        let mut unlock_methods = container.unlock_methods;
        let raw_output_salt = match &unlock_methods[position] {
            UnlockMethod::Prf {
                prf_salt,
                hkdf: None,
                ..
            } => Some(decode(prf_salt)?),
            _ => None,
        };

        let mut upgrade = None;
        if let Some(prf_salt) = raw_output_salt {
            unlock_methods[position] = prf_method(
                credential_id,
                &prf_salt,
                &output,
                &self.params.prf_key_info,
                &main_key,
            )?;
            upgrade = Some(ContainerUpgrade {
                container: EncryptedContainer::V2(ContainerV2::seal(
                    &main_key,
                    unlock_methods.clone(),
                    &data,
                )?),
            });
            tracing::info!("passkey wrapping needs upgrade");
        }

        self.guard.claim().await;
        state.unlocked = Some(Unlocked {
            main_key,
            unlock_methods,
            data,
        });
        Ok(upgrade)
    }

    /// Uploads `container` under the current ETag without touching local state.
    pub async fn update_private_data(
        &self,
        container: &EncryptedContainer,
    ) -> Result<String, KeystoreError> {
        let etag = self.state.lock().await.etag.clone();
        self.upload(container, etag).await
    }

    pub async fn commit_upgrade(&self, upgrade: ContainerUpgrade, etag: String) {
        let mut state = self.state.lock().await;
        state.container = Some(upgrade.container);
        state.etag = Some(etag);
    }

    /// Registers a passkey as additional unlock method.
    pub async fn add_prf_key(&self, client: &dyn PrfClient) -> Result<String, KeystoreError> {
        self.ensure_active().await?;

        let prf_salt = generate_random_seed_32().to_vec();
        let registration = client
            .register(prf_salt.clone())
            .await
            .map_err(KeystoreError::Authenticator)?;
        let retry = vec![PrfCredential {
            credential_id: registration.credential_id.to_owned(),
            salt: prf_salt.clone(),
        }];
        let (credential_id, output) = prf_output(client, registration, retry).await?;

        let mut state = self.state.lock().await;
        let unlocked = state.unlocked.as_ref().ok_or(KeystoreError::Locked)?;

        let mut unlock_methods = unlocked.unlock_methods.clone();
        unlock_methods.retain(
            |method| !matches!(method, UnlockMethod::Prf { credential_id: id, .. } if *id == credential_id),
        );
        unlock_methods.push(prf_method(
            credential_id.clone(),
            &prf_salt,
            &output,
            &self.params.prf_key_info,
            &unlocked.main_key,
        )?);

        let data = unlocked.data.clone();
        self.persist(&mut state, unlock_methods, data).await?;
        tracing::info!("passkey added");
        Ok(credential_id)
    }

    pub async fn lock(&self) {
        self.state.lock().await.unlocked = None;
    }

    /// Reloads the remote container after a conflict. The unlocked state survives when the
    /// main key still opens the new container, otherwise the keystore locks.
    pub async fn fetch_latest(&self) -> Result<bool, KeystoreError> {
        let Some(remote) = self.sync.fetch_private_data().await? else {
            return Ok(false);
        };
        let container = EncryptedContainer::from_json(&remote.container)?;

        let mut state = self.state.lock().await;
        let reopened = match (&container, state.unlocked.take()) {
            (EncryptedContainer::V2(v2), Some(unlocked)) => match v2.open(&unlocked.main_key) {
                Ok(data) => Some(Unlocked {
                    main_key: unlocked.main_key,
                    unlock_methods: v2.unlock_methods.clone(),
                    data,
                }),
                Err(_) => None,
            },
            _ => None,
        };

        tracing::debug!(relocked = reopened.is_none(), "reloaded private data");
        state.container = Some(container);
        state.etag = Some(remote.etag);
        state.unlocked = reopened;
        Ok(true)
    }

    pub async fn issuance_flows(&self) -> Result<Option<serde_json::Value>, KeystoreError> {
        let state = self.state.lock().await;
        let unlocked = state.unlocked.as_ref().ok_or(KeystoreError::Locked)?;
        Ok(unlocked.data.issuance_flows.clone())
    }

    pub async fn store_issuance_flows(&self, snapshot: serde_json::Value) -> Result<(), KeystoreError> {
        self.mutate(|data| {
            data.issuance_flows = Some(snapshot);
            Ok(())
        })
        .await
    }

    pub async fn presentations(&self) -> Result<Vec<PresentationRecord>, KeystoreError> {
        let state = self.state.lock().await;
        let unlocked = state.unlocked.as_ref().ok_or(KeystoreError::Locked)?;
        Ok(unlocked.data.presentations.clone())
    }

    async fn ensure_active(&self) -> Result<(), KeystoreError> {
        if self.guard.is_active().await {
            return Ok(());
        }

        tracing::warn!("session claimed by another instance, locking");
        self.lock().await;
        Err(KeystoreError::SessionSuperseded)
    }

    async fn mutate<F>(&self, apply: F) -> Result<(), KeystoreError>
    where
        F: FnOnce(&mut PrivateData) -> Result<(), KeystoreError> + Send,
    {
        self.ensure_active().await?;

        let mut state = self.state.lock().await;
        let unlocked = state.unlocked.as_ref().ok_or(KeystoreError::Locked)?;

        let mut data = unlocked.data.clone();
        apply(&mut data)?;

        let unlock_methods = unlocked.unlock_methods.clone();
        self.persist(&mut state, unlock_methods, data).await
    }

    /// Seals, uploads and, only after the upload succeeded, adopts the new state.
    async fn persist(
        &self,
        state: &mut KeystoreState,
        unlock_methods: Vec<UnlockMethod>,
        data: PrivateData,
    ) -> Result<(), KeystoreError> {
        let unlocked = state.unlocked.as_mut().ok_or(KeystoreError::Locked)?;
        let container = EncryptedContainer::V2(ContainerV2::seal(
            &unlocked.main_key,
            unlock_methods.clone(),
            &data,
        )?);

        let etag = self.upload(&container, state.etag.clone()).await?;

        unlocked.unlock_methods = unlock_methods;
        unlocked.data = data;
        state.container = Some(container);
        state.etag = Some(etag);
        Ok(())
    }

    async fn upload(
        &self,
        container: &EncryptedContainer,
        if_match: Option<String>,
    ) -> Result<String, KeystoreError> {
        match self
            .sync
            .update_private_data(container.to_json()?, if_match)
            .await
        {
            Ok(etag) => Ok(etag),
            Err(SyncError::PreconditionFailed { .. }) => Err(KeystoreError::ETagConflict),
            Err(error) => Err(error.into()),
        }
    }
}

#[async_trait]
impl HolderKeystore for EncryptedKeystore {
    async fn generate_holder_keys(&self, count: usize) -> Result<Vec<HolderKeyRef>, KeystoreError> {
        let keys = (0..count)
            .map(|_| {
                let (private_key, _) = ES256Signer::random();
                let private_jwk = EcPrivateJwk::from_secret_bytes(&private_key)?;
                Ok(HolderKey {
                    key_id: private_jwk.public().thumbprint()?,
                    private_jwk,
                    created: OffsetDateTime::now_utc(),
                })
            })
            .collect::<Result<Vec<_>, KeystoreError>>()?;

        let refs = keys.iter().map(HolderKeyRef::from).collect();
        self.mutate(|data| {
            data.holder_keys.extend(keys);
            Ok(())
        })
        .await?;

        Ok(refs)
    }

    async fn sign(&self, key_id: &str, message: &[u8]) -> Result<Vec<u8>, KeystoreError> {
        self.ensure_active().await?;

        let state = self.state.lock().await;
        let unlocked = state.unlocked.as_ref().ok_or(KeystoreError::Locked)?;
        let key = unlocked
            .data
            .holder_keys
            .iter()
            .find(|key| key.key_id == key_id)
            .ok_or(KeystoreError::KeyNotFound(key_id.to_owned()))?;

        let private_key = key.private_jwk.secret_bytes()?;
        let public_key = key.private_jwk.public().to_sec1()?;

        Ok(self
            .crypto
            .get_signer("ES256")
            .map_err(wallet_crypto::SignerError::from)?
            .sign(message, &public_key, &private_key)?)
    }

    async fn add_credentials(
        &self,
        credentials: Vec<StorableCredential>,
    ) -> Result<(), KeystoreError> {
        self.mutate(|data| {
            for credential in &credentials {
                if data.credentials.iter().any(|stored| {
                    stored.credential_identifier == credential.credential_identifier
                }) {
                    return Err(KeystoreError::DuplicateCredential(
                        credential.credential_identifier.to_owned(),
                    ));
                }
            }
            data.credentials.extend(credentials);
            Ok(())
        })
        .await
    }

    async fn credentials(&self) -> Result<Vec<StorableCredential>, KeystoreError> {
        let state = self.state.lock().await;
        let unlocked = state.unlocked.as_ref().ok_or(KeystoreError::Locked)?;
        Ok(unlocked.data.credentials.clone())
    }

    async fn record_presentation(&self, record: PresentationRecord) -> Result<(), KeystoreError> {
        self.mutate(|data| {
            for credential in data.credentials.iter_mut().filter(|credential| {
                record
                    .credential_identifiers
                    .contains(&credential.credential_identifier)
            }) {
                credential.sig_count += 1;
            }
            data.presentations.push(record);
            Ok(())
        })
        .await
    }
}
