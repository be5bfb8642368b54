use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tokio::sync::{broadcast, Mutex};
use url::Url;
use uuid::Uuid;

use wallet_crypto::imp::hasher::sha256::SHA256;
use wallet_crypto::imp::utilities::generate_nonce;
use wallet_crypto::Hasher;

use super::error::OpenID4VCIError;
use super::flow_state::{FlowKey, IssuanceFlowRepository, IssuanceFlowState};
use super::model::{
    AuthorizationRequestResult, CredentialOfferResult, IssuanceResult,
    OpenID4VCIAuthorizationChallengeRequestDTO, OpenID4VCIAuthorizationChallengeResponseDTO,
    OpenID4VCIAuthorizationDetailDTO, OpenID4VCICredentialConfigurationDTO,
    OpenID4VCICredentialOfferDTO, OpenID4VCICredentialRequestDTO,
    OpenID4VCICredentialResponseDTO, OpenID4VCIDiscoveryResponseDTO, OpenID4VCIErrorResponseDTO,
    OpenID4VCIIssuerMetadataResponseDTO, OpenID4VCINonceResponseDTO, OpenID4VCIParRequestDTO,
    OpenID4VCIParResponseDTO, OpenID4VCIParams, OpenID4VCITokenRequestDTO,
    OpenID4VCITokenResponseDTO, TokenState,
};
use super::OpenID4VCIClient;
use crate::common_models::credential::StorableCredential;
use crate::common_models::event::WalletEvent;
use crate::credential_codec::registry::CredentialParserRegistry;
use crate::credential_storage::CredentialStorage;
use crate::dpop::{DpopKeyPair, DpopProofParams, ProofEngine};
use crate::http_client::{HttpClient, RequestBuilder, Response};
use crate::keystore::{HolderKeySigner, HolderKeystore};

#[cfg(test)]
mod test;

const CREDENTIAL_OFFER_VALUE_QUERY_PARAM_KEY: &str = "credential_offer";
const CREDENTIAL_OFFER_REFERENCE_QUERY_PARAM_KEY: &str = "credential_offer_uri";
const DPOP_NONCE_HEADER: &str = "DPoP-Nonce";
const PKCE_METHOD: &str = "S256";
const AUTHORIZATION_DETAILS_TYPE: &str = "openid_credential";

/// Issuer and authorization server metadata of one credential issuer.
#[derive(Clone, Debug)]
pub(crate) struct IssuerMetadata {
    pub issuer: OpenID4VCIIssuerMetadataResponseDTO,
    pub authorization_server: OpenID4VCIDiscoveryResponseDTO,
}

impl IssuerMetadata {
    fn configuration(
        &self,
        credential_configuration_id: &str,
    ) -> Result<&OpenID4VCICredentialConfigurationDTO, OpenID4VCIError> {
        self.issuer
            .credential_configurations_supported
            .get(credential_configuration_id)
            .ok_or_else(|| {
                OpenID4VCIError::UnknownConfiguration(credential_configuration_id.to_owned())
            })
    }
}

pub struct OpenID4VCIClientImpl {
    client: Arc<dyn HttpClient>,
    proof_engine: Arc<dyn ProofEngine>,
    keystore: Arc<dyn HolderKeystore>,
    storage: Arc<dyn CredentialStorage>,
    registry: Arc<dyn CredentialParserRegistry>,
    flows: Arc<dyn IssuanceFlowRepository>,
    events: broadcast::Sender<WalletEvent>,
    params: OpenID4VCIParams,
    metadata_cache: Mutex<HashMap<String, Arc<IssuerMetadata>>>,
}

impl OpenID4VCIClientImpl {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn HttpClient>,
        proof_engine: Arc<dyn ProofEngine>,
        keystore: Arc<dyn HolderKeystore>,
        storage: Arc<dyn CredentialStorage>,
        registry: Arc<dyn CredentialParserRegistry>,
        flows: Arc<dyn IssuanceFlowRepository>,
        events: broadcast::Sender<WalletEvent>,
        params: OpenID4VCIParams,
    ) -> Self {
        Self {
            client,
            proof_engine,
            keystore,
            storage,
            registry,
            flows,
            events,
            params,
            metadata_cache: Mutex::new(HashMap::new()),
        }
    }

    fn flow_key(&self, credential_configuration_id: &str, user_handle: &str) -> FlowKey {
        FlowKey {
            credential_issuer_identifier: self.params.credential_issuer.to_owned(),
            credential_configuration_id: credential_configuration_id.to_owned(),
            user_handle: user_handle.to_owned(),
        }
    }

    async fn discover(&self, credential_issuer: &str) -> Result<Arc<IssuerMetadata>, OpenID4VCIError> {
        let cache_key = credential_issuer.trim_end_matches('/').to_owned();
        if let Some(metadata) = self.metadata_cache.lock().await.get(&cache_key) {
            return Ok(metadata.clone());
        }

        let issuer_url = parse_url(&cache_key, self.params.allow_insecure_http_transport)?;
        let metadata = Arc::new(
            get_discovery_and_issuer_metadata(&self.client, issuer_url.as_str().trim_end_matches('/'))
                .await?,
        );

        self.metadata_cache
            .lock()
            .await
            .insert(cache_key, metadata.clone());
        Ok(metadata)
    }

    /// Sends `request` with a DPoP proof. A `400`/`401` carrying `DPoP-Nonce` is retried once
    /// with a fresh proof for the new nonce; the request body is sent unchanged.
    async fn send_with_dpop(
        &self,
        flow: &mut IssuanceFlowState,
        request: RequestBuilder,
        access_token: Option<&str>,
        mut nonce: Option<String>,
    ) -> Result<Response, OpenID4VCIError> {
        let mut retried = false;

        loop {
            let key = match flow.dpop.take() {
                Some(key) => key,
                None => DpopKeyPair::generate()?,
            };
            let key = flow.dpop.insert(key);

            let proof = self
                .proof_engine
                .dpop_proof(
                    key,
                    DpopProofParams {
                        method: request.method(),
                        url: request.url().to_owned(),
                        access_token: access_token.map(ToOwned::to_owned),
                        nonce: nonce.clone(),
                    },
                )
                .await?;
            self.flows.upsert(flow.clone()).await;

            let attempt = match access_token {
                Some(token) => request.clone().dpop_auth(token, &proof),
                None => request.clone().header("DPoP", &proof),
            };
            let response = attempt
                .send()
                .await
                .context("send error")
                .map_err(OpenID4VCIError::Transport)?;

            let status = response.status.0;
            match response.header_get(DPOP_NONCE_HEADER).cloned() {
                Some(fresh_nonce) if !retried && (status == 400 || status == 401) => {
                    tracing::debug!(status, url = request.url(), "server requires a new DPoP nonce");
                    nonce = Some(fresh_nonce);
                    retried = true;
                }
                _ => return Ok(response),
            }
        }
    }

    async fn token_grant(
        &self,
        flow: &mut IssuanceFlowState,
        metadata: &IssuerMetadata,
        request: OpenID4VCITokenRequestDTO,
        dpop_nonce: Option<String>,
    ) -> Result<(), OpenID4VCIError> {
        let with_tx_code = matches!(
            &request,
            OpenID4VCITokenRequestDTO::PreAuthorizedCode {
                tx_code: Some(_),
                ..
            }
        );

        let builder = self
            .client
            .post(&metadata.authorization_server.token_endpoint)
            .form(&request)
            .context("form error")
            .map_err(OpenID4VCIError::Transport)?;
        let response = self.send_with_dpop(flow, builder, None, dpop_nonce).await?;

        if !response.status.is_success() {
            let error = error_code(&response);
            tracing::warn!(status = response.status.0, %error, "token request rejected");
            if with_tx_code && error == "invalid_grant" {
                return Err(OpenID4VCIError::InvalidTxCode);
            }
            return Err(OpenID4VCIError::TokenRequestFailed(error));
        }

        let token: OpenID4VCITokenResponseDTO = response
            .json()
            .context("parsing error")
            .map_err(OpenID4VCIError::Transport)?;

        flow.token_response = Some(TokenState::from_response(token, OffsetDateTime::now_utc()));
        self.flows.upsert(flow.clone()).await;

        tracing::info!(
            issuer = %flow.key.credential_issuer_identifier,
            refresh = request.is_refresh_token(),
            pre_authorized = request.is_pre_authorized_code(),
            "access token obtained"
        );
        Ok(())
    }

    async fn authorization_code_grant(
        &self,
        mut flow: IssuanceFlowState,
        metadata: &IssuerMetadata,
        code: String,
        dpop_nonce: Option<String>,
    ) -> Result<IssuanceResult, OpenID4VCIError> {
        let code_verifier = flow.code_verifier.clone().ok_or_else(|| {
            OpenID4VCIError::InvalidAuthorizationResponse("flow has no code verifier".to_owned())
        })?;

        let request = OpenID4VCITokenRequestDTO::AuthorizationCode {
            code,
            code_verifier,
            redirect_uri: self.params.redirect_uri.to_owned(),
            client_id: self.params.client_id.to_owned(),
        };
        self.token_grant(&mut flow, metadata, request, dpop_nonce)
            .await?;
        self.request_credentials(&mut flow, metadata).await
    }

    /// The refreshed flow replaces the old one; the DPoP key stays since tokens are bound to it.
    async fn refresh_token_grant(
        &self,
        flow: IssuanceFlowState,
        metadata: &IssuerMetadata,
        refresh_token: String,
    ) -> Result<IssuanceResult, OpenID4VCIError> {
        let mut replacement =
            IssuanceFlowState::new(flow.key, generate_nonce(), OffsetDateTime::now_utc());
        replacement.dpop = flow.dpop;

        let request = OpenID4VCITokenRequestDTO::RefreshToken {
            refresh_token,
            client_id: self.params.client_id.to_owned(),
        };
        self.token_grant(&mut replacement, metadata, request, None)
            .await?;
        self.request_credentials(&mut replacement, metadata).await
    }

    async fn fetch_c_nonce(&self, metadata: &IssuerMetadata) -> Result<Option<String>, OpenID4VCIError> {
        let Some(nonce_endpoint) = &metadata.issuer.nonce_endpoint else {
            return Ok(None);
        };

        let response: OpenID4VCINonceResponseDTO = self
            .client
            .post(nonce_endpoint)
            .send()
            .await
            .context("send error")
            .map_err(OpenID4VCIError::Transport)?
            .error_for_status()
            .context("status error")
            .map_err(OpenID4VCIError::Transport)?
            .json()
            .context("parsing error")
            .map_err(OpenID4VCIError::Transport)?;

        Ok(Some(response.c_nonce))
    }

    async fn request_credentials(
        &self,
        flow: &mut IssuanceFlowState,
        metadata: &IssuerMetadata,
    ) -> Result<IssuanceResult, OpenID4VCIError> {
        let now = OffsetDateTime::now_utc();
        let token = flow
            .token_response
            .clone()
            .ok_or_else(|| OpenID4VCIError::TokenRequestFailed("no access token".to_owned()))?;
        let configuration = metadata.configuration(&flow.key.credential_configuration_id)?;

        let c_nonce = match token.valid_c_nonce(now) {
            Some(c_nonce) => Some(c_nonce),
            None => self.fetch_c_nonce(metadata).await?,
        };

        let batch_size = metadata
            .issuer
            .batch_credential_issuance
            .as_ref()
            .map_or(1, |batch| batch.batch_size)
            .min(self.params.batch_size)
            .max(1);

        let holder_keys = self.keystore.generate_holder_keys(batch_size).await?;
        let mut proofs = Vec::with_capacity(holder_keys.len());
        for key in holder_keys {
            let signer = HolderKeySigner::new(self.keystore.clone(), key)?;
            proofs.push(
                self.proof_engine
                    .key_proof(
                        &metadata.issuer.credential_issuer,
                        c_nonce.clone(),
                        Box::new(signer),
                    )
                    .await?,
            );
        }

        let body = OpenID4VCICredentialRequestDTO::new(
            flow.key.credential_configuration_id.to_owned(),
            proofs,
        );
        let request = self
            .client
            .post(&metadata.issuer.credential_endpoint)
            .json(&body)
            .context("json error")
            .map_err(OpenID4VCIError::Transport)?;
        let response = self
            .send_with_dpop(flow, request, Some(&token.access_token), None)
            .await?;

        if !response.status.is_success() {
            let error = error_code(&response);
            tracing::warn!(status = response.status.0, %error, "credential request rejected");
            return Err(OpenID4VCIError::CredentialRequestFailed(error));
        }

        let response: OpenID4VCICredentialResponseDTO = response
            .json()
            .context("parsing error")
            .map_err(OpenID4VCIError::Transport)?;

        if let (Some(c_nonce), Some(token)) = (&response.c_nonce, flow.token_response.as_mut()) {
            token.c_nonce = Some(c_nonce.to_owned());
            token.c_nonce_expiration_timestamp = None;
        }
        self.flows.upsert(flow.clone()).await;

        if response.transaction_id.is_some()
            && response.credential.is_none()
            && response.credentials.is_empty()
        {
            return Err(OpenID4VCIError::DeferredIssuanceNotSupported);
        }

        let raw_credentials = response.into_credentials();
        if raw_credentials.is_empty() {
            return Err(OpenID4VCIError::CredentialRequestFailed(
                "response contains no credentials".to_owned(),
            ));
        }
        if raw_credentials.len() > batch_size {
            return Err(OpenID4VCIError::CredentialRequestFailed(format!(
                "{} credentials returned for {batch_size} proofs",
                raw_credentials.len()
            )));
        }

        let issuer_display = configuration.issuer_display();
        try_join_all(
            raw_credentials
                .iter()
                .map(|raw| self.registry.parse(raw, issuer_display.clone())),
        )
        .await
        .map_err(OpenID4VCIError::InvalidCredential)?;

        let batch_id = Uuid::new_v4();
        let credentials: Vec<StorableCredential> = (0u32..)
            .zip(raw_credentials)
            .map(|(instance_id, credential)| StorableCredential {
                credential_identifier: Uuid::new_v4().to_string(),
                credential,
                format: configuration.format,
                credential_configuration_id: flow.key.credential_configuration_id.to_owned(),
                credential_issuer_identifier: flow.key.credential_issuer_identifier.to_owned(),
                sig_count: 0,
                instance_id,
                batch_id,
            })
            .collect();

        self.keystore.add_credentials(credentials.clone()).await?;
        self.storage.store_credentials(credentials.clone()).await?;

        tracing::info!(%batch_id, instances = credentials.len(), "credentials issued");
        // nobody listening is fine
        let _ = self.events.send(WalletEvent::NewCredential {
            batch_id,
            credential_issuer: flow.key.credential_issuer_identifier.to_owned(),
            credential_configuration_id: flow.key.credential_configuration_id.to_owned(),
            instances: credentials.len(),
        });

        Ok(IssuanceResult {
            batch_id,
            credentials,
        })
    }

    async fn authorization_challenge(
        &self,
        endpoint: &str,
        request: OpenID4VCIAuthorizationChallengeRequestDTO,
    ) -> Result<String, OpenID4VCIError> {
        let response = self
            .client
            .post(endpoint)
            .form(&request)
            .context("form error")
            .map_err(OpenID4VCIError::Transport)?
            .send()
            .await
            .context("send error")
            .map_err(OpenID4VCIError::Transport)?;

        if !response.status.is_success() {
            let error = error_code(&response);
            tracing::warn!(status = response.status.0, %error, "authorization challenge rejected");
            return Err(OpenID4VCIError::AuthorizationChallengeFailed(error));
        }

        let response: OpenID4VCIAuthorizationChallengeResponseDTO = response
            .json()
            .context("parsing error")
            .map_err(OpenID4VCIError::Transport)?;
        Ok(response.authorization_code)
    }

    async fn pushed_authorization_request(
        &self,
        endpoint: &str,
        request: &OpenID4VCIParRequestDTO,
    ) -> Result<OpenID4VCIParResponseDTO, OpenID4VCIError> {
        self.client
            .post(endpoint)
            .form(request)
            .context("form error")
            .map_err(OpenID4VCIError::Transport)?
            .send()
            .await
            .context("send error")
            .map_err(OpenID4VCIError::Transport)?
            .error_for_status()
            .context("status error")
            .map_err(OpenID4VCIError::Transport)?
            .json()
            .context("parsing error")
            .map_err(OpenID4VCIError::Transport)
    }
}

#[async_trait]
impl OpenID4VCIClient for OpenID4VCIClientImpl {
    async fn handle_credential_offer(
        &self,
        url: &str,
    ) -> Result<CredentialOfferResult, OpenID4VCIError> {
        let url = Url::parse(url).map_err(|e| OpenID4VCIError::InvalidOffer(e.to_string()))?;
        let offer =
            resolve_credential_offer(&self.client, url, self.params.allow_insecure_http_transport)
                .await?;

        if offer.grants.authorization_code.is_none() && offer.grants.pre_authorized_code.is_none()
        {
            return Err(OpenID4VCIError::UnsupportedGrant);
        }

        if !same_issuer(&offer.credential_issuer, &self.params.credential_issuer) {
            tracing::warn!(
                offered = %offer.credential_issuer,
                "credential offer from unexpected issuer"
            );
            return Err(OpenID4VCIError::IssuerMismatch {
                expected: self.params.credential_issuer.to_owned(),
                actual: offer.credential_issuer,
            });
        }

        let selected = offer
            .credential_configuration_ids
            .first()
            .ok_or_else(|| {
                OpenID4VCIError::InvalidOffer("no credential configuration offered".to_owned())
            })?
            .to_owned();

        let metadata = self.discover(&offer.credential_issuer).await?;
        metadata.configuration(&selected)?;

        Ok(CredentialOfferResult {
            credential_issuer: offer.credential_issuer,
            selected_credential_configuration_id: selected,
            issuer_state: offer
                .grants
                .authorization_code
                .and_then(|grant| grant.issuer_state),
            pre_authorized_code: offer.grants.pre_authorized_code,
        })
    }

    async fn generate_authorization_request(
        &self,
        credential_configuration_id: &str,
        user_handle: &str,
        issuer_state: Option<String>,
    ) -> Result<AuthorizationRequestResult, OpenID4VCIError> {
        let now = OffsetDateTime::now_utc();
        self.flows.sweep_expired(now).await;

        let metadata = self.discover(&self.params.credential_issuer).await?;
        let configuration = metadata.configuration(credential_configuration_id)?;
        let key = self.flow_key(credential_configuration_id, user_handle);

        if let Some(mut flow) = self.flows.get(&key).await {
            match flow.token_response.clone() {
                Some(token) if token.is_access_token_valid(now) => {
                    tracing::debug!("issuing with the active access token");
                    match self.request_credentials(&mut flow, &metadata).await {
                        Ok(result) => return Ok(AuthorizationRequestResult::Issued(result)),
                        Err(error) => {
                            tracing::info!(
                                %error,
                                "active access token rejected, starting a new authorization"
                            )
                        }
                    }
                }
                Some(TokenState {
                    refresh_token: Some(refresh_token),
                    ..
                }) => match self.refresh_token_grant(flow, &metadata, refresh_token).await {
                    Ok(result) => return Ok(AuthorizationRequestResult::Issued(result)),
                    Err(error) => {
                        tracing::info!(%error, "token refresh failed, starting a new authorization")
                    }
                },
                _ => {}
            }
        }

        let code_verifier = generate_nonce();
        let code_challenge = SHA256 {}.hash_base64(code_verifier.as_bytes())?;

        let mut flow = IssuanceFlowState::new(key, generate_nonce(), now);
        flow.code_verifier = Some(code_verifier);
        self.flows.upsert(flow.clone()).await;

        let authorization_details = serde_json::to_string(&[OpenID4VCIAuthorizationDetailDTO {
            r#type: AUTHORIZATION_DETAILS_TYPE,
            credential_configuration_id: credential_configuration_id.to_owned(),
        }])?;

        if let Some(endpoint) = &metadata.authorization_server.authorization_challenge_endpoint {
            let code = self
                .authorization_challenge(
                    endpoint,
                    OpenID4VCIAuthorizationChallengeRequestDTO {
                        client_id: self.params.client_id.to_owned(),
                        state: flow.state.to_owned(),
                        code_challenge,
                        code_challenge_method: PKCE_METHOD,
                        authorization_details,
                        scope: configuration.scope.to_owned(),
                        issuer_state,
                    },
                )
                .await?;
            self.flows.mark_state_used(&flow.state).await;

            return self
                .authorization_code_grant(flow, &metadata, code, None)
                .await
                .map(AuthorizationRequestResult::Issued);
        }

        let authorization_endpoint = metadata
            .authorization_server
            .authorization_endpoint
            .as_deref()
            .ok_or(OpenID4VCIError::MissingEndpoint("authorization_endpoint"))?;
        let mut url = Url::parse(authorization_endpoint)
            .context("authorization endpoint")
            .map_err(OpenID4VCIError::Transport)?;

        let request = OpenID4VCIParRequestDTO {
            client_id: self.params.client_id.to_owned(),
            response_type: "code",
            redirect_uri: self.params.redirect_uri.to_owned(),
            state: flow.state.to_owned(),
            code_challenge,
            code_challenge_method: PKCE_METHOD,
            authorization_details,
            scope: configuration.scope.to_owned(),
            issuer_state,
        };

        match (
            self.params.use_par,
            &metadata.authorization_server.pushed_authorization_request_endpoint,
        ) {
            (true, Some(par_endpoint)) => {
                let par = self
                    .pushed_authorization_request(par_endpoint, &request)
                    .await?;
                url.query_pairs_mut()
                    .append_pair("client_id", &self.params.client_id)
                    .append_pair("request_uri", &par.request_uri);
            }
            _ => {
                let query = serde_urlencoded::to_string(&request)
                    .context("query error")
                    .map_err(OpenID4VCIError::Transport)?;
                url.set_query(Some(&query));
            }
        }

        tracing::debug!(credential_configuration_id, "authorization request created");
        Ok(AuthorizationRequestResult::Redirect {
            url: url.to_string(),
        })
    }

    async fn handle_authorization_response(
        &self,
        url: &str,
        user_handle: &str,
        dpop_nonce: Option<String>,
    ) -> Result<IssuanceResult, OpenID4VCIError> {
        let url = Url::parse(url)
            .map_err(|e| OpenID4VCIError::InvalidAuthorizationResponse(e.to_string()))?;
        let query: HashMap<_, _> = url.query_pairs().collect();

        if let Some(error) = query.get("error") {
            return Err(OpenID4VCIError::AuthorizationDenied(error.to_string()));
        }
        let code = query.get("code").ok_or_else(|| {
            OpenID4VCIError::InvalidAuthorizationResponse("missing code".to_owned())
        })?;
        let state = query.get("state").ok_or_else(|| {
            OpenID4VCIError::InvalidAuthorizationResponse("missing state".to_owned())
        })?;

        self.flows.sweep_expired(OffsetDateTime::now_utc()).await;
        let flow = self
            .flows
            .find_by_state(state, user_handle)
            .await
            .ok_or(OpenID4VCIError::UnknownState)?;

        if !self.flows.mark_state_used(state).await {
            tracing::warn!("authorization response replayed");
            return Err(OpenID4VCIError::StateAlreadyUsed);
        }

        let metadata = self
            .discover(&flow.key.credential_issuer_identifier)
            .await?;
        self.authorization_code_grant(flow, &metadata, code.to_string(), dpop_nonce)
            .await
    }

    async fn pre_authorized_code_grant(
        &self,
        offer: CredentialOfferResult,
        user_handle: &str,
        tx_code: Option<String>,
    ) -> Result<IssuanceResult, OpenID4VCIError> {
        let grant = offer
            .pre_authorized_code
            .ok_or(OpenID4VCIError::UnsupportedGrant)?;
        if grant.requires_tx_code() && tx_code.is_none() {
            return Err(OpenID4VCIError::TxCodeRequired);
        }

        let metadata = self.discover(&offer.credential_issuer).await?;
        metadata.configuration(&offer.selected_credential_configuration_id)?;

        let now = OffsetDateTime::now_utc();
        self.flows.sweep_expired(now).await;

        let mut flow = IssuanceFlowState::new(
            self.flow_key(&offer.selected_credential_configuration_id, user_handle),
            generate_nonce(),
            now,
        );
        self.flows.upsert(flow.clone()).await;

        let request = OpenID4VCITokenRequestDTO::PreAuthorizedCode {
            pre_authorized_code: grant.pre_authorized_code,
            tx_code,
        };
        self.token_grant(&mut flow, &metadata, request, None).await?;
        self.request_credentials(&mut flow, &metadata).await
    }

    async fn sweep_expired_flows(&self, now: OffsetDateTime) -> usize {
        self.flows.sweep_expired(now).await
    }
}

fn same_issuer(left: &str, right: &str) -> bool {
    left.trim_end_matches('/') == right.trim_end_matches('/')
}

fn parse_url(value: &str, allow_insecure_http_transport: bool) -> Result<Url, OpenID4VCIError> {
    let url = Url::parse(value).map_err(|e| OpenID4VCIError::InvalidOffer(e.to_string()))?;
    if url.scheme() != "https" && !allow_insecure_http_transport {
        return Err(OpenID4VCIError::InsecureTransport(value.to_owned()));
    }
    Ok(url)
}

/// OAuth error code of a failed response, or the status code if the body has none.
fn error_code(response: &Response) -> String {
    serde_json::from_slice::<OpenID4VCIErrorResponseDTO>(&response.body)
        .map(|error| error.error)
        .unwrap_or_else(|_| format!("HTTP {}", response.status))
}

async fn resolve_credential_offer(
    client: &Arc<dyn HttpClient>,
    invitation_url: Url,
    allow_insecure_http_transport: bool,
) -> Result<OpenID4VCICredentialOfferDTO, OpenID4VCIError> {
    let query_pairs: HashMap<_, _> = invitation_url.query_pairs().collect();
    let credential_offer_param = query_pairs.get(CREDENTIAL_OFFER_VALUE_QUERY_PARAM_KEY);
    let credential_offer_reference_param =
        query_pairs.get(CREDENTIAL_OFFER_REFERENCE_QUERY_PARAM_KEY);

    if credential_offer_param.is_some() && credential_offer_reference_param.is_some() {
        return Err(OpenID4VCIError::InvalidOffer(format!(
            "Detected both {CREDENTIAL_OFFER_VALUE_QUERY_PARAM_KEY} and {CREDENTIAL_OFFER_REFERENCE_QUERY_PARAM_KEY}"
        )));
    }

    if let Some(credential_offer) = credential_offer_param {
        serde_json::from_str(credential_offer).map_err(|error| {
            OpenID4VCIError::InvalidOffer(format!("Failed decoding credential offer {error}"))
        })
    } else if let Some(credential_offer_reference) = credential_offer_reference_param {
        let credential_offer_url =
            parse_url(credential_offer_reference, allow_insecure_http_transport)?;

        client
            .get(credential_offer_url.as_str())
            .send()
            .await
            .context("send error")
            .map_err(OpenID4VCIError::Transport)?
            .error_for_status()
            .context("status error")
            .map_err(OpenID4VCIError::Transport)?
            .json()
            .map_err(|error| {
                OpenID4VCIError::InvalidOffer(format!(
                    "Failed decoding credential offer json {error}"
                ))
            })
    } else {
        Err(OpenID4VCIError::InvalidOffer(
            "Missing credential offer param".to_string(),
        ))
    }
}

async fn fetch<T: DeserializeOwned>(
    client: &Arc<dyn HttpClient>,
    endpoint: String,
) -> Result<T, OpenID4VCIError> {
    client
        .get(&endpoint)
        .send()
        .await
        .context("send error")
        .map_err(OpenID4VCIError::Transport)?
        .error_for_status()
        .context("status error")
        .map_err(OpenID4VCIError::Transport)?
        .json()
        .context("parsing error")
        .map_err(OpenID4VCIError::Transport)
}

async fn get_discovery_and_issuer_metadata(
    client: &Arc<dyn HttpClient>,
    credential_issuer: &str,
) -> Result<IssuerMetadata, OpenID4VCIError> {
    let issuer: OpenID4VCIIssuerMetadataResponseDTO = fetch(
        client,
        format!("{credential_issuer}/.well-known/openid-credential-issuer"),
    )
    .await?;

    if !same_issuer(&issuer.credential_issuer, credential_issuer) {
        return Err(OpenID4VCIError::IssuerMismatch {
            expected: credential_issuer.to_owned(),
            actual: issuer.credential_issuer,
        });
    }

    let authorization_server_url = issuer
        .authorization_servers
        .first()
        .map(|server| server.trim_end_matches('/').to_owned())
        .unwrap_or_else(|| credential_issuer.to_owned());

    let authorization_server = match fetch(
        client,
        format!("{authorization_server_url}/.well-known/oauth-authorization-server"),
    )
    .await
    {
        Ok(discovery) => discovery,
        Err(error) => {
            tracing::debug!(%error, "falling back to openid-configuration");
            fetch(
                client,
                format!("{authorization_server_url}/.well-known/openid-configuration"),
            )
            .await?
        }
    };

    tracing::debug!(credential_issuer, "issuer metadata discovered");
    Ok(IssuerMetadata {
        issuer,
        authorization_server,
    })
}
