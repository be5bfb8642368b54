use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use url::Url;
use uuid::Uuid;

use wallet_crypto::CryptoProvider;

use self::matching::{disclosure_paths, is_conformant, match_descriptor, Candidate};
use self::validator::{
    assert_request_param, nontrusted, parse_request_url, validate_verifier_certificate,
};
use super::error::OpenID4VPError;
use super::model::{
    AuthorizationRequestResult, OpenID4VPAuthorizationRequestQueryParams,
    OpenID4VPDirectPostRequestDTO, OpenID4VPDirectPostResponseDTO, OpenID4VPParams,
    OpenID4VPPresentationDefinition, OpenID4VPRequestObjectClaims, PresentationFlowState,
    PresentationSubmissionDescriptorDTO, PresentationSubmissionMappingDTO, SelectionMap,
};
use super::state::PresentationSlot;
use super::{OpenID4VPEngine, VerifierTrustProbe};
use crate::common_models::event::WalletEvent;
use crate::common_models::presentation::PresentationRecord;
use crate::credential_codec::error::CodecError;
use crate::credential_codec::imp::jwt::Jwt;
use crate::credential_codec::imp::key_resolver::X509JwksKeyResolver;
use crate::credential_codec::imp::sdjwt::model::KeyBindingParams;
use crate::credential_codec::model::AuthenticationFn;
use crate::credential_codec::registry::CredentialParserRegistry;
use crate::credential_codec::CredentialPresenter;
use crate::credential_storage::CredentialStorage;
use crate::http_client::HttpClient;
use crate::keystore::model::HolderKeyRef;
use crate::keystore::{HolderKeySigner, HolderKeystore};
use crate::util::key_verification::KeyVerification;
use crate::util::x509::decode_x5c;

mod matching;
mod validator;

#[cfg(test)]
mod test;

const RESPONSE_TYPE: &str = "vp_token";
const RESPONSE_MODE: &str = "direct_post";
const SUBMISSION_PATH: &str = "$";

/// Authorization request after dereferencing and trust checks.
struct ResolvedRequest {
    client_id: String,
    response_uri: Url,
    nonce: String,
    state: Option<String>,
    presentation_definition: OpenID4VPPresentationDefinition,
    verifier_domain: String,
}

pub struct OpenID4VPEngineImpl {
    client: Arc<dyn HttpClient>,
    registry: Arc<dyn CredentialParserRegistry>,
    presenter: Arc<dyn CredentialPresenter>,
    keystore: Arc<dyn HolderKeystore>,
    storage: Arc<dyn CredentialStorage>,
    events: broadcast::Sender<WalletEvent>,
    probe: Option<Arc<dyn VerifierTrustProbe>>,
    request_verification: KeyVerification,
    slot: PresentationSlot,
    params: OpenID4VPParams,
}

impl OpenID4VPEngineImpl {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn HttpClient>,
        crypto: Arc<dyn CryptoProvider>,
        registry: Arc<dyn CredentialParserRegistry>,
        presenter: Arc<dyn CredentialPresenter>,
        keystore: Arc<dyn HolderKeystore>,
        storage: Arc<dyn CredentialStorage>,
        events: broadcast::Sender<WalletEvent>,
        probe: Option<Arc<dyn VerifierTrustProbe>>,
        params: OpenID4VPParams,
    ) -> Self {
        // request objects are pinned to their own leaf certificate, checked against the
        // verifier endpoints afterwards
        let request_verification = KeyVerification {
            key_resolver: Arc::new(X509JwksKeyResolver::new(client.clone(), vec![])),
            crypto,
        };

        Self {
            client,
            registry,
            presenter,
            keystore,
            storage,
            events,
            probe,
            request_verification,
            slot: PresentationSlot::default(),
            params,
        }
    }

    async fn resolve_request(&self, url: &str) -> Result<ResolvedRequest, OpenID4VPError> {
        let url = Url::parse(url).map_err(|e| OpenID4VPError::InvalidRequest(e.to_string()))?;
        let query = url.query().ok_or(OpenID4VPError::InvalidRequest(
            "Query cannot be empty".to_string(),
        ))?;

        let params: OpenID4VPAuthorizationRequestQueryParams = serde_qs::from_str(query)
            .map_err(|e| OpenID4VPError::InvalidRequest(e.to_string()))?;

        match params.request_uri.to_owned() {
            Some(request_uri) => self.resolve_request_object(&request_uri, params).await,
            None => self.resolve_request_by_value(params).await,
        }
    }

    async fn resolve_request_by_value(
        &self,
        params: OpenID4VPAuthorizationRequestQueryParams,
    ) -> Result<ResolvedRequest, OpenID4VPError> {
        assert_request_param(params.response_type.as_deref(), RESPONSE_TYPE, "response_type")?;
        assert_request_param(params.response_mode.as_deref(), RESPONSE_MODE, "response_mode")?;

        let response_uri = parse_request_url(
            &required(params.response_uri, "response_uri")?,
            "response_uri",
            self.params.allow_insecure_http_transport,
        )?;

        let presentation_definition = match params.presentation_definition {
            Some(value) => Some(serde_json::from_str(&value).map_err(|e| {
                OpenID4VPError::InvalidRequest(format!("presentation_definition: {e}"))
            })?),
            None => None,
        };

        let verifier_domain = response_uri
            .host_str()
            .ok_or(OpenID4VPError::InvalidRequest(
                "response_uri has no host".to_string(),
            ))?
            .to_ascii_lowercase();

        Ok(ResolvedRequest {
            client_id: required(params.client_id, "client_id")?,
            nonce: required(params.nonce, "nonce")?,
            state: params.state,
            presentation_definition: self
                .resolve_presentation_definition(
                    presentation_definition,
                    params.presentation_definition_uri,
                )
                .await?,
            response_uri,
            verifier_domain,
        })
    }

    async fn resolve_request_object(
        &self,
        request_uri: &str,
        params: OpenID4VPAuthorizationRequestQueryParams,
    ) -> Result<ResolvedRequest, OpenID4VPError> {
        let request_uri = parse_request_url(
            request_uri,
            "request_uri",
            self.params.allow_insecure_http_transport,
        )?;

        let token = self
            .client
            .get(request_uri.as_str())
            .send()
            .await
            .context("send error")
            .map_err(OpenID4VPError::Transport)?
            .error_for_status()
            .context("status error")
            .map_err(OpenID4VPError::Transport)?
            .text()
            .context("parsing error")
            .map_err(OpenID4VPError::Transport)?;

        let x5c = Jwt::<OpenID4VPRequestObjectClaims>::decompose_token(token.trim())
            .map_err(|e| OpenID4VPError::InvalidRequest(e.to_string()))?
            .header
            .x5c
            .ok_or_else(|| nontrusted("request object carries no x5c certificate"))?;

        let leaf = decode_x5c(&x5c)
            .map_err(|e| nontrusted(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| nontrusted("empty x5c"))?;

        let request = Jwt::<OpenID4VPRequestObjectClaims>::build_from_token(
            token.trim(),
            Some(Box::new(self.request_verification.clone())),
        )
        .await
        .map_err(|e| nontrusted(e.to_string()))?;

        let claims = request.payload.custom;

        let client_id = required(claims.client_id, "client_id")?;
        if params
            .client_id
            .as_ref()
            .is_some_and(|query_client_id| query_client_id != &client_id)
        {
            return Err(nontrusted("client_id differs from the signed request"));
        }

        assert_request_param(claims.response_type.as_deref(), RESPONSE_TYPE, "response_type")?;
        assert_request_param(claims.response_mode.as_deref(), RESPONSE_MODE, "response_mode")?;

        let response_uri = parse_request_url(
            &required(claims.response_uri, "response_uri")?,
            "response_uri",
            self.params.allow_insecure_http_transport,
        )?;

        let verifier_domain = validate_verifier_certificate(
            &leaf,
            &request_uri,
            &response_uri,
            &client_id,
            claims.client_id_scheme.as_deref(),
            OffsetDateTime::now_utc(),
        )?;

        if self.params.corroborate_verifier_tls {
            if let Some(probe) = &self.probe {
                match probe.corroborate(verifier_domain.to_owned(), leaf).await {
                    Ok(true) => {}
                    Ok(false) => {
                        return Err(nontrusted(format!(
                            "`{verifier_domain}` serves a different certificate"
                        )))
                    }
                    Err(error) => {
                        return Err(nontrusted(format!(
                            "`{verifier_domain}` could not be probed: {error:#}"
                        )))
                    }
                }
            }
        }

        Ok(ResolvedRequest {
            client_id,
            nonce: required(request.payload.nonce, "nonce")?,
            state: claims.state,
            presentation_definition: self
                .resolve_presentation_definition(
                    claims.presentation_definition,
                    claims.presentation_definition_uri,
                )
                .await?,
            response_uri,
            verifier_domain,
        })
    }

    async fn resolve_presentation_definition(
        &self,
        presentation_definition: Option<OpenID4VPPresentationDefinition>,
        presentation_definition_uri: Option<String>,
    ) -> Result<OpenID4VPPresentationDefinition, OpenID4VPError> {
        match (presentation_definition, presentation_definition_uri) {
            (Some(_), Some(_)) => Err(OpenID4VPError::InvalidRequest(
                "presentation_definition and presentation_definition_uri cannot be set together"
                    .to_string(),
            )),
            (Some(presentation_definition), None) => Ok(presentation_definition),
            (None, Some(uri)) => {
                let uri = parse_request_url(
                    &uri,
                    "presentation_definition_uri",
                    self.params.allow_insecure_http_transport,
                )?;

                self.client
                    .get(uri.as_str())
                    .send()
                    .await
                    .context("send error")
                    .map_err(OpenID4VPError::Transport)?
                    .error_for_status()
                    .context("status error")
                    .map_err(OpenID4VPError::Transport)?
                    .json()
                    .context("parsing error")
                    .map_err(OpenID4VPError::Transport)
            }
            (None, None) => Err(OpenID4VPError::InvalidRequest(
                "presentation_definition missing".to_string(),
            )),
        }
    }

    async fn candidates(&self) -> Result<Vec<Candidate>, OpenID4VPError> {
        let mut candidates = vec![];
        for credential in self.keystore.credentials().await? {
            match self.registry.parse(&credential.credential, None).await {
                Ok(parsed) => candidates.push(Candidate { credential, parsed }),
                Err(error) => tracing::debug!(
                    credential_identifier = %credential.credential_identifier,
                    %error,
                    "Skipping unparsable credential"
                ),
            }
        }
        Ok(candidates)
    }

    async fn present(
        &self,
        flow: PresentationFlowState,
        selection: SelectionMap,
    ) -> Result<Option<String>, OpenID4VPError> {
        let descriptor = flow
            .presentation_definition
            .input_descriptors
            .first()
            .ok_or(OpenID4VPError::InvalidRequest(
                "no input descriptor".to_string(),
            ))?;

        if let Some(unknown) = selection.keys().find(|id| *id != &descriptor.id) {
            return Err(OpenID4VPError::InvalidSelection(format!(
                "unknown input descriptor `{unknown}`"
            )));
        }

        let credential_identifier =
            selection
                .get(&descriptor.id)
                .ok_or(OpenID4VPError::InvalidSelection(format!(
                    "no credential selected for `{}`",
                    descriptor.id
                )))?;

        let credential = self
            .keystore
            .credentials()
            .await?
            .into_iter()
            .find(|credential| &credential.credential_identifier == credential_identifier)
            .ok_or(OpenID4VPError::UnknownCredential(
                credential_identifier.to_owned(),
            ))?;

        let parsed = self.registry.parse(&credential.credential, None).await?;
        if !is_conformant(descriptor, &parsed)? {
            return Err(OpenID4VPError::InvalidSelection(format!(
                "credential `{credential_identifier}` does not satisfy `{}`",
                descriptor.id
            )));
        }

        let paths = disclosure_paths(&descriptor.constraints.fields, &parsed.signed_claims)?;

        let key_binding = match self.presenter.holder_key(&credential.credential)? {
            Some(public_jwk) => {
                let key = HolderKeyRef {
                    key_id: public_jwk.thumbprint().map_err(CodecError::from)?,
                    public_jwk,
                };
                let auth_fn: AuthenticationFn =
                    Box::new(HolderKeySigner::new(self.keystore.clone(), key)?);

                Some((
                    KeyBindingParams {
                        audience: flow.client_id.to_owned(),
                        nonce: flow.nonce.to_owned(),
                    },
                    auth_fn,
                ))
            }
            None => None,
        };

        let vp_token = self
            .presenter
            .prepare_presentation(&credential.credential, &paths, key_binding)
            .await?;

        let presentation_submission = PresentationSubmissionMappingDTO {
            id: Uuid::new_v4().to_string(),
            definition_id: flow.presentation_definition.id.to_owned(),
            descriptor_map: vec![PresentationSubmissionDescriptorDTO {
                id: descriptor.id.to_owned(),
                format: credential.format.to_string(),
                path: SUBMISSION_PATH.to_string(),
                path_nested: None,
            }],
        };

        let record = PresentationRecord {
            presentation_identifier: Uuid::new_v4().to_string(),
            client_id: flow.client_id.to_owned(),
            verifier_domain: flow.verifier_domain.to_owned(),
            credential_identifiers: vec![credential.credential_identifier.to_owned()],
            vp_token: serde_json::Value::String(vp_token.to_owned()),
            presentation_submission: serde_json::to_value(&presentation_submission)?,
            presentation_time: OffsetDateTime::now_utc(),
        };
        let presentation_identifier = record.presentation_identifier.to_owned();

        self.keystore.record_presentation(record.clone()).await?;
        self.storage.store_presentation(record).await?;

        let response = self
            .client
            .post(&flow.response_uri)
            .form(OpenID4VPDirectPostRequestDTO {
                vp_token,
                presentation_submission,
                state: flow.state.to_owned(),
            })
            .context("form error")
            .map_err(OpenID4VPError::Transport)?
            .send()
            .await
            .context("send error")
            .map_err(OpenID4VPError::Transport)?;

        if !response.status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OpenID4VPError::VerifierRejected(format!(
                "{}: {body}",
                response.status
            )));
        }

        let redirect_uri = if response.body.is_empty() {
            None
        } else {
            response
                .json::<OpenID4VPDirectPostResponseDTO>()
                .context("parsing error")
                .map_err(OpenID4VPError::Transport)?
                .redirect_uri
        };

        tracing::info!(
            verifier_domain = %flow.verifier_domain,
            %presentation_identifier,
            "Presentation sent"
        );

        let _ = self.events.send(WalletEvent::PresentationSent {
            presentation_identifier,
            verifier_domain: flow.verifier_domain,
        });

        Ok(redirect_uri)
    }
}

#[async_trait]
impl OpenID4VPEngine for OpenID4VPEngineImpl {
    async fn handle_authorization_request(
        &self,
        url: &str,
    ) -> Result<AuthorizationRequestResult, OpenID4VPError> {
        if self.slot.is_occupied().await {
            return Err(OpenID4VPError::PresentationInProgress);
        }

        let request = self.resolve_request(url).await?;

        let descriptor = match request.presentation_definition.input_descriptors.as_slice() {
            [descriptor] => descriptor,
            [] => {
                return Err(OpenID4VPError::InvalidRequest(
                    "presentation_definition has no input descriptor".to_string(),
                ))
            }
            _ => return Err(OpenID4VPError::OnlyOneInputDescriptorIsSupported),
        };

        let candidates = self.candidates().await?;
        let conformant = match_descriptor(descriptor, &candidates)?;

        let result = AuthorizationRequestResult {
            conformant_credentials_map: HashMap::from([(descriptor.id.to_owned(), conformant)]),
            verifier_domain_name: request.verifier_domain.to_owned(),
        };

        self.slot
            .occupy(PresentationFlowState {
                presentation_definition: request.presentation_definition,
                nonce: request.nonce,
                response_uri: request.response_uri.to_string(),
                client_id: request.client_id,
                state: request.state,
                verifier_domain: request.verifier_domain,
            })
            .await?;

        Ok(result)
    }

    async fn send_authorization_response(
        &self,
        selection: SelectionMap,
    ) -> Result<Option<String>, OpenID4VPError> {
        let flow = self
            .slot
            .take()
            .await
            .ok_or(OpenID4VPError::NoPresentationInProgress)?;

        self.present(flow, selection).await
    }

    async fn cancel(&self) {
        self.slot.clear().await;
    }
}

fn required(value: Option<String>, key: &str) -> Result<String, OpenID4VPError> {
    value.ok_or_else(|| OpenID4VPError::InvalidRequest(format!("{key} missing")))
}
