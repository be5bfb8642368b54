use std::collections::HashMap;
use std::sync::Arc;

use ct_codecs::{Base64UrlSafeNoPadding, Decoder};
use serde_json::json;
use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use super::OpenID4VCIClientImpl;
use crate::common_models::credential::CredentialFormat;
use crate::common_models::event::WalletEvent;
use crate::common_models::jwk::EcPublicJwk;
use crate::credential_codec::model::{CredentialDisplay, CredentialMetadata, ParsedCredential};
use crate::credential_codec::registry::MockCredentialParserRegistry;
use crate::credential_storage::imp::in_memory::InMemoryCredentialStorage;
use crate::credential_storage::CredentialStorage;
use crate::dpop::ProofEngineImpl;
use crate::exchange_protocol::openid4vci::error::OpenID4VCIError;
use crate::exchange_protocol::openid4vci::flow_state::InMemoryIssuanceFlowRepository;
use crate::exchange_protocol::openid4vci::model::{AuthorizationRequestResult, OpenID4VCIParams};
use crate::exchange_protocol::openid4vci::OpenID4VCIClient;
use crate::http_client::imp::reqwest_client::ReqwestClient;
use crate::keystore::model::HolderKeyRef;
use crate::keystore::MockHolderKeystore;
use crate::test_utilities::{test_crypto, EcKeySigner};

const CONFIGURATION_ID: &str = "eu.europa.ec.eudi.pid_vc_sd_jwt";

struct TestContext {
    server: MockServer,
    client: OpenID4VCIClientImpl,
    storage: Arc<InMemoryCredentialStorage>,
    events: broadcast::Receiver<WalletEvent>,
}

fn params(issuer: &str) -> OpenID4VCIParams {
    OpenID4VCIParams {
        client_id: "wallet".to_owned(),
        redirect_uri: "https://wallet.example/callback".to_owned(),
        credential_issuer: issuer.to_owned(),
        remember_issuer_for_seconds: 3600,
        batch_size: 2,
        allow_insecure_http_transport: true,
        use_par: true,
    }
}

fn parsed() -> ParsedCredential {
    ParsedCredential {
        format: CredentialFormat::SdJwt,
        issuer: None,
        credential_type: Some("urn:eu.europa.ec.eudi:pid:1".to_owned()),
        signed_claims: json!({}),
        metadata: CredentialMetadata {
            credential: CredentialDisplay {
                name: "PID".to_owned(),
                image: None,
                type_metadata: None,
            },
        },
        valid_until: None,
        is_expired: false,
        is_not_yet_valid: false,
    }
}

fn keystore() -> MockHolderKeystore {
    let mut keystore = MockHolderKeystore::default();
    keystore.expect_generate_holder_keys().returning(|count| {
        Ok((0..count)
            .map(|index| HolderKeyRef {
                key_id: format!("holder-{index}"),
                public_jwk: EcPublicJwk::from_sec1(&EcKeySigner::random().public_key).unwrap(),
            })
            .collect())
    });
    keystore
        .expect_sign()
        .returning(|_, _| Ok(vec![7; 64]));
    keystore.expect_add_credentials().returning(|_| Ok(()));
    keystore
}

async fn context_with(keystore: MockHolderKeystore, configure: impl FnOnce(&mut OpenID4VCIParams)) -> TestContext {
    let server = MockServer::start().await;
    let mut params = params(&server.uri());
    configure(&mut params);

    let mut registry = MockCredentialParserRegistry::default();
    registry
        .expect_parse()
        .returning(|_, _| Ok(Arc::new(parsed())));

    let storage = Arc::new(InMemoryCredentialStorage::default());
    let (sender, events) = broadcast::channel(8);

    let client = OpenID4VCIClientImpl::new(
        Arc::new(ReqwestClient::default()),
        Arc::new(ProofEngineImpl::new(test_crypto())),
        Arc::new(keystore),
        storage.clone(),
        Arc::new(registry),
        Arc::new(InMemoryIssuanceFlowRepository::new(
            params.remember_issuer_for_seconds,
        )),
        sender,
        params,
    );

    TestContext {
        server,
        client,
        storage,
        events,
    }
}

async fn context() -> TestContext {
    context_with(keystore(), |_| {}).await
}

async fn mount_metadata(server: &MockServer, authorization_server: serde_json::Value) {
    let issuer = server.uri();
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-credential-issuer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "credential_issuer": issuer,
            "credential_endpoint": format!("{issuer}/credential"),
            "batch_credential_issuance": { "batch_size": 2 },
            "credential_configurations_supported": {
                CONFIGURATION_ID: {
                    "format": "vc+sd-jwt",
                    "scope": "pid",
                    "vct": "urn:eu.europa.ec.eudi:pid:1",
                    "display": [{ "name": "PID", "locale": "en" }]
                }
            }
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(authorization_server))
        .expect(1)
        .mount(server)
        .await;
}

fn par_authorization_server(issuer: &str) -> serde_json::Value {
    json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/authorize"),
        "token_endpoint": format!("{issuer}/token"),
        "pushed_authorization_request_endpoint": format!("{issuer}/par"),
        "dpop_signing_alg_values_supported": ["ES256"]
    })
}

fn token_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "access-token",
        "token_type": "DPoP",
        "expires_in": 3600,
        "c_nonce": "c-nonce",
        "c_nonce_expires_in": 300
    }))
}

fn credential_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "credentials": [{ "credential": "sd-jwt-1" }, { "credential": "sd-jwt-2" }]
    }))
}

fn offer_url(offer: serde_json::Value) -> String {
    Url::parse_with_params(
        "openid-credential-offer://",
        &[("credential_offer", offer.to_string())],
    )
    .unwrap()
    .to_string()
}

fn pre_authorized_offer(issuer: &str, tx_code: Option<serde_json::Value>) -> String {
    let mut grant = json!({ "pre-authorized_code": "pre-code" });
    if let Some(tx_code) = tx_code {
        grant["tx_code"] = tx_code;
    }
    offer_url(json!({
        "credential_issuer": issuer,
        "credential_configuration_ids": [CONFIGURATION_ID],
        "grants": { "urn:ietf:params:oauth:grant-type:pre-authorized_code": grant }
    }))
}

fn jwt_payload(token: &str) -> serde_json::Value {
    let payload = token.split('.').nth(1).unwrap();
    serde_json::from_slice(&Base64UrlSafeNoPadding::decode_to_vec(payload, None).unwrap()).unwrap()
}

async fn requests_to(server: &MockServer, request_path: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.as_str() == "POST" && request.url.path() == request_path)
        .collect()
}

fn dpop_header(request: &Request) -> serde_json::Value {
    jwt_payload(request.headers.get("DPoP").unwrap().to_str().unwrap())
}

#[tokio::test]
async fn test_handle_credential_offer_is_idempotent() {
    let context = context().await;
    let issuer = context.server.uri();
    mount_metadata(&context.server, par_authorization_server(&issuer)).await;

    let url = offer_url(json!({
        "credential_issuer": issuer,
        "credential_configuration_ids": [CONFIGURATION_ID],
        "grants": { "authorization_code": { "issuer_state": "issuer-state" } }
    }));

    let first = context.client.handle_credential_offer(&url).await.unwrap();
    let second = context.client.handle_credential_offer(&url).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.credential_issuer, issuer);
    assert_eq!(first.selected_credential_configuration_id, CONFIGURATION_ID);
    assert_eq!(first.issuer_state.as_deref(), Some("issuer-state"));
    assert!(first.pre_authorized_code.is_none());
}

#[tokio::test]
async fn test_handle_credential_offer_by_reference() {
    let context = context().await;
    let issuer = context.server.uri();
    mount_metadata(&context.server, par_authorization_server(&issuer)).await;

    Mock::given(method("GET"))
        .and(path("/offer/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "credential_issuer": issuer,
            "credential_configuration_ids": [CONFIGURATION_ID],
            "grants": { "authorization_code": {} }
        })))
        .expect(1)
        .mount(&context.server)
        .await;

    let url = Url::parse_with_params(
        "openid-credential-offer://",
        &[("credential_offer_uri", format!("{issuer}/offer/1"))],
    )
    .unwrap();

    let result = context
        .client
        .handle_credential_offer(url.as_str())
        .await
        .unwrap();
    assert_eq!(result.selected_credential_configuration_id, CONFIGURATION_ID);
    assert_eq!(result.issuer_state, None);
}

#[tokio::test]
async fn test_handle_credential_offer_rejects_both_parameters() {
    let context = context().await;
    let url = "openid-credential-offer://?credential_offer=%7B%7D&credential_offer_uri=https%3A%2F%2Fissuer.example%2Foffer";

    assert!(matches!(
        context.client.handle_credential_offer(url).await,
        Err(OpenID4VCIError::InvalidOffer(_))
    ));
}

#[tokio::test]
async fn test_handle_credential_offer_rejects_insecure_reference() {
    let context = context_with(keystore(), |params| {
        params.allow_insecure_http_transport = false
    })
    .await;

    let url = "openid-credential-offer://?credential_offer_uri=http%3A%2F%2Fissuer.example%2Foffer";
    assert!(matches!(
        context.client.handle_credential_offer(url).await,
        Err(OpenID4VCIError::InsecureTransport(_))
    ));
}

#[tokio::test]
async fn test_handle_credential_offer_without_grants() {
    let context = context().await;
    let url = offer_url(json!({
        "credential_issuer": context.server.uri(),
        "credential_configuration_ids": [CONFIGURATION_ID]
    }));

    assert!(matches!(
        context.client.handle_credential_offer(&url).await,
        Err(OpenID4VCIError::UnsupportedGrant)
    ));
}

#[tokio::test]
async fn test_handle_credential_offer_from_other_issuer() {
    let context = context().await;
    let url = offer_url(json!({
        "credential_issuer": "https://other-issuer.example",
        "credential_configuration_ids": [CONFIGURATION_ID],
        "grants": { "authorization_code": {} }
    }));

    assert!(matches!(
        context.client.handle_credential_offer(&url).await,
        Err(OpenID4VCIError::IssuerMismatch { .. })
    ));
}

#[tokio::test]
async fn test_handle_credential_offer_with_unknown_configuration() {
    let context = context().await;
    let issuer = context.server.uri();
    mount_metadata(&context.server, par_authorization_server(&issuer)).await;

    let url = offer_url(json!({
        "credential_issuer": issuer,
        "credential_configuration_ids": ["org.iso.18013.5.1.mDL"],
        "grants": { "authorization_code": {} }
    }));

    assert!(matches!(
        context.client.handle_credential_offer(&url).await,
        Err(OpenID4VCIError::UnknownConfiguration(id)) if id == "org.iso.18013.5.1.mDL"
    ));
}

#[tokio::test]
async fn test_pid_issuance_with_pushed_authorization_request() {
    let mut context = context().await;
    let issuer = context.server.uri();
    mount_metadata(&context.server, par_authorization_server(&issuer)).await;

    Mock::given(method("POST"))
        .and(path("/par"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "request_uri": "urn:ietf:params:oauth:request_uri:par-1",
            "expires_in": 60
        })))
        .expect(1)
        .mount(&context.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .respond_with(token_response())
        .expect(1)
        .mount(&context.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/credential"))
        .and(header("Authorization", "DPoP access-token"))
        .respond_with(credential_response())
        .expect(1)
        .mount(&context.server)
        .await;

    let redirect = context
        .client
        .generate_authorization_request(CONFIGURATION_ID, "alice", Some("issuer-state".to_owned()))
        .await
        .unwrap();
    let AuthorizationRequestResult::Redirect { url } = redirect else {
        panic!("expected a redirect");
    };
    let url = Url::parse(&url).unwrap();
    assert_eq!(url.path(), "/authorize");
    let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(query["client_id"], "wallet");
    assert_eq!(query["request_uri"], "urn:ietf:params:oauth:request_uri:par-1");

    let par = requests_to(&context.server, "/par").await;
    let form: HashMap<String, String> = serde_urlencoded::from_bytes(&par[0].body).unwrap();
    assert_eq!(form["code_challenge_method"], "S256");
    assert_eq!(form["issuer_state"], "issuer-state");
    assert_eq!(form["scope"], "pid");
    assert!(form["authorization_details"].contains(CONFIGURATION_ID));
    let state = form["state"].to_owned();

    let callback = format!("https://wallet.example/callback?code=auth-code&state={state}");
    let result = context
        .client
        .handle_authorization_response(&callback, "alice", None)
        .await
        .unwrap();

    assert_eq!(result.credentials.len(), 2);
    assert!(result
        .credentials
        .iter()
        .all(|credential| credential.batch_id == result.batch_id && credential.sig_count == 0));
    assert_eq!(
        result
            .credentials
            .iter()
            .map(|credential| credential.instance_id)
            .collect::<Vec<_>>(),
        vec![0, 1]
    );
    assert_eq!(result.credentials[0].credential, "sd-jwt-1");
    assert_eq!(result.credentials[0].credential_configuration_id, CONFIGURATION_ID);

    let credential_request = &requests_to(&context.server, "/credential").await[0];
    let body: serde_json::Value = serde_json::from_slice(&credential_request.body).unwrap();
    let proofs = body["proofs"]["jwt"].as_array().unwrap();
    assert_eq!(proofs.len(), 2);
    let key_proof = jwt_payload(proofs[0].as_str().unwrap());
    assert_eq!(key_proof["nonce"], "c-nonce");
    assert_eq!(key_proof["aud"], issuer);
    assert!(dpop_header(credential_request)["ath"].is_string());

    assert_eq!(context.storage.get_credentials().await.unwrap().len(), 2);
    assert_eq!(
        context.events.try_recv().unwrap(),
        WalletEvent::NewCredential {
            batch_id: result.batch_id,
            credential_issuer: issuer,
            credential_configuration_id: CONFIGURATION_ID.to_owned(),
            instances: 2,
        }
    );

    assert!(matches!(
        context
            .client
            .handle_authorization_response(&callback, "alice", None)
            .await,
        Err(OpenID4VCIError::StateAlreadyUsed)
    ));
}

#[tokio::test]
async fn test_authorization_response_with_unknown_state() {
    let context = context().await;

    assert!(matches!(
        context
            .client
            .handle_authorization_response(
                "https://wallet.example/callback?code=c&state=unknown",
                "alice",
                None
            )
            .await,
        Err(OpenID4VCIError::UnknownState)
    ));
}

#[tokio::test]
async fn test_authorization_response_with_error() {
    let context = context().await;

    assert!(matches!(
        context
            .client
            .handle_authorization_response(
                "https://wallet.example/callback?error=access_denied&state=s",
                "alice",
                None
            )
            .await,
        Err(OpenID4VCIError::AuthorizationDenied(error)) if error == "access_denied"
    ));
}

#[tokio::test]
async fn test_first_party_authorization_needs_no_redirect() {
    let context = context().await;
    let issuer = context.server.uri();
    mount_metadata(
        &context.server,
        json!({
            "issuer": issuer,
            "token_endpoint": format!("{issuer}/token"),
            "authorization_challenge_endpoint": format!("{issuer}/authorize-challenge")
        }),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/authorize-challenge"))
        .and(body_string_contains("code_challenge_method=S256"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "authorization_code": "fp-code" })),
        )
        .expect(1)
        .mount(&context.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("code=fp-code"))
        .respond_with(token_response())
        .expect(1)
        .mount(&context.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/credential"))
        .respond_with(credential_response())
        .expect(1)
        .mount(&context.server)
        .await;

    let result = context
        .client
        .generate_authorization_request(CONFIGURATION_ID, "alice", None)
        .await
        .unwrap();

    let AuthorizationRequestResult::Issued(issued) = result else {
        panic!("expected issued credentials");
    };
    assert_eq!(issued.credentials.len(), 2);
}

#[tokio::test]
async fn test_token_request_retries_once_with_dpop_nonce() {
    let context = context().await;
    let issuer = context.server.uri();
    mount_metadata(&context.server, par_authorization_server(&issuer)).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header("DPoP-Nonce", "server-nonce")
                .set_body_json(json!({ "error": "use_dpop_nonce" })),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&context.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("pre-authorized_code=pre-code"))
        .respond_with(token_response())
        .expect(1)
        .mount(&context.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/credential"))
        .respond_with(credential_response())
        .expect(1)
        .mount(&context.server)
        .await;

    let offer = context
        .client
        .handle_credential_offer(&pre_authorized_offer(&issuer, None))
        .await
        .unwrap();
    context
        .client
        .pre_authorized_code_grant(offer, "alice", None)
        .await
        .unwrap();

    let token_requests = requests_to(&context.server, "/token").await;
    assert_eq!(token_requests.len(), 2);
    let first = dpop_header(&token_requests[0]);
    let second = dpop_header(&token_requests[1]);
    assert_ne!(first["jti"], second["jti"]);
    assert!(first.get("nonce").is_none());
    assert_eq!(second["nonce"], "server-nonce");
    assert_eq!(second["htm"], "POST");
    assert_eq!(second["htu"], format!("{issuer}/token"));
}

#[tokio::test]
async fn test_dpop_nonce_is_retried_only_once() {
    let context = context().await;
    let issuer = context.server.uri();
    mount_metadata(&context.server, par_authorization_server(&issuer)).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header("DPoP-Nonce", "server-nonce")
                .set_body_json(json!({ "error": "use_dpop_nonce" })),
        )
        .expect(2)
        .mount(&context.server)
        .await;

    let offer = context
        .client
        .handle_credential_offer(&pre_authorized_offer(&issuer, None))
        .await
        .unwrap();

    assert!(matches!(
        context
            .client
            .pre_authorized_code_grant(offer, "alice", None)
            .await,
        Err(OpenID4VCIError::TokenRequestFailed(error)) if error == "use_dpop_nonce"
    ));
}

#[tokio::test]
async fn test_credential_request_retry_reuses_proofs() {
    let mut keystore = MockHolderKeystore::default();
    keystore
        .expect_generate_holder_keys()
        .times(1)
        .returning(|count| {
            Ok((0..count)
                .map(|index| HolderKeyRef {
                    key_id: format!("holder-{index}"),
                    public_jwk: EcPublicJwk::from_sec1(&EcKeySigner::random().public_key)
                        .unwrap(),
                })
                .collect())
        });
    keystore.expect_sign().returning(|_, _| Ok(vec![7; 64]));
    keystore
        .expect_add_credentials()
        .times(1)
        .returning(|_| Ok(()));

    let context = context_with(keystore, |_| {}).await;
    let issuer = context.server.uri();
    mount_metadata(&context.server, par_authorization_server(&issuer)).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_response())
        .expect(1)
        .mount(&context.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/credential"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("DPoP-Nonce", "resource-nonce")
                .set_body_json(json!({ "error": "invalid_dpop_proof" })),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&context.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/credential"))
        .respond_with(credential_response())
        .expect(1)
        .mount(&context.server)
        .await;

    let offer = context
        .client
        .handle_credential_offer(&pre_authorized_offer(&issuer, None))
        .await
        .unwrap();
    context
        .client
        .pre_authorized_code_grant(offer, "alice", None)
        .await
        .unwrap();

    let credential_requests = requests_to(&context.server, "/credential").await;
    assert_eq!(credential_requests.len(), 2);
    assert_eq!(credential_requests[0].body, credential_requests[1].body);
    assert_ne!(
        dpop_header(&credential_requests[0])["jti"],
        dpop_header(&credential_requests[1])["jti"]
    );
    assert_eq!(dpop_header(&credential_requests[1])["nonce"], "resource-nonce");
}

#[tokio::test]
async fn test_pre_authorized_grant_requires_tx_code() {
    let context = context().await;
    let issuer = context.server.uri();
    mount_metadata(&context.server, par_authorization_server(&issuer)).await;

    let offer = context
        .client
        .handle_credential_offer(&pre_authorized_offer(
            &issuer,
            Some(json!({ "input_mode": "numeric", "length": 4 })),
        ))
        .await
        .unwrap();

    assert!(matches!(
        context
            .client
            .pre_authorized_code_grant(offer, "alice", None)
            .await,
        Err(OpenID4VCIError::TxCodeRequired)
    ));
}

#[tokio::test]
async fn test_pre_authorized_grant_with_wrong_tx_code() {
    let context = context().await;
    let issuer = context.server.uri();
    mount_metadata(&context.server, par_authorization_server(&issuer)).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("tx_code=0000"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
        )
        .expect(1)
        .mount(&context.server)
        .await;

    let offer = context
        .client
        .handle_credential_offer(&pre_authorized_offer(
            &issuer,
            Some(json!({ "input_mode": "numeric", "length": 4 })),
        ))
        .await
        .unwrap();

    assert!(matches!(
        context
            .client
            .pre_authorized_code_grant(offer, "alice", Some("0000".to_owned()))
            .await,
        Err(OpenID4VCIError::InvalidTxCode)
    ));
}

#[tokio::test]
async fn test_deferred_issuance_is_not_supported() {
    let mut keystore = MockHolderKeystore::default();
    keystore.expect_generate_holder_keys().returning(|_| {
        Ok(vec![HolderKeyRef {
            key_id: "holder-0".to_owned(),
            public_jwk: EcPublicJwk::from_sec1(&EcKeySigner::random().public_key).unwrap(),
        }])
    });
    keystore.expect_sign().returning(|_, _| Ok(vec![7; 64]));
    keystore.expect_add_credentials().never();

    let context = context_with(keystore, |params| params.batch_size = 1).await;
    let issuer = context.server.uri();
    mount_metadata(&context.server, par_authorization_server(&issuer)).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_response())
        .mount(&context.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/credential"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "transaction_id": "tx-1" })))
        .mount(&context.server)
        .await;

    let offer = context
        .client
        .handle_credential_offer(&pre_authorized_offer(&issuer, None))
        .await
        .unwrap();

    assert!(matches!(
        context
            .client
            .pre_authorized_code_grant(offer, "alice", None)
            .await,
        Err(OpenID4VCIError::DeferredIssuanceNotSupported)
    ));

    let credential_request = &requests_to(&context.server, "/credential").await[0];
    let body: serde_json::Value = serde_json::from_slice(&credential_request.body).unwrap();
    assert_eq!(body["proof"]["proof_type"], "jwt");
    assert!(body.get("proofs").is_none());
}

#[tokio::test]
async fn test_more_credentials_than_proofs_are_rejected() {
    let context = context().await;
    let issuer = context.server.uri();
    mount_metadata(&context.server, par_authorization_server(&issuer)).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_response())
        .mount(&context.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/credential"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "credentials": [
                { "credential": "sd-jwt-1" },
                { "credential": "sd-jwt-2" },
                { "credential": "sd-jwt-3" }
            ]
        })))
        .mount(&context.server)
        .await;

    let offer = context
        .client
        .handle_credential_offer(&pre_authorized_offer(&issuer, None))
        .await
        .unwrap();

    assert!(matches!(
        context
            .client
            .pre_authorized_code_grant(offer, "alice", None)
            .await,
        Err(OpenID4VCIError::CredentialRequestFailed(_))
    ));
    assert!(context.storage.get_credentials().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_active_access_token_is_reused() {
    let context = context().await;
    let issuer = context.server.uri();
    mount_metadata(&context.server, par_authorization_server(&issuer)).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_response())
        .expect(1)
        .mount(&context.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/credential"))
        .respond_with(credential_response())
        .expect(2)
        .mount(&context.server)
        .await;

    let offer = context
        .client
        .handle_credential_offer(&pre_authorized_offer(&issuer, None))
        .await
        .unwrap();
    let first = context
        .client
        .pre_authorized_code_grant(offer, "alice", None)
        .await
        .unwrap();

    let second = context
        .client
        .generate_authorization_request(CONFIGURATION_ID, "alice", None)
        .await
        .unwrap();

    let AuthorizationRequestResult::Issued(second) = second else {
        panic!("expected issued credentials");
    };
    assert_ne!(first.batch_id, second.batch_id);
}

#[tokio::test]
async fn test_rejected_access_token_starts_new_authorization() {
    let context = context().await;
    let issuer = context.server.uri();
    mount_metadata(&context.server, par_authorization_server(&issuer)).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_response())
        .expect(1)
        .mount(&context.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/credential"))
        .respond_with(credential_response())
        .up_to_n_times(1)
        .expect(1)
        .mount(&context.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/credential"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_token"
        })))
        .expect(1)
        .mount(&context.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/par"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "request_uri": "urn:ietf:params:oauth:request_uri:par-1"
        })))
        .expect(1)
        .mount(&context.server)
        .await;

    let offer = context
        .client
        .handle_credential_offer(&pre_authorized_offer(&issuer, None))
        .await
        .unwrap();
    context
        .client
        .pre_authorized_code_grant(offer, "alice", None)
        .await
        .unwrap();

    let result = context
        .client
        .generate_authorization_request(CONFIGURATION_ID, "alice", None)
        .await
        .unwrap();

    let AuthorizationRequestResult::Redirect { url } = result else {
        panic!("expected a redirect to the authorization endpoint");
    };
    let url = Url::parse(&url).unwrap();
    assert_eq!(url.path(), "/authorize");
    let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(
        query.get("request_uri").map(String::as_str),
        Some("urn:ietf:params:oauth:request_uri:par-1")
    );
}

#[tokio::test]
async fn test_sweep_expired_flows() {
    let context = context().await;
    let issuer = context.server.uri();
    mount_metadata(&context.server, par_authorization_server(&issuer)).await;

    Mock::given(method("POST"))
        .and(path("/par"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "request_uri": "urn:ietf:params:oauth:request_uri:par-1"
        })))
        .mount(&context.server)
        .await;

    context
        .client
        .generate_authorization_request(CONFIGURATION_ID, "alice", None)
        .await
        .unwrap();

    let now = OffsetDateTime::now_utc();
    assert_eq!(context.client.sweep_expired_flows(now).await, 0);
    assert_eq!(
        context
            .client
            .sweep_expired_flows(now + Duration::hours(2))
            .await,
        1
    );
}
