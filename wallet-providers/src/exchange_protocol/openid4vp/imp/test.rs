use std::sync::Arc;

use maplit::hashmap;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::OpenID4VPEngineImpl;
use crate::common_models::credential::{CredentialFormat, StorableCredential};
use crate::common_models::event::WalletEvent;
use crate::common_models::jwk::EcPublicJwk;
use crate::credential_codec::model::{CredentialDisplay, CredentialMetadata, ParsedCredential};
use crate::credential_codec::registry::MockCredentialParserRegistry;
use crate::credential_codec::MockCredentialPresenter;
use crate::credential_storage::imp::in_memory::InMemoryCredentialStorage;
use crate::credential_storage::CredentialStorage;
use crate::exchange_protocol::openid4vp::error::OpenID4VPError;
use crate::exchange_protocol::openid4vp::model::OpenID4VPParams;
use crate::exchange_protocol::openid4vp::{
    MockVerifierTrustProbe, OpenID4VPEngine, VerifierTrustProbe,
};
use crate::http_client::imp::reqwest_client::ReqwestClient;
use crate::http_client::HttpClient;
use crate::keystore::MockHolderKeystore;
use crate::test_utilities::{sign_jwt, test_crypto, EcKeySigner, OTHER_DOMAIN_CERT, VERIFIER_CERT};
use crate::util::json_path::PathSegment;

const VERIFIER_HOST: &str = "verifier.example.com";
const NONCE: &str = "n-0S6_WzA2Mj";

struct TestContext {
    server: MockServer,
    base_url: String,
    client: Arc<dyn HttpClient>,
    storage: Arc<InMemoryCredentialStorage>,
    events: broadcast::Receiver<WalletEvent>,
    sender: broadcast::Sender<WalletEvent>,
}

/// Verifier host names resolve to the mock server.
async fn context() -> TestContext {
    let server = MockServer::start().await;
    let address = *server.address();

    let client = reqwest::Client::builder()
        .resolve(VERIFIER_HOST, address)
        .resolve("www.verifier.example.com", address)
        .build()
        .unwrap();

    let (sender, events) = broadcast::channel(8);

    TestContext {
        base_url: format!("http://{VERIFIER_HOST}:{}", address.port()),
        server,
        client: Arc::new(ReqwestClient::new(client)),
        storage: Arc::new(InMemoryCredentialStorage::default()),
        events,
        sender,
    }
}

fn engine(
    context: &TestContext,
    keystore: MockHolderKeystore,
    presenter: MockCredentialPresenter,
    probe: Option<Arc<dyn VerifierTrustProbe>>,
) -> OpenID4VPEngineImpl {
    let mut registry = MockCredentialParserRegistry::default();
    registry.expect_parse().returning(|raw, _| {
        let claims = if raw.contains("pid") {
            json!({
                "vct": "urn:eudi:pid:1",
                "given_name": "Erika",
                "address": {"locality": "Koeln"}
            })
        } else {
            json!({"vct": "urn:example:loyalty:1"})
        };
        Ok(Arc::new(parsed(claims)))
    });

    OpenID4VPEngineImpl::new(
        context.client.clone(),
        test_crypto(),
        Arc::new(registry),
        Arc::new(presenter),
        Arc::new(keystore),
        context.storage.clone(),
        context.sender.clone(),
        probe,
        OpenID4VPParams {
            allow_insecure_http_transport: true,
            corroborate_verifier_tls: true,
        },
    )
}

fn parsed(signed_claims: Value) -> ParsedCredential {
    ParsedCredential {
        format: CredentialFormat::SdJwt,
        issuer: Some("https://issuer.example.com".to_owned()),
        credential_type: None,
        signed_claims,
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

fn stored(id: &str, raw: &str) -> StorableCredential {
    StorableCredential {
        credential_identifier: id.to_owned(),
        credential: raw.to_owned(),
        format: CredentialFormat::SdJwt,
        credential_configuration_id: "pid".to_owned(),
        credential_issuer_identifier: "https://issuer.example.com".to_owned(),
        sig_count: 0,
        instance_id: 0,
        batch_id: Uuid::new_v4(),
    }
}

fn keystore_with_credentials(times: usize) -> MockHolderKeystore {
    let mut keystore = MockHolderKeystore::default();
    keystore
        .expect_credentials()
        .times(times)
        .returning(|| Ok(vec![stored("c1", "pid-credential"), stored("c2", "loyalty-card")]));
    keystore
}

fn pid_descriptor(id: &str) -> Value {
    json!({
        "id": id,
        "format": {"dc+sd-jwt": {"sd-jwt_alg_values": ["ES256"], "kb-jwt_alg_values": ["ES256"]}},
        "constraints": {
            "limit_disclosure": "required",
            "fields": [
                {"path": ["$.vct"], "filter": {"type": "string", "const": "urn:eudi:pid:1"}},
                {"path": ["$.given_name"]},
                {"path": ["$.address.locality"]}
            ]
        }
    })
}

fn presentation_definition() -> Value {
    json!({"id": "pd-1", "input_descriptors": [pid_descriptor("pid")]})
}

fn request_object(context: &TestContext, certificate: &str, overrides: Value) -> String {
    let mut payload = json!({
        "client_id": format!("x509_san_dns:{VERIFIER_HOST}"),
        "client_id_scheme": "x509_san_dns",
        "response_type": "vp_token",
        "response_mode": "direct_post",
        "response_uri": format!("{}/response", context.base_url),
        "nonce": NONCE,
        "state": "state-1",
        "presentation_definition": presentation_definition(),
    });
    if let (Some(payload), Some(overrides)) = (payload.as_object_mut(), overrides.as_object()) {
        payload.extend(overrides.clone());
    }

    sign_jwt(
        json!({"alg": "ES256", "typ": "oauth-authz-req+jwt", "x5c": [certificate]}),
        payload,
        &EcKeySigner::fixture(),
    )
}

async fn serve_request_object(context: &TestContext, token: String) -> String {
    Mock::given(method("GET"))
        .and(path("/request"))
        .respond_with(ResponseTemplate::new(200).set_body_string(token))
        .mount(&context.server)
        .await;

    let mut url = Url::parse("openid4vp://authorize").unwrap();
    url.query_pairs_mut()
        .append_pair("client_id", &format!("x509_san_dns:{VERIFIER_HOST}"))
        .append_pair("request_uri", &format!("{}/request", context.base_url));
    url.to_string()
}

fn by_value_url(presentation_definition: &Value) -> String {
    let mut url = Url::parse("openid4vp://authorize").unwrap();
    url.query_pairs_mut()
        .append_pair("client_id", "https://verifier.example.com/response")
        .append_pair("response_type", "vp_token")
        .append_pair("response_mode", "direct_post")
        .append_pair("response_uri", "https://verifier.example.com/response")
        .append_pair("nonce", NONCE)
        .append_pair("presentation_definition", &presentation_definition.to_string());
    url.to_string()
}

fn trusting_probe() -> Option<Arc<dyn VerifierTrustProbe>> {
    let mut probe = MockVerifierTrustProbe::default();
    probe
        .expect_corroborate()
        .returning(|host, _| Ok(host == VERIFIER_HOST));
    Some(Arc::new(probe))
}

#[tokio::test]
async fn test_signed_request_is_matched_and_answered() {
    let mut context = context().await;
    let token = request_object(&context, VERIFIER_CERT, json!({}));
    let url = serve_request_object(&context, token).await;

    Mock::given(method("POST"))
        .and(path("/response"))
        .and(body_string_contains("vp_token=presented-credential"))
        .and(body_string_contains("state=state-1"))
        .and(body_string_contains("presentation_submission="))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"redirect_uri": "https://verifier.example.com/done"})),
        )
        .expect(1)
        .mount(&context.server)
        .await;

    let holder = EcKeySigner::random();
    let holder_jwk = EcPublicJwk::from_sec1(&holder.public_key).unwrap();

    let mut presenter = MockCredentialPresenter::default();
    presenter
        .expect_holder_key()
        .returning(move |_| Ok(Some(holder_jwk.clone())));
    presenter
        .expect_prepare_presentation()
        .withf(|raw, paths, key_binding| {
            let (params, _) = key_binding.as_ref().unwrap();
            raw == "pid-credential"
                && paths.len() == 3
                && paths[1] == vec![PathSegment::Key("given_name".to_owned())]
                && params.audience == format!("x509_san_dns:{VERIFIER_HOST}")
                && params.nonce == NONCE
        })
        .returning(|_, _, _| Ok("presented-credential".to_owned()));

    let mut keystore = keystore_with_credentials(2);
    keystore
        .expect_record_presentation()
        .withf(|record| {
            record.credential_identifiers == vec!["c1".to_owned()]
                && record.verifier_domain == VERIFIER_HOST
                && record.presentation_submission["descriptor_map"][0]["format"] == "vc+sd-jwt"
        })
        .once()
        .returning(|_| Ok(()));

    let engine = engine(&context, keystore, presenter, trusting_probe());

    let result = engine.handle_authorization_request(&url).await.unwrap();
    assert_eq!(result.verifier_domain_name, VERIFIER_HOST);
    let conformant = &result.conformant_credentials_map["pid"];
    assert_eq!(conformant.credentials, vec!["c1".to_owned()]);
    assert_eq!(
        conformant.requested_fields,
        vec!["vct".to_owned(), "given_name".to_owned(), "address.locality".to_owned()]
    );

    let redirect = engine
        .send_authorization_response(hashmap! { "pid".to_owned() => "c1".to_owned() })
        .await
        .unwrap();
    assert_eq!(redirect.as_deref(), Some("https://verifier.example.com/done"));

    assert_eq!(context.storage.get_presentations().await.unwrap().len(), 1);
    assert!(matches!(
        context.events.try_recv().unwrap(),
        WalletEvent::PresentationSent { verifier_domain, .. } if verifier_domain == VERIFIER_HOST
    ));

    assert!(matches!(
        engine
            .send_authorization_response(hashmap! { "pid".to_owned() => "c1".to_owned() })
            .await,
        Err(OpenID4VPError::NoPresentationInProgress)
    ));
}

#[tokio::test]
async fn test_san_mismatch_stores_no_presentation_state() {
    let context = context().await;
    let token = request_object(&context, OTHER_DOMAIN_CERT, json!({}));
    let url = serve_request_object(&context, token).await;

    let engine = engine(
        &context,
        MockHolderKeystore::default(),
        MockCredentialPresenter::default(),
        None,
    );

    assert!(matches!(
        engine.handle_authorization_request(&url).await,
        Err(OpenID4VPError::NontrustedVerifier(_))
    ));
    assert!(matches!(
        engine
            .send_authorization_response(hashmap! { "pid".to_owned() => "c1".to_owned() })
            .await,
        Err(OpenID4VPError::NoPresentationInProgress)
    ));
}

#[tokio::test]
async fn test_request_uri_host_must_match_response_uri_host() {
    let context = context().await;
    let response_uri = format!(
        "http://www.verifier.example.com:{}/response",
        context.server.address().port()
    );
    let token = request_object(&context, VERIFIER_CERT, json!({"response_uri": response_uri}));
    let url = serve_request_object(&context, token).await;

    let engine = engine(
        &context,
        MockHolderKeystore::default(),
        MockCredentialPresenter::default(),
        None,
    );

    assert!(matches!(
        engine.handle_authorization_request(&url).await,
        Err(OpenID4VPError::NontrustedVerifier(reason)) if reason.contains("request_uri")
    ));
}

#[tokio::test]
async fn test_request_object_without_certificate_is_not_trusted() {
    let context = context().await;
    let token = sign_jwt(
        json!({"alg": "ES256", "typ": "oauth-authz-req+jwt"}),
        json!({"client_id": VERIFIER_HOST, "nonce": NONCE}),
        &EcKeySigner::fixture(),
    );
    let url = serve_request_object(&context, token).await;

    let engine = engine(
        &context,
        MockHolderKeystore::default(),
        MockCredentialPresenter::default(),
        None,
    );

    assert!(matches!(
        engine.handle_authorization_request(&url).await,
        Err(OpenID4VPError::NontrustedVerifier(_))
    ));
}

#[tokio::test]
async fn test_request_object_signed_by_other_key_is_not_trusted() {
    let context = context().await;
    let payload = json!({
        "client_id": format!("x509_san_dns:{VERIFIER_HOST}"),
        "response_uri": format!("{}/response", context.base_url),
        "nonce": NONCE,
        "presentation_definition": presentation_definition(),
    });
    let token = sign_jwt(
        json!({"alg": "ES256", "typ": "oauth-authz-req+jwt", "x5c": [VERIFIER_CERT]}),
        payload,
        &EcKeySigner::random(),
    );
    let url = serve_request_object(&context, token).await;

    let engine = engine(
        &context,
        MockHolderKeystore::default(),
        MockCredentialPresenter::default(),
        None,
    );

    assert!(matches!(
        engine.handle_authorization_request(&url).await,
        Err(OpenID4VPError::NontrustedVerifier(_))
    ));
}

#[tokio::test]
async fn test_san_dns_client_id_must_be_covered_by_certificate() {
    let context = context().await;
    let token = request_object(
        &context,
        VERIFIER_CERT,
        json!({"client_id": "x509_san_dns:wallet-phishing.example.net"}),
    );
    let mut url = Url::parse("openid4vp://authorize").unwrap();
    url.query_pairs_mut()
        .append_pair("request_uri", &format!("{}/request", context.base_url));
    Mock::given(method("GET"))
        .and(path("/request"))
        .respond_with(ResponseTemplate::new(200).set_body_string(token))
        .mount(&context.server)
        .await;

    let engine = engine(
        &context,
        MockHolderKeystore::default(),
        MockCredentialPresenter::default(),
        None,
    );

    assert!(matches!(
        engine.handle_authorization_request(url.as_str()).await,
        Err(OpenID4VPError::NontrustedVerifier(reason)) if reason.contains("client_id")
    ));
}

#[tokio::test]
async fn test_probe_rejection_is_not_trusted() {
    let context = context().await;
    let token = request_object(&context, VERIFIER_CERT, json!({}));
    let url = serve_request_object(&context, token).await;

    let mut probe = MockVerifierTrustProbe::default();
    probe
        .expect_corroborate()
        .once()
        .returning(|_, _| Ok(false));

    let engine = engine(
        &context,
        MockHolderKeystore::default(),
        MockCredentialPresenter::default(),
        Some(Arc::new(probe)),
    );

    assert!(matches!(
        engine.handle_authorization_request(&url).await,
        Err(OpenID4VPError::NontrustedVerifier(_))
    ));
}

#[tokio::test]
async fn test_two_descriptors_rejected_before_matching() {
    let context = context().await;
    let definition = json!({
        "id": "pd-2",
        "input_descriptors": [pid_descriptor("pid"), pid_descriptor("pid-again")]
    });

    let engine = engine(
        &context,
        keystore_with_credentials(0),
        MockCredentialPresenter::default(),
        None,
    );

    assert!(matches!(
        engine.handle_authorization_request(&by_value_url(&definition)).await,
        Err(OpenID4VPError::OnlyOneInputDescriptorIsSupported)
    ));
}

#[tokio::test]
async fn test_insufficient_credentials_leaves_slot_free() {
    let context = context().await;
    let definition = json!({
        "id": "pd-3",
        "input_descriptors": [{
            "id": "mdl",
            "constraints": {"fields": [{"path": ["$.driving_privileges"]}]}
        }]
    });

    let engine = engine(
        &context,
        keystore_with_credentials(2),
        MockCredentialPresenter::default(),
        None,
    );

    for _ in 0..2 {
        assert!(matches!(
            engine.handle_authorization_request(&by_value_url(&definition)).await,
            Err(OpenID4VPError::InsufficientCredentials(id)) if id == "mdl"
        ));
    }
}

#[tokio::test]
async fn test_second_request_while_in_progress() {
    let context = context().await;
    let url = by_value_url(&presentation_definition());

    let engine = engine(
        &context,
        keystore_with_credentials(2),
        MockCredentialPresenter::default(),
        None,
    );

    let result = engine.handle_authorization_request(&url).await.unwrap();
    assert_eq!(result.verifier_domain_name, VERIFIER_HOST);

    assert!(matches!(
        engine.handle_authorization_request(&url).await,
        Err(OpenID4VPError::PresentationInProgress)
    ));

    engine.cancel().await;
    engine.handle_authorization_request(&url).await.unwrap();
}

#[tokio::test]
async fn test_presentation_definition_by_reference() {
    let context = context().await;

    Mock::given(method("GET"))
        .and(path("/definition"))
        .respond_with(ResponseTemplate::new(200).set_body_json(presentation_definition()))
        .expect(1)
        .mount(&context.server)
        .await;

    let mut url = Url::parse("openid4vp://authorize").unwrap();
    url.query_pairs_mut()
        .append_pair("client_id", "verifier")
        .append_pair("response_uri", &format!("{}/response", context.base_url))
        .append_pair("nonce", NONCE)
        .append_pair(
            "presentation_definition_uri",
            &format!("{}/definition", context.base_url),
        );

    let engine = engine(
        &context,
        keystore_with_credentials(1),
        MockCredentialPresenter::default(),
        None,
    );

    let result = engine.handle_authorization_request(url.as_str()).await.unwrap();
    assert!(result.conformant_credentials_map.contains_key("pid"));
}

#[tokio::test]
async fn test_insecure_response_uri_rejected() {
    let context = context().await;
    let mut url = Url::parse("openid4vp://authorize").unwrap();
    url.query_pairs_mut()
        .append_pair("client_id", "verifier")
        .append_pair("response_uri", "http://verifier.example.com/response")
        .append_pair("nonce", NONCE)
        .append_pair("presentation_definition", &presentation_definition().to_string());

    let mut registry = MockCredentialParserRegistry::default();
    registry.expect_parse().never();

    let engine = OpenID4VPEngineImpl::new(
        context.client.clone(),
        test_crypto(),
        Arc::new(registry),
        Arc::new(MockCredentialPresenter::default()),
        Arc::new(MockHolderKeystore::default()),
        context.storage.clone(),
        context.sender.clone(),
        None,
        OpenID4VPParams::default(),
    );

    assert!(matches!(
        engine.handle_authorization_request(url.as_str()).await,
        Err(OpenID4VPError::InsecureTransport(_))
    ));
}

#[tokio::test]
async fn test_verifier_error_still_consumes_state() {
    let context = context().await;
    let token = request_object(&context, VERIFIER_CERT, json!({}));
    let url = serve_request_object(&context, token).await;

    Mock::given(method("POST"))
        .and(path("/response"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_request"})))
        .mount(&context.server)
        .await;

    let mut presenter = MockCredentialPresenter::default();
    presenter.expect_holder_key().returning(|_| Ok(None));
    presenter
        .expect_prepare_presentation()
        .withf(|_, _, key_binding| key_binding.is_none())
        .returning(|_, _, _| Ok("presented-credential".to_owned()));

    let mut keystore = keystore_with_credentials(2);
    keystore.expect_record_presentation().returning(|_| Ok(()));

    let engine = engine(&context, keystore, presenter, None);
    engine.handle_authorization_request(&url).await.unwrap();

    assert!(matches!(
        engine
            .send_authorization_response(hashmap! { "pid".to_owned() => "c1".to_owned() })
            .await,
        Err(OpenID4VPError::VerifierRejected(_))
    ));
    assert!(matches!(
        engine
            .send_authorization_response(hashmap! { "pid".to_owned() => "c1".to_owned() })
            .await,
        Err(OpenID4VPError::NoPresentationInProgress)
    ));
}

#[tokio::test]
async fn test_selection_of_non_conforming_credential() {
    let context = context().await;

    let engine = engine(
        &context,
        keystore_with_credentials(2),
        MockCredentialPresenter::default(),
        None,
    );
    engine
        .handle_authorization_request(&by_value_url(&presentation_definition()))
        .await
        .unwrap();

    assert!(matches!(
        engine
            .send_authorization_response(hashmap! { "pid".to_owned() => "c2".to_owned() })
            .await,
        Err(OpenID4VPError::InvalidSelection(_))
    ));
}
