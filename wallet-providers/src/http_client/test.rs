use std::collections::HashMap;

use maplit::hashmap;
use serde::Serialize;
use wiremock::http::Method as WiremockMethod;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::imp::reqwest_client::ReqwestClient;
use super::{HttpClient, Response, StatusCode};

#[derive(Serialize)]
struct Form {
    grant_type: &'static str,
    code: &'static str,
}

#[test]
fn test_header_get_is_case_insensitive() {
    let response = Response {
        body: vec![],
        headers: hashmap! { "DPoP-Nonce".to_string() => "abc".to_string() },
        status: StatusCode(400),
    };

    assert_eq!(Some(&"abc".to_string()), response.header_get("dpop-nonce"));
    assert!(response.error_for_status().is_err());
}

#[tokio::test]
async fn test_reqwest_client_sends_form_and_dpop_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method(WiremockMethod::POST))
        .and(path("/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(header("authorization", "DPoP token-1"))
        .and(header("dpop", "proof-1"))
        .and(body_string("grant_type=authorization_code&code=abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("DPoP-Nonce", "server-nonce")
                .set_body_json(serde_json::json!({ "ok": true })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ReqwestClient::default();
    let response = client
        .post(&format!("{}/token", mock_server.uri()))
        .dpop_auth("token-1", "proof-1")
        .form(Form {
            grant_type: "authorization_code",
            code: "abc",
        })
        .unwrap()
        .send()
        .await
        .unwrap();

    assert!(response.status.is_success());
    assert_eq!(
        Some(&"server-nonce".to_string()),
        response.header_get("dpop-nonce")
    );
    let body: HashMap<String, bool> = response.json().unwrap();
    assert_eq!(Some(&true), body.get("ok"));
}
