use std::sync::Arc;

use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{HttpPrivateDataSync, PrivateDataSync, RemotePrivateData};
use crate::http_client::imp::reqwest_client::ReqwestClient;
use crate::keystore::error::SyncError;

fn sync(mock_server: &MockServer) -> HttpPrivateDataSync {
    HttpPrivateDataSync::new(Arc::new(ReqwestClient::default()), mock_server.uri())
}

#[tokio::test]
async fn test_upload_sends_precondition_and_returns_new_etag() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/user/session/private-data"))
        .and(header("X-Private-Data-If-Match", "etag-1"))
        .and(body_string(r#"{"version":"2"}"#))
        .respond_with(ResponseTemplate::new(204).insert_header("X-Private-Data-Etag", "etag-2"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let etag = sync(&mock_server)
        .update_private_data(r#"{"version":"2"}"#.to_owned(), Some("etag-1".to_owned()))
        .await
        .unwrap();

    assert_eq!(etag, "etag-2");
}

#[tokio::test]
async fn test_upload_conflict() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/user/session/private-data"))
        .respond_with(ResponseTemplate::new(412).insert_header("X-Private-Data-Etag", "etag-9"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = sync(&mock_server)
        .update_private_data("{}".to_owned(), Some("etag-1".to_owned()))
        .await;

    assert!(matches!(
        result,
        Err(SyncError::PreconditionFailed { etag: Some(etag) }) if etag == "etag-9"
    ));
}

#[tokio::test]
async fn test_upload_without_etag_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/user/session/private-data"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let result = sync(&mock_server)
        .update_private_data("{}".to_owned(), None)
        .await;

    assert!(matches!(result, Err(SyncError::MissingHeader(_))));
}

#[tokio::test]
async fn test_fetch_latest() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/user/session/private-data"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Private-Data-Etag", "etag-3")
                .set_body_string("container"),
        )
        .mount(&mock_server)
        .await;

    let remote = sync(&mock_server).fetch_private_data().await.unwrap();

    assert_eq!(
        remote,
        Some(RemotePrivateData {
            container: "container".to_owned(),
            etag: "etag-3".to_owned(),
        })
    );
}

#[tokio::test]
async fn test_fetch_when_nothing_stored() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/user/session/private-data"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    assert_eq!(sync(&mock_server).fetch_private_data().await.unwrap(), None);
}
