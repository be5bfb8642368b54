use serde_json::json;
use zeroize::Zeroizing;

use super::{prf_output, MockPrfClient, PrfAssertion, PrfCredential, PrfExtensionInput, PrfOutcome};
use crate::keystore::error::KeystoreError;

#[test]
fn test_registration_extension_input() {
    let input = PrfExtensionInput::registration(&[0xfb, 0xff]).unwrap();

    assert_eq!(
        serde_json::to_value(input).unwrap(),
        json!({"eval": {"first": "-_8"}})
    );
}

#[test]
fn test_authentication_extension_input() {
    let input = PrfExtensionInput::authentication(&[PrfCredential {
        credential_id: "cred-1".to_owned(),
        salt: vec![1, 2, 3],
    }])
    .unwrap();

    assert_eq!(
        serde_json::to_value(input).unwrap(),
        json!({"evalByCredential": {"cred-1": {"first": "AQID"}}})
    );
}

#[tokio::test]
async fn test_output_on_first_attempt_does_not_retry() {
    let client = MockPrfClient::new();

    let (credential_id, output) = prf_output(
        &client,
        PrfAssertion {
            credential_id: "cred-1".to_owned(),
            outcome: PrfOutcome::Output(Zeroizing::new(vec![1; 32])),
        },
        vec![],
    )
    .await
    .unwrap();

    assert_eq!(credential_id, "cred-1");
    assert_eq!(output.as_slice(), &[1; 32]);
}

#[tokio::test]
async fn test_unsupported_after_retry() {
    let mut client = MockPrfClient::new();
    client.expect_authenticate().times(1).returning(|_| {
        Ok(PrfAssertion {
            credential_id: "cred-1".to_owned(),
            outcome: PrfOutcome::Unsupported,
        })
    });

    let result = prf_output(
        &client,
        PrfAssertion {
            credential_id: "cred-1".to_owned(),
            outcome: PrfOutcome::Missing,
        },
        vec![],
    )
    .await;

    assert!(matches!(result, Err(KeystoreError::PrfNotSupported)));
}
