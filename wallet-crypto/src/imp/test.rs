use super::encryption::{decrypt_data, encrypt_data, generate_key};
use super::hasher::sha256::SHA256;
use super::password::{derive_key, derive_key_with_salt};
use super::prf::{derive_wrapping_key, raw_wrapping_key};
use super::signer::es256::ES256Signer;
use super::utilities;
use crate::{EncryptionError, Hasher, Signer, SignerError};

#[test]
fn test_base64_salt() {
    let result = utilities::generate_salt_base64_16();

    // set for Base64 url no padding
    let allowed_characters = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

    assert!(result.chars().all(|c| allowed_characters.contains(c)));
}

#[test]
fn test_alphanumeric() {
    let expected_len = 254;

    let result = utilities::generate_alphanumeric(expected_len);

    let allowed_characters = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

    assert!(result.chars().all(|c| allowed_characters.contains(c)));
    assert_eq!(result.len(), expected_len);
}

#[test]
fn test_nonces_are_distinct() {
    assert_ne!(utilities::generate_nonce(), utilities::generate_nonce());
    assert_eq!(43, utilities::generate_nonce().len());
}

#[test]
fn test_sha256_hash_base64() {
    let hash = SHA256 {}.hash_base64(b"abc").unwrap();
    assert_eq!("ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0", hash);
}

#[test]
fn test_password_key_derivation_is_deterministic_per_salt() {
    let derived = derive_key("correct horse", 1_000);
    let again = derive_key_with_salt("correct horse", &derived.salt, 1_000);
    assert_eq!(*derived.key, *again);

    let other = derive_key_with_salt("wrong horse", &derived.salt, 1_000);
    assert_ne!(*derived.key, *other);
}

#[test]
fn test_prf_wrapping_key_depends_on_salt_and_info() {
    let output = [7u8; 32];
    let a = derive_wrapping_key(&output, b"salt-a", b"wallet").unwrap();
    let b = derive_wrapping_key(&output, b"salt-b", b"wallet").unwrap();
    let c = derive_wrapping_key(&output, b"salt-a", b"other").unwrap();

    assert_ne!(*a, *b);
    assert_ne!(*a, *c);
    assert_eq!(*a, *derive_wrapping_key(&output, b"salt-a", b"wallet").unwrap());
}

#[test]
fn test_raw_wrapping_key_requires_32_bytes() {
    assert_eq!(
        Err(EncryptionError::InvalidKeyLength {
            expected: 32,
            actual: 16
        }),
        raw_wrapping_key(&[0u8; 16]).map(|_| ())
    );
}

#[test]
fn test_encrypt_decrypt_roundtrip_with_aad() {
    let key = generate_key();
    let sealed = encrypt_data(&key, b"private data", b"v2").unwrap();

    let opened = decrypt_data(&key, &sealed, b"v2").unwrap();
    assert_eq!(b"private data".to_vec(), *opened);

    assert_eq!(
        Err(EncryptionError::Decrypt),
        decrypt_data(&key, &sealed, b"v1").map(|_| ())
    );

    let other_key = generate_key();
    assert_eq!(
        Err(EncryptionError::Decrypt),
        decrypt_data(&other_key, &sealed, b"v2").map(|_| ())
    );
}

#[test]
fn test_es256_sign_and_verify() {
    let (private, public) = ES256Signer::random();
    let signer = ES256Signer {};

    let signature = signer.sign(b"message", &public, &private).unwrap();
    assert_eq!(64, signature.len());

    signer.verify(b"message", &signature, &public).unwrap();
    let uncompressed = ES256Signer::to_uncompressed(&public).unwrap();
    signer.verify(b"message", &signature, &uncompressed).unwrap();

    assert!(matches!(
        signer.verify(b"tampered", &signature, &public),
        Err(SignerError::CouldNotVerify(_))
    ));
}

#[test]
fn test_es256_sign_rejects_mismatched_keypair() {
    let (private, _) = ES256Signer::random();
    let (_, other_public) = ES256Signer::random();

    assert_eq!(
        Err(SignerError::CouldNotExtractKeyPair),
        ES256Signer {}.sign(b"message", &other_public, &private)
    );
}
