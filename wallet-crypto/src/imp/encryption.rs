use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{AeadCore, ChaCha20Poly1305, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::EncryptionError;

pub const NONCE_LENGTH: usize = 12;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedData {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

pub fn generate_key() -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(key.as_mut());
    key
}

pub fn encrypt_data(
    key: &[u8; 32],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<SealedData, EncryptionError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|err| EncryptionError::Encrypt(err.to_string()))?;

    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|err| EncryptionError::Encrypt(err.to_string()))?;

    Ok(SealedData {
        nonce: nonce.to_vec(),
        ciphertext,
    })
}

pub fn decrypt_data(
    key: &[u8; 32],
    sealed: &SealedData,
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, EncryptionError> {
    if sealed.nonce.len() != NONCE_LENGTH {
        return Err(EncryptionError::Decrypt);
    }

    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptionError::Decrypt)?;
    let nonce = Nonce::from_slice(&sealed.nonce);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &sealed.ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| EncryptionError::Decrypt)
}
