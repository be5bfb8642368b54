//! Key derivation from WebAuthn PRF extension outputs.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::EncryptionError;

/// Expands a PRF output into a 256-bit wrapping key.
///
/// `salt` and `info` are stored next to the wrapped key so the derivation can be repeated
/// on the next unlock.
pub fn derive_wrapping_key(
    prf_output: &[u8],
    salt: &[u8],
    info: &[u8],
) -> Result<Zeroizing<[u8; 32]>, EncryptionError> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), prf_output);
    let mut key = Zeroizing::new([0u8; 32]);
    hkdf.expand(info, key.as_mut())
        .map_err(|err| EncryptionError::KeyDerivation(err.to_string()))?;
    Ok(key)
}

/// Older PRF entries used the raw 32-byte output directly as the wrapping key.
pub fn raw_wrapping_key(prf_output: &[u8]) -> Result<Zeroizing<[u8; 32]>, EncryptionError> {
    let key: [u8; 32] =
        prf_output
            .try_into()
            .map_err(|_| EncryptionError::InvalidKeyLength {
                expected: 32,
                actual: prf_output.len(),
            })?;
    Ok(Zeroizing::new(key))
}
