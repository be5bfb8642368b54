use ct_codecs::{Base64UrlSafeNoPadding, Encoder};
use sha2::{Digest, Sha256};

use crate::{Hasher, HasherError};

pub struct SHA256 {}

impl SHA256 {
    /// Content key addressing a cached entry by the bytes it was built from.
    pub fn content_key(input: &[u8]) -> Result<String, HasherError> {
        SHA256 {}.hash_base64(input)
    }
}

impl Hasher for SHA256 {
    fn hash_base64(&self, input: &[u8]) -> Result<String, HasherError> {
        let result = Sha256::digest(input);

        Base64UrlSafeNoPadding::encode_to_string(result).map_err(|_| HasherError::CouldNotHash)
    }

    fn hash(&self, input: &[u8]) -> Result<Vec<u8>, HasherError> {
        Ok(Sha256::digest(input).to_vec())
    }
}
