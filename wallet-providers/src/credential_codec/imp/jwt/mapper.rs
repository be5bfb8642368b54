use ct_codecs::{Base64UrlSafeNoPadding, Encoder};

use crate::credential_codec::error::CodecError;

pub fn bin_to_b64url_string(bin: &[u8]) -> Result<String, CodecError> {
    Base64UrlSafeNoPadding::encode_to_string(bin)
        .map_err(|e| CodecError::CouldNotFormat(e.to_string()))
}

pub fn string_to_b64url_string(string: &str) -> Result<String, CodecError> {
    Base64UrlSafeNoPadding::encode_to_string(string)
        .map_err(|e| CodecError::CouldNotFormat(e.to_string()))
}

pub fn json_from_decoded(decoded: Vec<u8>) -> Result<String, CodecError> {
    let result = String::from_utf8(decoded)
        .map_err(|e| CodecError::CouldNotExtractCredentials(e.to_string()))?;
    Ok(result)
}
