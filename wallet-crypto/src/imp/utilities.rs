use ct_codecs::{Base64UrlSafeNoPadding, Encoder};
use rand::distributions::{Alphanumeric, DistString};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

pub fn generate_salt_base64_16() -> String {
    let seed = generate_random_seed_16();

    //This operation should be safe as we control the input.
    Base64UrlSafeNoPadding::encode_to_string(seed).unwrap_or_default()
}

pub fn generate_alphanumeric(length: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), length)
}

pub fn generate_random_seed_32() -> [u8; 32] {
    let mut rng = ChaCha20Rng::from_entropy();
    let mut seed = [0u8; 32];
    rng.fill_bytes(&mut seed);
    seed
}

pub fn generate_random_seed_16() -> [u8; 16] {
    let mut rng = ChaCha20Rng::from_entropy();
    let mut seed = [0u8; 16];
    rng.fill_bytes(&mut seed);
    seed
}

/// Random base64url token with 256 bits of entropy, suitable for `state` and `jti` values.
pub fn generate_nonce() -> String {
    Base64UrlSafeNoPadding::encode_to_string(generate_random_seed_32()).unwrap_or_default()
}
