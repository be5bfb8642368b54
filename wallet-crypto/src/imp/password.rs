use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::Sha256;
use zeroize::Zeroizing;

pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

pub struct Key {
    pub key: Zeroizing<[u8; 32]>,
    pub salt: [u8; 32],
}

/// Derives a fresh key with a random salt.
pub fn derive_key(password: &str, iterations: u32) -> Key {
    let salt: [u8; 32] = OsRng.gen();
    Key {
        key: derive_key_with_salt(password, &salt, iterations),
        salt,
    }
}

pub fn derive_key_with_salt(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, key.as_mut());
    key
}
