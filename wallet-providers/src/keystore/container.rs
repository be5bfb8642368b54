//! Versioned ciphertext of the private data.
//!
//! Version 1 sealed the data directly with a password derived key inside a cocoon
//! container. Version 2 seals the data with a random main key which is wrapped once per
//! unlock method (password or passkey PRF).

use cocoon::MiniCocoon;
use ct_codecs::{Base64UrlSafeNoPadding, Decoder, Encoder};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use wallet_crypto::imp::encryption::{decrypt_data, encrypt_data, SealedData};
use wallet_crypto::imp::password::derive_key_with_salt;
use wallet_crypto::imp::prf::{derive_wrapping_key, raw_wrapping_key};
use wallet_crypto::imp::utilities::generate_random_seed_32;

use super::error::KeystoreError;
use super::model::PrivateData;

pub(crate) const DATA_AAD: &[u8] = b"wallet-private-data";
pub(crate) const MAIN_KEY_AAD: &[u8] = b"wallet-main-key";

pub type MainKey = Zeroizing<[u8; 32]>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum EncryptedContainer {
    #[serde(rename = "1")]
    V1(LegacyContainer),
    #[serde(rename = "2")]
    V2(ContainerV2),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyContainer {
    pub salt: String,
    pub iterations: u32,
    pub data: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerV2 {
    pub unlock_methods: Vec<UnlockMethod>,
    pub data: SealedBox,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UnlockMethod {
    #[serde(rename_all = "camelCase")]
    Password {
        salt: String,
        iterations: u32,
        wrapped_key: SealedBox,
    },
    #[serde(rename_all = "camelCase")]
    Prf {
        credential_id: String,
        /// Salt evaluated by the authenticator.
        prf_salt: String,
        /// Absent on entries that used the raw PRF output as wrapping key.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hkdf: Option<HkdfParams>,
        wrapped_key: SealedBox,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HkdfParams {
    pub salt: String,
    pub info: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    pub nonce: String,
    pub ciphertext: String,
}

impl EncryptedContainer {
    pub fn from_json(json: &str) -> Result<Self, KeystoreError> {
        serde_json::from_str(json).map_err(|e| KeystoreError::MalformedContainer(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, KeystoreError> {
        serde_json::to_string(self).map_err(|e| KeystoreError::MalformedContainer(e.to_string()))
    }
}

impl ContainerV2 {
    pub fn seal(
        main_key: &MainKey,
        unlock_methods: Vec<UnlockMethod>,
        data: &PrivateData,
    ) -> Result<Self, KeystoreError> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(data).map_err(|e| KeystoreError::MalformedContainer(e.to_string()))?,
        );
        Ok(Self {
            unlock_methods,
            data: SealedBox::seal(main_key, &plaintext, DATA_AAD)?,
        })
    }

    pub fn open(&self, main_key: &MainKey) -> Result<PrivateData, KeystoreError> {
        let plaintext = self.data.open(main_key, DATA_AAD)?;
        parse_private_data(&plaintext)
    }

    pub fn password_method(&self) -> Option<&UnlockMethod> {
        self.unlock_methods
            .iter()
            .find(|method| matches!(method, UnlockMethod::Password { .. }))
    }
}

impl SealedBox {
    fn seal(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Self, KeystoreError> {
        let sealed = encrypt_data(key, plaintext, aad)?;
        Ok(Self {
            nonce: encode(&sealed.nonce)?,
            ciphertext: encode(&sealed.ciphertext)?,
        })
    }

    fn open(&self, key: &[u8; 32], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
        let sealed = SealedData {
            nonce: decode(&self.nonce)?,
            ciphertext: decode(&self.ciphertext)?,
        };
        Ok(decrypt_data(key, &sealed, aad)?)
    }
}

pub fn password_method(
    password: &str,
    iterations: u32,
    main_key: &MainKey,
) -> Result<UnlockMethod, KeystoreError> {
    let salt = generate_random_seed_32();
    let wrapping_key = derive_key_with_salt(password, &salt, iterations);

    Ok(UnlockMethod::Password {
        salt: encode(&salt)?,
        iterations,
        wrapped_key: SealedBox::seal(&wrapping_key, main_key.as_slice(), MAIN_KEY_AAD)?,
    })
}

pub fn prf_method(
    credential_id: String,
    prf_salt: &[u8],
    prf_output: &[u8],
    info: &str,
    main_key: &MainKey,
) -> Result<UnlockMethod, KeystoreError> {
    let hkdf_salt = generate_random_seed_32();
    let wrapping_key = derive_wrapping_key(prf_output, &hkdf_salt, info.as_bytes())?;

    Ok(UnlockMethod::Prf {
        credential_id,
        prf_salt: encode(prf_salt)?,
        hkdf: Some(HkdfParams {
            salt: encode(&hkdf_salt)?,
            info: info.to_owned(),
        }),
        wrapped_key: SealedBox::seal(&wrapping_key, main_key.as_slice(), MAIN_KEY_AAD)?,
    })
}

/// Fails with [`KeystoreError::InvalidPassword`] for wrong passwords.
pub fn unwrap_with_password(
    method: &UnlockMethod,
    password: &str,
) -> Result<MainKey, KeystoreError> {
    let UnlockMethod::Password {
        salt,
        iterations,
        wrapped_key,
    } = method
    else {
        return Err(KeystoreError::InvalidPassword);
    };

    let wrapping_key = derive_key_with_salt(password, &decode(salt)?, *iterations);
    let main_key = wrapped_key
        .open(&wrapping_key, MAIN_KEY_AAD)
        .map_err(|_| KeystoreError::InvalidPassword)?;
    to_main_key(&main_key)
}

pub fn unwrap_with_prf(method: &UnlockMethod, prf_output: &[u8]) -> Result<MainKey, KeystoreError> {
    let UnlockMethod::Prf {
        credential_id,
        hkdf,
        wrapped_key,
        ..
    } = method
    else {
        return Err(KeystoreError::NoPrfKey);
    };

    let wrapping_key = match hkdf {
        Some(hkdf) => derive_wrapping_key(prf_output, &decode(&hkdf.salt)?, hkdf.info.as_bytes())?,
        None => raw_wrapping_key(prf_output)?,
    };

    let main_key = wrapped_key
        .open(&wrapping_key, MAIN_KEY_AAD)
        .map_err(|_| KeystoreError::UnlockFailed(format!("passkey `{credential_id}`")))?;
    to_main_key(&main_key)
}

/// Opens a version 1 container.
pub fn open_legacy(container: &LegacyContainer, password: &str) -> Result<PrivateData, KeystoreError> {
    let key = derive_key_with_salt(password, &decode(&container.salt)?, container.iterations);

    // seed is only used for wrapping
    let cocoon = MiniCocoon::from_key(key.as_slice(), &[0u8; 32]);
    let plaintext = cocoon
        .unwrap(&decode(&container.data)?)
        .map(Zeroizing::new)
        .map_err(|_| KeystoreError::InvalidPassword)?;

    parse_private_data(&plaintext)
}

pub(crate) fn decode(value: &str) -> Result<Vec<u8>, KeystoreError> {
    Base64UrlSafeNoPadding::decode_to_vec(value, None)
        .map_err(|e| KeystoreError::MalformedContainer(e.to_string()))
}

pub(crate) fn encode(value: &[u8]) -> Result<String, KeystoreError> {
    Base64UrlSafeNoPadding::encode_to_string(value)
        .map_err(|e| KeystoreError::MalformedContainer(e.to_string()))
}

fn to_main_key(bytes: &[u8]) -> Result<MainKey, KeystoreError> {
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| KeystoreError::MalformedContainer("main key length".to_owned()))?;
    Ok(Zeroizing::new(key))
}

fn parse_private_data(plaintext: &[u8]) -> Result<PrivateData, KeystoreError> {
    serde_json::from_slice(plaintext).map_err(|e| KeystoreError::MalformedContainer(e.to_string()))
}
