use ct_codecs::{Base64UrlSafeNoPadding, Decoder, Encoder};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

#[derive(Debug, PartialEq, Eq, Error)]
pub enum JwkError {
    #[error("Invalid key: `{0}`")]
    InvalidKey(String),
    #[error("Unsupported key type `{0}`")]
    UnsupportedKeyType(String),
}

/// P-256 public key in JWK form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcPublicJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// P-256 private key in JWK form. Wiped from memory on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct EcPrivateJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
    pub d: String,
}

impl std::fmt::Debug for EcPrivateJwk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcPrivateJwk")
            .field("crv", &self.crv)
            .field("x", &self.x)
            .finish_non_exhaustive()
    }
}

impl EcPublicJwk {
    /// Accepts compressed or uncompressed SEC1 bytes.
    pub fn from_sec1(bytes: &[u8]) -> Result<Self, JwkError> {
        let pk = p256::PublicKey::from_sec1_bytes(bytes)
            .map_err(|e| JwkError::InvalidKey(e.to_string()))?;
        let encoded_point = pk.to_encoded_point(false);
        let x = encoded_point
            .x()
            .ok_or(JwkError::InvalidKey("X is missing".to_string()))?;
        let y = encoded_point
            .y()
            .ok_or(JwkError::InvalidKey("Y is missing".to_string()))?;

        Ok(Self {
            kty: "EC".to_string(),
            crv: "P-256".to_string(),
            x: encode(x)?,
            y: encode(y)?,
            kid: None,
        })
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, JwkError> {
        let jwk: EcPublicJwk = serde_json::from_value(value.to_owned())
            .map_err(|e| JwkError::InvalidKey(e.to_string()))?;
        if jwk.kty != "EC" || jwk.crv != "P-256" {
            return Err(JwkError::UnsupportedKeyType(format!(
                "{}/{}",
                jwk.kty, jwk.crv
            )));
        }
        Ok(jwk)
    }

    /// Compressed SEC1 point.
    pub fn to_sec1(&self) -> Result<Vec<u8>, JwkError> {
        let x = decode(&self.x)?;
        let y = decode(&self.y)?;
        if x.len() != 32 || y.len() != 32 {
            return Err(JwkError::InvalidKey("invalid coordinate length".to_string()));
        }

        let encoded_point = p256::EncodedPoint::from_affine_coordinates(
            x.as_slice().into(),
            y.as_slice().into(),
            true,
        );
        p256::PublicKey::from_sec1_bytes(encoded_point.as_bytes())
            .map_err(|e| JwkError::InvalidKey(e.to_string()))?;

        Ok(encoded_point.as_bytes().to_owned())
    }

    /// RFC 7638 thumbprint.
    pub fn thumbprint(&self) -> Result<String, JwkError> {
        #[derive(Serialize)]
        struct Canonical<'a> {
            crv: &'a str,
            kty: &'a str,
            x: &'a str,
            y: &'a str,
        }

        let canonical = serde_json::to_vec(&Canonical {
            crv: &self.crv,
            kty: &self.kty,
            x: &self.x,
            y: &self.y,
        })
        .map_err(|e| JwkError::InvalidKey(e.to_string()))?;

        encode(&Sha256::digest(canonical))
    }

}

impl EcPrivateJwk {
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self, JwkError> {
        let secret_key = p256::SecretKey::from_slice(secret)
            .map_err(|e| JwkError::InvalidKey(format!("Failed parsing key from bytes {e}")))?;
        let public = EcPublicJwk::from_sec1(
            secret_key
                .public_key()
                .to_encoded_point(true)
                .as_bytes(),
        )?;

        Ok(Self {
            kty: public.kty,
            crv: public.crv,
            x: public.x,
            y: public.y,
            d: encode(secret_key.to_bytes().as_slice())?,
        })
    }

    pub fn secret_bytes(&self) -> Result<Zeroizing<Vec<u8>>, JwkError> {
        decode(&self.d).map(Zeroizing::new)
    }

    pub fn public(&self) -> EcPublicJwk {
        EcPublicJwk {
            kty: self.kty.to_owned(),
            crv: self.crv.to_owned(),
            x: self.x.to_owned(),
            y: self.y.to_owned(),
            kid: None,
        }
    }
}

fn encode(bytes: &[u8]) -> Result<String, JwkError> {
    Base64UrlSafeNoPadding::encode_to_string(bytes).map_err(|e| JwkError::InvalidKey(e.to_string()))
}

fn decode(value: &str) -> Result<Vec<u8>, JwkError> {
    Base64UrlSafeNoPadding::decode_to_vec(value, None)
        .map_err(|e| JwkError::InvalidKey(e.to_string()))
}
