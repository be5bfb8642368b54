//! X.509 helpers for `x5c`/`x5chain` backed keys.

use ct_codecs::{Base64, Decoder};
use thiserror::Error;
use time::OffsetDateTime;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum CertificateError {
    #[error("Empty certificate chain")]
    EmptyChain,
    #[error("Invalid certificate encoding: `{0}`")]
    Encoding(String),
    #[error("Certificate parsing failed: `{0}`")]
    Parsing(String),
    #[error("Certificate is not valid at the given time")]
    NotValid,
    #[error("Certificate chain verification failed: `{0}`")]
    ChainVerification(String),
    #[error("Certificate chain does not end in a trust anchor")]
    UntrustedChain,
}

/// Decodes an `x5c` header value (standard base64 DER certificates).
pub fn decode_x5c(x5c: &[String]) -> Result<Vec<Vec<u8>>, CertificateError> {
    if x5c.is_empty() {
        return Err(CertificateError::EmptyChain);
    }

    x5c.iter()
        .map(|cert| {
            Base64::decode_to_vec(cert, None)
                .map_err(|e| CertificateError::Encoding(e.to_string()))
        })
        .collect()
}

fn parse(der: &[u8]) -> Result<X509Certificate<'_>, CertificateError> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|e| CertificateError::Parsing(e.to_string()))?;
    Ok(cert)
}

/// DNS names listed in the subject alternative name extension. Empty if the extension is absent.
pub fn dns_names(der: &[u8]) -> Result<Vec<String>, CertificateError> {
    let cert = parse(der)?;

    let san = cert
        .subject_alternative_name()
        .map_err(|e| CertificateError::Parsing(e.to_string()))?;

    Ok(san
        .map(|extension| {
            extension
                .value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_ascii_lowercase()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default())
}

/// SEC1 encoded subject public key.
pub fn public_key(der: &[u8]) -> Result<Vec<u8>, CertificateError> {
    let cert = parse(der)?;
    Ok(cert.public_key().subject_public_key.data.to_vec())
}

pub fn check_validity(der: &[u8], now: OffsetDateTime) -> Result<(), CertificateError> {
    let cert = parse(der)?;
    let validity = cert.validity();

    let now = now.unix_timestamp();
    if now < validity.not_before.timestamp() || now > validity.not_after.timestamp() {
        return Err(CertificateError::NotValid);
    }

    Ok(())
}

/// Verifies that every certificate is signed by its successor and that the chain ends in
/// one of `trust_anchors`, either by containing the anchor or by being signed by it.
pub fn verify_chain(
    chain: &[Vec<u8>],
    trust_anchors: &[Vec<u8>],
) -> Result<(), CertificateError> {
    let parsed = chain
        .iter()
        .map(|der| parse(der))
        .collect::<Result<Vec<_>, _>>()?;

    let last = parsed.last().ok_or(CertificateError::EmptyChain)?;

    for pair in parsed.windows(2) {
        pair[0]
            .verify_signature(Some(pair[1].public_key()))
            .map_err(|e| CertificateError::ChainVerification(e.to_string()))?;
    }

    if chain.iter().any(|der| trust_anchors.contains(der)) {
        return Ok(());
    }

    for anchor in trust_anchors {
        let anchor = parse(anchor)?;
        if last.verify_signature(Some(anchor.public_key())).is_ok() {
            return Ok(());
        }
    }

    Err(CertificateError::UntrustedChain)
}
