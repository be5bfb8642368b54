use time::OffsetDateTime;
use url::Url;

use crate::exchange_protocol::openid4vp::error::OpenID4VPError;
use crate::util::x509::{check_validity, dns_names};

const X509_SAN_DNS_SCHEME: &str = "x509_san_dns";

pub(super) fn nontrusted(reason: impl Into<String>) -> OpenID4VPError {
    let reason = reason.into();
    tracing::warn!(%reason, "Verifier not trusted");
    OpenID4VPError::NontrustedVerifier(reason)
}

pub(super) fn assert_request_param(
    value: Option<&str>,
    expected_value: &str,
    key: &str,
) -> Result<(), OpenID4VPError> {
    match value {
        Some(value) if value != expected_value => Err(OpenID4VPError::InvalidRequest(format!(
            "{key} must be '{expected_value}'"
        ))),
        _ => Ok(()),
    }
}

pub(super) fn parse_request_url(
    value: &str,
    key: &str,
    allow_insecure_http_transport: bool,
) -> Result<Url, OpenID4VPError> {
    let url = Url::parse(value)
        .map_err(|e| OpenID4VPError::InvalidRequest(format!("{key}: {e}")))?;
    if url.scheme() != "https" && !allow_insecure_http_transport {
        return Err(OpenID4VPError::InsecureTransport(format!(
            "{key} must use HTTPS scheme"
        )));
    }
    Ok(url)
}

/// Binds a request object signing certificate to the verifier endpoints. Returns the
/// verifier domain.
pub(super) fn validate_verifier_certificate(
    leaf: &[u8],
    request_uri: &Url,
    response_uri: &Url,
    client_id: &str,
    client_id_scheme: Option<&str>,
    now: OffsetDateTime,
) -> Result<String, OpenID4VPError> {
    check_validity(leaf, now).map_err(|e| nontrusted(e.to_string()))?;

    let san = dns_names(leaf).map_err(|e| nontrusted(e.to_string()))?;

    let response_host = response_uri
        .host_str()
        .ok_or_else(|| nontrusted("response_uri has no host"))?
        .to_ascii_lowercase();

    if !san.contains(&response_host) {
        return Err(nontrusted(format!(
            "response_uri host `{response_host}` is not covered by the certificate"
        )));
    }

    if request_uri.host_str().map(str::to_ascii_lowercase).as_deref() != Some(&response_host) {
        return Err(nontrusted(format!(
            "request_uri host does not match response_uri host `{response_host}`"
        )));
    }

    let san_dns_client_id = client_id
        .strip_prefix(&format!("{X509_SAN_DNS_SCHEME}:"))
        .or((client_id_scheme == Some(X509_SAN_DNS_SCHEME)).then_some(client_id));

    if let Some(dns_name) = san_dns_client_id {
        if !san.contains(&dns_name.to_ascii_lowercase()) {
            return Err(nontrusted(format!(
                "client_id `{client_id}` is not covered by the certificate"
            )));
        }
    }

    Ok(response_host)
}
