//! Credential exchange protocols spoken by the holder: OpenID4VCI for issuance and
//! OpenID4VP for presentation.

pub mod openid4vci;
pub mod openid4vp;
