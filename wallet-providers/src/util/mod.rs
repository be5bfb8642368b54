pub mod json_path;
pub mod key_verification;
pub mod x509;
