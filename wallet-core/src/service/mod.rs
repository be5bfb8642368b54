//! UI-facing services. Calls acting for the user take the [`crate::session::Session`]
//! explicitly.

pub mod credential_service;
pub mod error;
pub mod issuance_service;
pub mod keystore_service;
pub mod presentation_service;
