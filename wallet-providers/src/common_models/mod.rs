//! Data shared by the issuance, presentation and storage providers.

pub mod credential;
pub mod event;
pub mod jwk;
pub mod presentation;
