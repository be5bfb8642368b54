//! Providers of the holder wallet core: credential codecs, issuance and presentation
//! protocols, the encrypted keystore and the collaborators they talk through.

pub mod common_models;
pub mod credential_codec;
pub mod credential_storage;
pub mod dpop;
pub mod exchange_protocol;
pub mod http_client;
pub mod keystore;
pub mod util;

#[cfg(test)]
pub(crate) mod test_utilities;
