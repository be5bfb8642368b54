pub mod jwt;
pub mod key_resolver;
pub mod mdoc;
pub mod registry;
pub mod sdjwt;
