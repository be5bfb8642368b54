use std::sync::Arc;

use async_trait::async_trait;

use super::error::CodecError;
use super::model::{IssuerDisplay, ParsedCredential};

/// Parses raw credentials of any supported format, caching results by content.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait CredentialParserRegistry: Send + Sync {
    /// Tries every codec in order; the first one that decodes and verifies wins.
    async fn parse(
        &self,
        raw: &str,
        issuer_display: Option<IssuerDisplay>,
    ) -> Result<Arc<ParsedCredential>, CodecError>;

    async fn invalidate(&self, raw: &str);

    async fn clear(&self);
}
