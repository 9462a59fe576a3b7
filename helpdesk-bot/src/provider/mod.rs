//! LLM provider abstraction.
//!
//! The gateway only needs one operation: turn an ordered prompt into a
//! single reply. Providers report failures as [`ProviderError`]; turning
//! them into user-facing text is the gateway's job.

mod gigachat;

pub use gigachat::GigaChatProvider;

use crate::session::PromptMessage;
use async_trait::async_trait;

/// Unified interface for chat-completion backends.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name.
    fn name(&self) -> &str;

    /// Complete the conversation, returning the reply text.
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, ProviderError>;
}

/// Error from a provider.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Whether the provider rejected our credentials or token.
    pub fn is_auth(&self) -> bool {
        matches!(self.status_code, Some(401 | 403))
    }
}
