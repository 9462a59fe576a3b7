//! Model gateway.
//!
//! Wraps a [`Provider`] so the controller always gets displayable text:
//! the prompt is windowed, the call runs on its own task, and every failure
//! becomes an error reply instead of an `Err`.

use crate::provider::Provider;
use crate::session::{windowed, PromptMessage};
use std::sync::Arc;

/// Prefix of replies produced from failed model calls.
pub const MODEL_ERROR_PREFIX: &str = "⚠️ Error contacting the model:";

/// Detail appended to the prefix when the model answers with blank text.
pub const EMPTY_REPLY_DETAIL: &str = "the model returned an empty answer, please rephrase your question";

/// Windowed, failure-absorbing access to the model.
#[derive(Clone)]
pub struct ModelGateway {
    provider: Arc<dyn Provider>,
    max_pairs: usize,
    system_prompt: String,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn Provider>, max_pairs: usize, system_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            max_pairs,
            system_prompt: system_prompt.into(),
        }
    }

    /// Complete a conversation. Never fails: errors come back as text.
    pub async fn complete(&self, messages: &[PromptMessage]) -> String {
        let payload = windowed(messages, self.max_pairs, &self.system_prompt);
        let provider = self.provider.clone();

        tracing::debug!(
            provider = %provider.name(),
            total_messages = messages.len(),
            window_messages = payload.len(),
            "Calling model"
        );

        let outcome = tokio::spawn(async move { provider.complete(&payload).await }).await;

        match outcome {
            // Telegram rejects empty messages, so blank text would mean no reply at all
            Ok(Ok(reply)) if reply.trim().is_empty() => {
                tracing::warn!(reply_len = reply.len(), "Model returned a blank reply");
                format!("{MODEL_ERROR_PREFIX} {EMPTY_REPLY_DETAIL}")
            }
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) if e.is_auth() => {
                tracing::error!(
                    provider = %e.provider,
                    status = ?e.status_code,
                    error = %e.message,
                    "Model provider rejected the credentials"
                );
                format!("{MODEL_ERROR_PREFIX} {e}")
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    provider = %e.provider,
                    status = ?e.status_code,
                    error = %e.message,
                    "Model call failed"
                );
                format!("{MODEL_ERROR_PREFIX} {e}")
            }
            Err(e) => {
                tracing::error!(error = %e, "Model call task aborted");
                format!("{MODEL_ERROR_PREFIX} {e}")
            }
        }
    }
}
