//! Channel trait for the messaging transport.

use crate::message::{InboundEvent, InlineButton};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),
}

/// Messaging transport used by the controller.
///
/// The controller only needs to receive events, send text (optionally with
/// an inline keyboard), show a typing indicator and acknowledge callbacks.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name.
    fn name(&self) -> &'static str;

    /// Verify connectivity and credentials.
    async fn init(&self) -> ChannelResult<()>;

    /// Send text, attaching `buttons` to the (last) message if given.
    async fn send_text(
        &self,
        chat_id: &str,
        text: &str,
        buttons: Option<&[Vec<InlineButton>]>,
    ) -> ChannelResult<()>;

    /// Send a short Markdown-formatted message.
    ///
    /// Channels without rich text send it as is.
    async fn send_markdown(&self, chat_id: &str, text: &str) -> ChannelResult<()> {
        self.send_text(chat_id, text, None).await
    }

    /// Show a "typing" indicator.
    async fn send_typing(&self, chat_id: &str) -> ChannelResult<()>;

    /// Acknowledge an inline button press.
    async fn answer_callback(&self, query_id: &str) -> ChannelResult<()>;

    /// Receive events until the receiver side of `tx` is dropped.
    async fn listen(&self, tx: mpsc::Sender<InboundEvent>) -> ChannelResult<()>;
}
