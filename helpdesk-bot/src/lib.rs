//! Helpdesk Bot - a Telegram support-desk bot backed by GigaChat.
//!
//! ## Architecture
//!
//! ```text
//! User → Telegram → TelegramChannel ──events──► BotController
//!                                                 │   │    │
//!                                   SessionStore ◄┘   │    └► TranscriptWriter → dialog_*.txt
//!                                                     ▼
//!                                 ModelGateway (windowing) → GigaChatProvider
//! ```
//!
//! Each inbound event runs on its own task. Events for the same user are
//! serialized through the user's session lock; different users proceed in
//! parallel.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod controller;
pub mod gateway;
pub mod message;
pub mod provider;
pub mod session;
pub mod telegram;
pub mod traits;
pub mod transcript;

// Re-export commonly used types
pub use controller::BotController;
pub use gateway::{ModelGateway, MODEL_ERROR_PREFIX};
pub use message::{InboundEvent, InlineButton};
pub use provider::{GigaChatProvider, Provider, ProviderError};
pub use session::{windowed, Session, SessionStore};
pub use telegram::TelegramChannel;
pub use traits::{Channel, ChannelError, ChannelResult};
pub use transcript::{Resolution, TranscriptWriter};

use helpdesk_common::Config;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of the event queue between the poller and the dispatcher.
const EVENT_QUEUE_CAPACITY: usize = 256;

/// Wire up all components from configuration.
pub fn build_controller(
    config: &Config,
    channel: Arc<dyn Channel>,
    provider: Arc<dyn Provider>,
) -> BotController {
    let store = Arc::new(SessionStore::new(
        config.session.system_prompt.clone(),
        config.session.reply_role,
    ));
    let gateway = ModelGateway::new(
        provider,
        config.session.max_pairs,
        config.session.system_prompt.clone(),
    );
    let transcripts = TranscriptWriter::new(store.clone(), config.transcript.dir.clone());

    BotController::new(store, gateway, transcripts, channel)
}

/// Run the bot until the listener stops or Ctrl-C is received.
pub async fn start_bot(config: &Config) -> anyhow::Result<()> {
    let provider: Arc<dyn Provider> = Arc::new(GigaChatProvider::from_config(&config.llm)?);
    let telegram = Arc::new(TelegramChannel::from_config(&config.telegram));
    telegram.init().await?;

    let controller = Arc::new(build_controller(config, telegram.clone(), provider));
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

    let dispatcher = tokio::spawn(controller.run(rx));
    let mut listener = {
        let telegram = telegram.clone();
        tokio::spawn(async move { telegram.listen(tx).await })
    };

    tracing::info!(
        model = %config.llm.model,
        max_pairs = config.session.max_pairs,
        transcript_dir = %config.transcript.dir.display(),
        "🚀 Bot started"
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Bot stopped");
        }
        result = &mut listener => {
            match result {
                Ok(Ok(())) => tracing::info!("Telegram listener finished"),
                Ok(Err(e)) => tracing::error!(error = %e, "Telegram listener failed"),
                Err(e) => tracing::error!(error = %e, "Telegram listener task aborted"),
            }
        }
    }

    listener.abort();
    dispatcher.abort();
    Ok(())
}
