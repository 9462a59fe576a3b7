//! Bot controller.
//!
//! Drives the per-user lifecycle `NoSession → ActiveSession → NoSession`:
//! `/start` and text messages create and grow a session, a resolution
//! button saves the transcript and discards it.

use crate::gateway::ModelGateway;
use crate::message::{InboundEvent, InlineButton};
use crate::session::SessionStore;
use crate::traits::{Channel, ChannelResult};
use crate::transcript::{Resolution, TranscriptWriter};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const GREETING: &str = "👋 Hi! I'm the tech support bot.\n\n\
Describe your problem and I'll do my best to help.\n\
After my answer you can mark it as \"Solved\" ✅ or \"Not solved\" ❌.";

pub const EMPTY_TEXT_REPLY: &str = "Please describe your problem in text.";

pub const SAVE_FAILED_REPLY: &str =
    "⚠️ Could not save the conversation. Please try again in a moment.";

/// The two resolution buttons shown under every answer.
pub fn resolution_keyboard() -> Vec<Vec<InlineButton>> {
    vec![vec![
        InlineButton::new("Solved ✅", Resolution::Solved.as_str()),
        InlineButton::new("Not solved ❌", Resolution::Unsolved.as_str()),
    ]]
}

/// Markdown confirmation; the file name is shown as inline code.
fn saved_reply(status: Resolution, file_name: &str) -> String {
    match status {
        Resolution::Solved => format!("✅ Conversation saved: `{file_name}`"),
        Resolution::Unsolved => {
            format!("❌ Conversation saved: `{file_name}`. It will be forwarded to the service desk.")
        }
    }
}

fn nothing_saved_reply(status: Resolution) -> &'static str {
    match status {
        Resolution::Solved => "✅ The conversation is empty or has already been saved.",
        Resolution::Unsolved => "❌ The conversation is empty or has already been saved.",
    }
}

/// Orchestrates sessions, the model and transcripts for inbound events.
pub struct BotController {
    store: Arc<SessionStore>,
    gateway: ModelGateway,
    transcripts: TranscriptWriter,
    channel: Arc<dyn Channel>,
}

impl BotController {
    pub fn new(
        store: Arc<SessionStore>,
        gateway: ModelGateway,
        transcripts: TranscriptWriter,
        channel: Arc<dyn Channel>,
    ) -> Self {
        Self {
            store,
            gateway,
            transcripts,
            channel,
        }
    }

    /// Handle a single event to completion.
    pub async fn handle(&self, event: InboundEvent) -> ChannelResult<()> {
        match event {
            InboundEvent::Start { user_id, chat_id } => self.on_start(&user_id, &chat_id).await,
            InboundEvent::Text {
                user_id,
                chat_id,
                text,
            } => self.on_text(&user_id, &chat_id, &text).await,
            InboundEvent::Callback {
                query_id,
                user_id,
                chat_id,
                data,
            } => self.on_callback(&query_id, &user_id, &chat_id, &data).await,
        }
    }

    /// Dispatch events until the channel closes.
    ///
    /// Each user with pending events gets a worker task that handles them in
    /// arrival order; workers exit once their queue is drained.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<InboundEvent>) {
        let mut queues: HashMap<String, mpsc::UnboundedSender<InboundEvent>> = HashMap::new();

        while let Some(event) = rx.recv().await {
            queues.retain(|_, queue| !queue.is_closed());

            let user_id = event.user_id().to_string();
            let event = match queues.get(&user_id) {
                Some(queue) => match queue.send(event) {
                    Ok(()) => continue,
                    // The worker closed its queue between our check and the send
                    Err(mpsc::error::SendError(event)) => event,
                },
                None => event,
            };

            let (queue, pending) = mpsc::unbounded_channel();
            if queue.send(event).is_ok() {
                queues.insert(user_id, queue);
                tokio::spawn(self.clone().drain(pending));
            }
        }
        tracing::info!("Event stream closed, dispatcher stopping");
    }

    async fn drain(self: Arc<Self>, mut pending: mpsc::UnboundedReceiver<InboundEvent>) {
        while let Ok(event) = pending.try_recv() {
            self.handle_logged(event).await;
        }
        // Refuse new events, then finish whatever was accepted before the close
        pending.close();
        while let Some(event) = pending.recv().await {
            self.handle_logged(event).await;
        }
    }

    async fn handle_logged(&self, event: InboundEvent) {
        let kind = event.kind();
        let user_id = event.user_id().to_string();
        if let Err(e) = self.handle(event).await {
            tracing::warn!(user_id = %user_id, event = kind, error = %e, "Failed to handle event");
        }
    }

    async fn on_start(&self, user_id: &str, chat_id: &str) -> ChannelResult<()> {
        self.store.ensure(user_id, Utc::now()).await;
        self.channel.send_text(chat_id, GREETING, None).await
    }

    async fn on_text(&self, user_id: &str, chat_id: &str, text: &str) -> ChannelResult<()> {
        if text.trim().is_empty() {
            return self.channel.send_text(chat_id, EMPTY_TEXT_REPLY, None).await;
        }

        let reply = {
            let mut session = self.store.lock(user_id).await;
            session.append_user_turn(text, Utc::now());
            let messages = session
                .session()
                .map(|s| s.messages().to_vec())
                .unwrap_or_default();

            // The indicator is cosmetic; a failure must not cost the user a reply
            if let Err(e) = self.channel.send_typing(chat_id).await {
                tracing::debug!(chat_id = %chat_id, error = %e, "Typing indicator failed");
            }

            let reply = self.gateway.complete(&messages).await;
            session.append_bot_turn(&reply, Utc::now());

            tracing::info!(
                user_id = %user_id,
                turns = session.session().map_or(0, |s| s.turns()),
                active_users = self.store.active_users(),
                reply_len = reply.len(),
                "Reply generated"
            );
            reply
        };

        let keyboard = resolution_keyboard();
        self.channel.send_text(chat_id, &reply, Some(&keyboard)).await
    }

    async fn on_callback(
        &self,
        query_id: &str,
        user_id: &str,
        chat_id: &str,
        data: &str,
    ) -> ChannelResult<()> {
        let outcome = match Resolution::parse(data) {
            Some(status) => self.resolve(user_id, chat_id, status).await,
            None => {
                tracing::warn!(user_id = %user_id, data = %data, "Ignoring unknown callback data");
                Ok(())
            }
        };

        // Always acknowledge so the client stops showing a spinner
        let ack = self.channel.answer_callback(query_id).await;
        outcome.and(ack)
    }

    async fn resolve(&self, user_id: &str, chat_id: &str, status: Resolution) -> ChannelResult<()> {
        let reply = match self.transcripts.save_and_clear(user_id, status).await {
            Ok(Some(path)) => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                return self
                    .channel
                    .send_markdown(chat_id, &saved_reply(status, &file_name))
                    .await;
            }
            Ok(None) => nothing_saved_reply(status).to_string(),
            Err(e) => {
                tracing::error!(user_id = %user_id, status = %status, error = %e, "Failed to save transcript");
                SAVE_FAILED_REPLY.to_string()
            }
        };

        self.channel.send_text(chat_id, &reply, None).await
    }
}
