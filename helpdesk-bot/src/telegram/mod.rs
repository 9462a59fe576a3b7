//! Telegram channel adapter.
//!
//! Provides the `TelegramChannel` implementation for receiving updates via
//! `getUpdates` long polling and replying through the Telegram Bot API.

use crate::message::{InboundEvent, InlineButton};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use helpdesk_common::TelegramConfig;
use std::time::Duration;
use tokio::sync::mpsc;

/// Telegram's per-message limit in bytes.
const MAX_MESSAGE_LEN: usize = 4096;

/// Back-off after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram channel - long-polls the Bot API for updates.
pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    api_base: String,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel against the public Bot API.
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            api_base: "https://api.telegram.org".into(),
            poll_timeout_secs: 30,
            client: reqwest::Client::new(),
        }
    }

    /// Create a channel from configuration.
    pub fn from_config(config: &TelegramConfig) -> Self {
        Self::new(
            config.bot_token.clone().unwrap_or_default(),
            config.allowed_users.clone(),
        )
        .with_api_base(&config.api_base)
        .with_poll_timeout(config.poll_timeout_secs)
    }

    /// Point the channel at a different Bot API server.
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// Set the `getUpdates` long-poll timeout.
    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = secs;
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn is_user_allowed(&self, identity: &str) -> bool {
        self.allowed_users.iter().any(|u| u == "*" || u == identity)
    }

    fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        identities.into_iter().any(|id| self.is_user_allowed(id))
    }

    /// Call a Bot API method and return its `result`.
    async fn call(&self, method: &str, body: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram {method} failed ({}): {err}", status.as_u16());
        }

        let mut data: serde_json::Value = resp.json().await?;
        if data.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("unknown error");
            anyhow::bail!("Telegram {method} returned error: {description}");
        }

        Ok(data["result"].take())
    }

    /// Send one chunk, optionally with an inline keyboard and a parse mode.
    async fn send_chunk(
        &self,
        chat_id: &str,
        text: &str,
        buttons: Option<&[Vec<InlineButton>]>,
        parse_mode: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        if let Some(rows) = buttons {
            body["reply_markup"] = serde_json::json!({ "inline_keyboard": keyboard_markup(rows) });
        }
        if let Some(mode) = parse_mode {
            body["parse_mode"] = serde_json::json!(mode);
        }

        self.call("sendMessage", &body).await?;
        Ok(())
    }

    /// Translate one `getUpdates` entry into an event.
    ///
    /// Returns `None` for update kinds the bot ignores and for senders that
    /// are not on the allow-list.
    fn parse_update(&self, update: &serde_json::Value) -> Option<InboundEvent> {
        if let Some(cb) = update.get("callback_query") {
            return self.parse_callback_query(cb);
        }

        let message = update.get("message")?;
        let from = message.get("from")?;
        let user_id = from.get("id")?.as_i64()?.to_string();
        let username = from.get("username").and_then(|u| u.as_str()).unwrap_or("unknown");
        let chat_id = message.get("chat")?.get("id")?.as_i64()?.to_string();

        if !self.is_any_user_allowed([username, user_id.as_str()]) {
            tracing::warn!(
                "Telegram: ignoring message from unauthorized user: {}",
                username
            );
            return None;
        }

        // Stickers, photos and the like carry no text
        let text = message.get("text").and_then(|v| v.as_str()).unwrap_or("");

        tracing::info!(
            channel = "telegram",
            user_id = %user_id,
            chat_id = %chat_id,
            text_len = text.len(),
            "IM message received"
        );

        if is_start_command(text) {
            Some(InboundEvent::Start { user_id, chat_id })
        } else {
            Some(InboundEvent::Text {
                user_id,
                chat_id,
                text: text.to_string(),
            })
        }
    }

    fn parse_callback_query(&self, callback: &serde_json::Value) -> Option<InboundEvent> {
        let query_id = callback.get("id")?.as_str()?.to_string();
        let data = callback.get("data")?.as_str()?.to_string();

        let from = callback.get("from")?;
        let user_id = from.get("id")?.as_i64()?.to_string();
        let username = from.get("username").and_then(|u| u.as_str()).unwrap_or("unknown");

        // Inaccessible messages omit the chat; private chat IDs equal user IDs
        let chat_id = callback
            .get("message")
            .and_then(|m| m.get("chat"))
            .and_then(|c| c.get("id"))
            .and_then(serde_json::Value::as_i64)
            .map_or_else(|| user_id.clone(), |id| id.to_string());

        if !self.is_any_user_allowed([username, user_id.as_str()]) {
            tracing::warn!("Telegram: ignoring callback from unauthorized user: {}", username);
            return None;
        }

        Some(InboundEvent::Callback {
            query_id,
            user_id,
            chat_id,
            data,
        })
    }
}

/// `/start`, `/start@SomeBot` and `/start payload` all count.
fn is_start_command(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .map(|cmd| cmd.split('@').next() == Some("/start"))
        .unwrap_or(false)
}

fn keyboard_markup(rows: &[Vec<InlineButton>]) -> Vec<Vec<serde_json::Value>> {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|btn| {
                    serde_json::json!({
                        "text": btn.text,
                        "callback_data": btn.callback_data
                    })
                })
                .collect()
        })
        .collect()
}

/// Largest char boundary not greater than `index`.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Split a message into chunks that fit within Telegram's limit.
fn split_message(message: &str, max_len: usize) -> Vec<String> {
    if message.len() <= max_len {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let limit = floor_char_boundary(remaining, max_len);
        let chunk = &remaining[..limit];
        let split_pos = chunk
            .rfind("\n\n")
            .or_else(|| chunk.rfind('\n'))
            .or_else(|| chunk.rfind(". "))
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        let actual_split = if split_pos == 0 { limit } else { split_pos };
        // A single char wider than max_len still has to go somewhere
        let actual_split = if actual_split == 0 {
            remaining.chars().next().map_or(remaining.len(), char::len_utf8)
        } else {
            actual_split
        };

        chunks.push(remaining[..actual_split].to_string());
        remaining = remaining[actual_split..].trim_start();
    }

    chunks
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn init(&self) -> ChannelResult<()> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Auth(format!("Invalid bot token: {err}")));
        }

        tracing::info!("Telegram channel initialized");
        Ok(())
    }

    async fn send_text(
        &self,
        chat_id: &str,
        text: &str,
        buttons: Option<&[Vec<InlineButton>]>,
    ) -> ChannelResult<()> {
        let chunks = split_message(text, MAX_MESSAGE_LEN);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let markup = if i == last { buttons } else { None };
            self.send_chunk(chat_id, chunk, markup, None)
                .await
                .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        }

        Ok(())
    }

    async fn send_markdown(&self, chat_id: &str, text: &str) -> ChannelResult<()> {
        match self.send_chunk(chat_id, text, None, Some("Markdown")).await {
            Ok(()) => Ok(()),
            // Telegram returns "Bad Request: can't parse entities" for markup errors
            Err(e) if e.to_string().contains("parse entities") => {
                tracing::warn!("Telegram Markdown parsing failed, retrying without parse_mode: {e}");
                self.send_chunk(chat_id, text, None, None)
                    .await
                    .map_err(|e| ChannelError::SendFailed(e.to_string()))
            }
            Err(e) => Err(ChannelError::SendFailed(e.to_string())),
        }
    }

    async fn send_typing(&self, chat_id: &str) -> ChannelResult<()> {
        let body = serde_json::json!({ "chat_id": chat_id, "action": "typing" });
        self.call("sendChatAction", &body)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    async fn answer_callback(&self, query_id: &str) -> ChannelResult<()> {
        let body = serde_json::json!({ "callback_query_id": query_id });
        self.call("answerCallbackQuery", &body)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    async fn listen(&self, tx: mpsc::Sender<InboundEvent>) -> ChannelResult<()> {
        let mut offset: i64 = 0;

        tracing::info!("Telegram channel listening for messages...");

        loop {
            let body = serde_json::json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message", "callback_query"]
            });

            let results = match self.call("getUpdates", &body).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            let Some(updates) = results.as_array() else {
                continue;
            };

            for update in updates {
                if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64) {
                    offset = uid + 1;
                }

                let Some(event) = self.parse_update(update) else {
                    continue;
                };

                if tx.send(event).await.is_err() {
                    tracing::info!("Event receiver closed, Telegram listener stopping");
                    return Ok(());
                }
            }
        }
    }
}
