//! Telegram channel: long-polls the Bot API for updates.
//!
//! Text, slash commands, inline button presses and uploads are turned into
//! [`InboundEvent`]s; prompts go out through `sendMessage` with the matching
//! `reply_markup`. Uploaded files are downloaded through `getFile`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::channels::{
    Attachment, AttachmentKind, Channel, ChoiceData, Command, EventKind, EventStream,
    FileFetcher, InboundEvent, InlineKeyboard, Markup, Outgoing, OutgoingMessage, ReplyTarget,
};
use crate::error::ChannelError;

const CHANNEL_NAME: &str = "telegram";

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Commands advertised in the client's command menu.
const BOT_COMMANDS: &[(&str, &str)] = &[
    ("start", "Begin registration"),
    ("restart", "Restart registration"),
    ("quit", "Cancel registration"),
    ("help", "Show help"),
];

/// Telegram Bot API transport using long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.bot_token.expose_secret()
        )
    }

    /// POST a Bot API method and return its `result`.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        if !status.is_success() || data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(ChannelError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("{method} returned {status}: {description}"),
            });
        }
        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Send a message, splitting text over Telegram's limit. The keyboard
    /// rides on the last chunk.
    async fn send_message(&self, chat_id: &str, msg: &OutgoingMessage) -> Result<(), ChannelError> {
        let chunks = split_message(&msg.text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            if i == last {
                if let Some(markup) = reply_markup(&msg.markup) {
                    body["reply_markup"] = markup;
                }
            }
            self.call("sendMessage", &body).await?;
        }
        Ok(())
    }

    /// Replace the inline keyboard of a message already sent.
    async fn edit_markup(
        &self,
        chat_id: &str,
        message_id: i64,
        keyboard: &InlineKeyboard,
    ) -> Result<(), ChannelError> {
        let body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "reply_markup": inline_keyboard_json(keyboard),
        });
        match self.call("editMessageReplyMarkup", &body).await {
            // Redrawing an identical keyboard is not a failure.
            Err(ChannelError::SendFailed { reason, .. })
                if reason.contains("message is not modified") =>
            {
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    /// Publish the command menu shown by Telegram clients.
    pub async fn set_commands(&self) -> Result<(), ChannelError> {
        let commands: Vec<Value> = BOT_COMMANDS
            .iter()
            .map(|(command, description)| json!({"command": command, "description": description}))
            .collect();
        self.call("setMyCommands", &json!({ "commands": commands }))
            .await
            .map(|_| ())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        if let Err(e) = self.set_commands().await {
            tracing::warn!(error = %e, "Failed to publish Telegram command menu");
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let updates_url = self.api_url("getUpdates");
        let answer_url = self.api_url("answerCallbackQuery");
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&updates_url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(error = %e, "Telegram poll error");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!(error = %e, "Telegram parse error");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    let description = data.get("description").and_then(Value::as_str).unwrap_or("");
                    tracing::warn!(
                        description = %description,
                        "Telegram getUpdates returned no result"
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    // Stop the client's spinner whether or not we understood the press.
                    if let Some(query_id) = update.pointer("/callback_query/id").and_then(Value::as_str) {
                        let client = client.clone();
                        let url = answer_url.clone();
                        let body = json!({ "callback_query_id": query_id });
                        tokio::spawn(async move {
                            if let Err(e) = client.post(&url).json(&body).send().await {
                                tracing::debug!(error = %e, "answerCallbackQuery failed");
                            }
                        });
                    }

                    let Some(event) = parse_update(update) else {
                        tracing::debug!("Skipping unsupported Telegram update");
                        continue;
                    };

                    if tx.send(event).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, target: &ReplyTarget, outgoing: Outgoing) -> Result<(), ChannelError> {
        match outgoing {
            Outgoing::Send(msg) => self.send_message(&target.chat_id, &msg).await,
            Outgoing::EditMarkup {
                message_id,
                keyboard,
            } => self.edit_markup(&target.chat_id, message_id, &keyboard).await,
        }
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.call("getMe", &json!({}))
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

#[async_trait]
impl FileFetcher for TelegramChannel {
    async fn fetch(&self, attachment: &Attachment) -> Result<Vec<u8>, ChannelError> {
        let file = self
            .call("getFile", &json!({ "file_id": attachment.file_id }))
            .await?;
        let file_path = file
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::InvalidMessage("getFile returned no file_path".into()))?;

        let resp = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ChannelError::Http(format!(
                "file download returned {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        tracing::debug!(file_id = %attachment.file_id, bytes = bytes.len(), "Downloaded Telegram file");
        Ok(bytes.to_vec())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Turn one getUpdates entry into an event. Returns `None` for updates the
/// bot does not handle (edits, stickers, unknown button payloads, ...).
pub fn parse_update(update: &Value) -> Option<InboundEvent> {
    if let Some(query) = update.get("callback_query") {
        return parse_callback(query);
    }

    let message = update.get("message")?;
    let chat_id = id_string(message.pointer("/chat/id")?)?;
    let from = message.get("from")?;
    let user_id = id_string(from.get("id")?)?;

    let kind = if let Some(text) = message.get("text").and_then(Value::as_str) {
        match Command::parse(text) {
            Some(command) => EventKind::Command(command),
            None => EventKind::Text(text.to_string()),
        }
    } else if let Some(document) = message.get("document") {
        EventKind::Attachment(Attachment {
            kind: AttachmentKind::Document,
            file_id: document.get("file_id")?.as_str()?.to_string(),
            unique_id: str_field(document, "file_unique_id"),
            file_name: str_field(document, "file_name"),
        })
    } else if let Some(sizes) = message.get("photo").and_then(Value::as_array) {
        // Sizes are ordered smallest first.
        let largest = sizes.last()?;
        EventKind::Attachment(Attachment {
            kind: AttachmentKind::Photo,
            file_id: largest.get("file_id")?.as_str()?.to_string(),
            unique_id: str_field(largest, "file_unique_id"),
            file_name: None,
        })
    } else {
        return None;
    };

    Some(with_name(InboundEvent::new(CHANNEL_NAME, &user_id, &chat_id, kind), from))
}

fn parse_callback(query: &Value) -> Option<InboundEvent> {
    let from = query.get("from")?;
    let user_id = id_string(from.get("id")?)?;
    let data = ChoiceData::parse(query.get("data")?.as_str()?)?;
    let message = query.get("message");
    let chat_id = message
        .and_then(|m| m.pointer("/chat/id"))
        .and_then(id_string)
        .unwrap_or_else(|| user_id.clone());
    let message_id = message
        .and_then(|m| m.get("message_id"))
        .and_then(Value::as_i64);

    let kind = EventKind::Choice { data, message_id };
    Some(with_name(InboundEvent::new(CHANNEL_NAME, &user_id, &chat_id, kind), from))
}

fn with_name(event: InboundEvent, from: &Value) -> InboundEvent {
    match from
        .get("first_name")
        .or_else(|| from.get("username"))
        .and_then(Value::as_str)
    {
        Some(name) => event.with_user_name(name),
        None => event,
    }
}

fn id_string(value: &Value) -> Option<String> {
    value
        .as_i64()
        .map(|id| id.to_string())
        .or_else(|| value.as_str().map(String::from))
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

/// Bot API `reply_markup` for a message, if it carries one.
fn reply_markup(markup: &Markup) -> Option<Value> {
    match markup {
        Markup::None => None,
        Markup::Inline(keyboard) => Some(inline_keyboard_json(keyboard)),
        Markup::Persistent(rows) => Some(json!({
            "keyboard": rows
                .iter()
                .map(|row| row.iter().map(|label| json!({ "text": label })).collect::<Vec<_>>())
                .collect::<Vec<_>>(),
            "resize_keyboard": true,
            "is_persistent": true,
        })),
        Markup::RemovePersistent => Some(json!({ "remove_keyboard": true })),
    }
}

fn inline_keyboard_json(keyboard: &InlineKeyboard) -> Value {
    json!({
        "inline_keyboard": keyboard
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| json!({ "text": b.label, "callback_data": b.data.encode() }))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>(),
    })
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
