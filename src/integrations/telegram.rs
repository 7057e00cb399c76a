// src/integrations/telegram.rs — Telegram adapter (Bot API)
//
// Uses the Telegram Bot API (https://core.telegram.org/bots/api). Outbound
// calls implement `ChatTransport`; `poll_updates` is the long-poll loop that
// feeds the session registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::infra::errors::{BotError, Result};
use crate::integrations::types::{
    CallbackQuery, ChatId, ChatTransport, InboundMessage, Keyboard, MessageId, PhotoRef, Update,
};
use crate::session::registry::SessionRegistry;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Back-off after a failed getUpdates call.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Telegram Bot API client.
pub struct TelegramTransport {
    client: Client,
    bot_token: String,
}

impl TelegramTransport {
    pub fn new(bot_token: String) -> Self {
        Self {
            client: Client::new(),
            bot_token,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{TELEGRAM_API_BASE}/bot{}/{method}", self.bot_token)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let resp: TelegramResponse<T> = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::Transport(format!("{method}: {e}")))?
            .json()
            .await
            .map_err(|e| BotError::Transport(format!("{method}: {e}")))?;

        if !resp.ok {
            return Err(BotError::Transport(format!(
                "{method} failed: {}",
                resp.description.unwrap_or_else(|| "unknown".into())
            )));
        }
        resp.result
            .ok_or_else(|| BotError::Transport(format!("{method}: empty result")))
    }

    /// Validate the bot token by calling getMe.
    pub async fn validate(&self) -> Result<String> {
        let bot: TgUser = self.call("getMe", serde_json::json!({})).await?;
        Ok(format!(
            "Authenticated as @{}",
            bot.username.unwrap_or_else(|| bot.first_name.unwrap_or_default())
        ))
    }

    /// One long-poll round. Returns the updates and the next offset.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<(Vec<Update>, i64)> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        let raw: Vec<TgUpdate> = self.call("getUpdates", body).await?;
        let next = raw
            .iter()
            .map(|u| u.update_id + 1)
            .max()
            .unwrap_or(offset);
        Ok((raw.into_iter().filter_map(TgUpdate::into_update).collect(), next))
    }
}

/// Feed updates into the registry until `cancel` fires.
pub async fn poll_updates(
    transport: Arc<TelegramTransport>,
    registry: Arc<SessionRegistry>,
    timeout_secs: u64,
    cancel: CancellationToken,
) {
    let mut offset = 0;
    tracing::info!("Telegram polling started ({}s timeout)", timeout_secs);
    loop {
        let round = tokio::select! {
            r = transport.get_updates(offset, timeout_secs) => r,
            _ = cancel.cancelled() => break,
        };
        match round {
            Ok((updates, next)) => {
                offset = next;
                for update in updates {
                    let user_id = update.user_id();
                    match registry.dispatch(update).await {
                        Ok(true) => {}
                        Ok(false) => tracing::debug!("Update from user {} refused", user_id),
                        Err(e) => tracing::warn!("Dispatch to user {} failed: {}", user_id, e),
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Telegram poll failed: {}", e);
                tokio::select! {
                    _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }
    }
    tracing::info!("Telegram polling stopped");
}

fn reply_markup(keyboard: Option<&Keyboard>) -> serde_json::Value {
    let Some(keyboard) = keyboard.filter(|k| !k.is_empty()) else {
        return serde_json::json!({ "inline_keyboard": [] });
    };
    let rows: Vec<Vec<serde_json::Value>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| serde_json::json!({ "text": b.label, "callback_data": b.data }))
                .collect()
        })
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

// -- Telegram API response types --

#[derive(Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
    callback_query: Option<TgCallback>,
}

impl TgUpdate {
    fn into_update(self) -> Option<Update> {
        if let Some(m) = self.message {
            let from = m.from?;
            // Largest size comes last.
            let photo = m
                .photo
                .and_then(|sizes| sizes.into_iter().last())
                .map(|p| PhotoRef { file_id: p.file_id });
            return Some(Update::Message(InboundMessage {
                message_id: m.message_id,
                chat_id: m.chat.id,
                user_id: from.id,
                text: m.text.or(m.caption),
                photo,
                media_group_id: m.media_group_id,
            }));
        }
        let cb = self.callback_query?;
        let message = cb.message?;
        Some(Update::Callback(CallbackQuery {
            id: cb.id,
            chat_id: message.chat.id,
            user_id: cb.from.id,
            message_id: message.message_id,
            data: cb.data.unwrap_or_default(),
        }))
    }
}

#[derive(Deserialize)]
struct TgMessage {
    message_id: i64,
    chat: TgChat,
    from: Option<TgUser>,
    text: Option<String>,
    caption: Option<String>,
    photo: Option<Vec<TgPhotoSize>>,
    media_group_id: Option<String>,
}

#[derive(Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Deserialize)]
struct TgUser {
    #[serde(default)]
    id: i64,
    username: Option<String>,
    first_name: Option<String>,
}

#[derive(Deserialize)]
struct TgPhotoSize {
    file_id: String,
}

#[derive(Deserialize)]
struct TgCallback {
    id: String,
    from: TgUser,
    message: Option<TgCallbackMessage>,
    data: Option<String>,
}

#[derive(Deserialize)]
struct TgCallbackMessage {
    message_id: i64,
    chat: TgChat,
}

#[derive(Deserialize)]
struct SendMessageResp {
    message_id: i64,
}

#[derive(Deserialize)]
struct TgFile {
    file_path: Option<String>,
}

// -- ChatTransport implementation --

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if keyboard.is_some_and(|k| !k.is_empty()) {
            body["reply_markup"] = reply_markup(keyboard);
        }
        let sent: SendMessageResp = self.call("sendMessage", body).await?;
        Ok(sent.message_id)
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "reply_markup": reply_markup(keyboard),
        });
        match self.call::<serde_json::Value>("editMessageText", body).await {
            Ok(_) => Ok(()),
            // Re-rendering identical content is not an error for us.
            Err(BotError::Transport(msg)) if msg.contains("message is not modified") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let mut body = serde_json::json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = serde_json::Value::from(text);
        }
        self.call::<bool>("answerCallbackQuery", body).await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let file: TgFile = self
            .call("getFile", serde_json::json!({ "file_id": file_id }))
            .await?;
        let path = file
            .file_path
            .ok_or_else(|| BotError::Transport(format!("getFile: no path for {file_id}")))?;
        let url = format!("{TELEGRAM_API_BASE}/file/bot{}/{path}", self.bot_token);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| BotError::Transport(format!("download {file_id}: {e}")))?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| BotError::Transport(format!("download {file_id}: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(json: &str) -> Option<Update> {
        serde_json::from_str::<TgUpdate>(json).unwrap().into_update()
    }

    #[test]
    fn test_photo_message_takes_largest_size() {
        let update = parse(
            r#"{"update_id": 7, "message": {
                "message_id": 11, "chat": {"id": 5}, "from": {"id": 42, "first_name": "A"},
                "caption": "lamp", "media_group_id": "g1",
                "photo": [{"file_id": "small"}, {"file_id": "large"}]
            }}"#,
        );
        assert_eq!(
            update,
            Some(Update::Message(InboundMessage {
                message_id: 11,
                chat_id: 5,
                user_id: 42,
                text: Some("lamp".into()),
                photo: Some(PhotoRef {
                    file_id: "large".into()
                }),
                media_group_id: Some("g1".into()),
            }))
        );
    }

    #[test]
    fn test_callback_query() {
        let update = parse(
            r#"{"update_id": 8, "callback_query": {
                "id": "cb1", "from": {"id": 42}, "data": "confirm",
                "message": {"message_id": 99, "chat": {"id": 5}}
            }}"#,
        );
        assert_eq!(
            update,
            Some(Update::Callback(CallbackQuery {
                id: "cb1".into(),
                chat_id: 5,
                user_id: 42,
                message_id: 99,
                data: "confirm".into(),
            }))
        );
    }

    #[test]
    fn test_update_without_sender_is_skipped() {
        let update = parse(r#"{"update_id": 9, "message": {"message_id": 1, "chat": {"id": 5}}}"#);
        assert_eq!(update, None);
    }

    #[test]
    fn test_reply_markup_layout() {
        let kb = Keyboard::new()
            .row([("Yes", "ship:1"), ("No", "ship:0")])
            .button("Cancel", "cancel");
        let markup = reply_markup(Some(&kb));
        assert_eq!(markup["inline_keyboard"][0][1]["callback_data"], "ship:0");
        assert_eq!(markup["inline_keyboard"][1][0]["text"], "Cancel");
        assert_eq!(reply_markup(None)["inline_keyboard"], serde_json::json!([]));
    }
}
