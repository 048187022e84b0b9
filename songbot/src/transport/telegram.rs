//! Telegram Bot API client
//!
//! Long-polls `getUpdates` for inbound messages and button presses, and
//! implements [`ChatTransport`] for replies. Outbound calls share one rate
//! limiter to stay under the Bot API flood limits.

use super::{AudioUpload, ChatTransport, InboundEvent, TextFormat, TransportError};
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use songbot_common::{Keyboard, MessageId, SessionId};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";
const USER_AGENT: &str = concat!("songbot/", env!("CARGO_PKG_VERSION"));

/// Long-poll wait passed to getUpdates
const POLL_TIMEOUT_SECS: u64 = 30;

/// Slack on top of the long-poll wait before the HTTP request gives up
const HTTP_TIMEOUT_MARGIN_SECS: u64 = 10;

/// Ordinary JSON calls
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Audio uploads can be tens of megabytes on a slow link
const UPLOAD_TIMEOUT_SECS: u64 = 600;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Whole-request timeout for a Bot API method
fn request_timeout(method: &str) -> Duration {
    match method {
        "getUpdates" => Duration::from_secs(POLL_TIMEOUT_SECS + HTTP_TIMEOUT_MARGIN_SECS),
        "sendAudio" => Duration::from_secs(UPLOAD_TIMEOUT_SECS),
        _ => Duration::from_secs(REQUEST_TIMEOUT_SECS),
    }
}

/// Bot API global limit is about 30 messages per second
const REQUESTS_PER_SECOND: NonZeroU32 = match NonZeroU32::new(30) {
    Some(n) => n,
    None => panic!("rate must be non-zero"),
};

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, TransportError> {
        if self.ok {
            self.result
                .ok_or_else(|| TransportError::Parse("response marked ok without a result".to_string()))
        } else {
            Err(TransportError::Api {
                code: self.error_code.unwrap_or_default(),
                description: self.description.unwrap_or_default(),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    message: Option<Message>,
    data: Option<String>,
}

/// Convert one update into an inbound event
///
/// Updates without text or callback data (stickers, joins, edits …) are
/// dropped.
fn update_to_event(update: Update) -> Option<InboundEvent> {
    if let Some(message) = update.message {
        let text = message.text?;
        return Some(InboundEvent::Text {
            session: SessionId(message.chat.id),
            message: MessageId(message.message_id),
            text,
        });
    }

    let callback = update.callback_query?;
    let data = callback.data?;
    // Private chats share the user's id; fall back to it for inline messages
    let session = callback
        .message
        .as_ref()
        .map(|m| m.chat.id)
        .unwrap_or(callback.from.id);

    Some(InboundEvent::Action {
        session: SessionId(session),
        action_id: callback.id,
        message: callback.message.map(|m| MessageId(m.message_id)),
        data,
    })
}

/// Render a keyboard as a Bot API `InlineKeyboardMarkup`
pub fn keyboard_markup(keyboard: &Keyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| {
                    json!({
                        "text": button.label,
                        "callback_data": button.action.encode(),
                    })
                })
                .collect()
        })
        .collect();

    json!({ "inline_keyboard": rows })
}

/// Telegram Bot API client
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self, TransportError> {
        Self::with_api_url(TELEGRAM_API_URL, token)
    }

    /// Point the client at a different API host (local Bot API server)
    pub fn with_api_url(api_url: &str, token: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            rate_limiter: RateLimiter::direct(Quota::per_second(REQUESTS_PER_SECOND)),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Wait for the next batch of updates after `offset`
    ///
    /// Returns the events and the offset to pass on the next call.
    pub async fn poll_updates(&self, offset: i64) -> Result<(Vec<InboundEvent>, i64), TransportError> {
        let body = json!({
            "offset": offset,
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message", "callback_query"],
        });

        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(request_timeout("getUpdates"))
            .json(&body)
            .send()
            .await?;
        let updates: Vec<Update> = parse_response(response).await?;

        let next_offset = updates
            .iter()
            .map(|u| u.update_id + 1)
            .max()
            .unwrap_or(offset);

        if !updates.is_empty() {
            debug!(count = updates.len(), next_offset, "Received updates");
        }

        let events = updates.into_iter().filter_map(update_to_event).collect();
        Ok((events, next_offset))
    }

    /// Verify the token; returns the bot's username
    pub async fn get_me(&self) -> Result<String, TransportError> {
        #[derive(Deserialize)]
        struct Me {
            username: Option<String>,
        }

        let me: Me = self.call("getMe", &json!({})).await?;
        Ok(me.username.unwrap_or_default())
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, TransportError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .post(self.method_url(method))
            .timeout(request_timeout(method))
            .json(body)
            .send()
            .await?;

        parse_response(response).await
    }
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TransportError> {
    let status = response.status();
    let envelope: ApiResponse<T> = response
        .json()
        .await
        .map_err(|e| TransportError::Parse(format!("HTTP {}: {}", status, e)))?;
    envelope.into_result()
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_text(
        &self,
        chat: SessionId,
        text: &str,
        format: TextFormat,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError> {
        let mut body = json!({
            "chat_id": chat.0,
            "text": text,
        });
        if format == TextFormat::Markdown {
            body["parse_mode"] = json!("Markdown");
        }
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = keyboard_markup(keyboard);
        }

        let message: Message = self.call("sendMessage", &body).await?;
        Ok(MessageId(message.message_id))
    }

    async fn send_audio(&self, chat: SessionId, audio: &AudioUpload) -> Result<MessageId, TransportError> {
        let bytes = tokio::fs::read(&audio.path).await?;
        let file_name = audio
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());

        debug!(
            chat = %chat,
            file = %audio.path.display(),
            size = bytes.len(),
            "Uploading audio"
        );

        let form = Form::new()
            .text("chat_id", chat.to_string())
            .text("title", audio.title.clone())
            .text("performer", audio.performer.clone())
            .part("audio", Part::bytes(bytes).file_name(file_name).mime_str("audio/mpeg")?);

        self.rate_limiter.until_ready().await;
        let response = self
            .client
            .post(self.method_url("sendAudio"))
            .timeout(request_timeout("sendAudio"))
            .multipart(form)
            .send()
            .await?;

        let message: Message = parse_response(response).await?;
        Ok(MessageId(message.message_id))
    }

    async fn edit_keyboard(
        &self,
        chat: SessionId,
        message: MessageId,
        keyboard: &Keyboard,
    ) -> Result<(), TransportError> {
        let body = json!({
            "chat_id": chat.0,
            "message_id": message.0,
            "reply_markup": keyboard_markup(keyboard),
        });
        // Result is the edited Message, or `true` for inline messages
        let _: Value = self.call("editMessageReplyMarkup", &body).await?;
        Ok(())
    }

    async fn delete_message(&self, chat: SessionId, message: MessageId) -> Result<(), TransportError> {
        let body = json!({
            "chat_id": chat.0,
            "message_id": message.0,
        });
        let _: bool = self.call("deleteMessage", &body).await?;
        Ok(())
    }

    async fn acknowledge(&self, action_id: &str) -> Result<(), TransportError> {
        let body = json!({ "callback_query_id": action_id });
        let _: bool = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }
}
