//! Chat transport
//!
//! The dispatcher talks to the chat service only through [`ChatTransport`].
//! [`telegram::TelegramClient`] implements it against the Telegram Bot API;
//! tests use an in-memory fake.

pub mod telegram;

use async_trait::async_trait;
use songbot_common::{Keyboard, MessageId, SessionId};
use std::path::PathBuf;
use thiserror::Error;

pub use telegram::TelegramClient;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request never got a response
    #[error("Network error: {0}")]
    Network(String),

    /// Chat service rejected the call
    #[error("API error {code}: {description}")]
    Api { code: i64, description: String },

    /// Response body was not what the API documents
    #[error("Parse error: {0}")]
    Parse(String),

    /// Reading the upload from disk failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TransportError::Parse(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

/// Text rendering mode for outgoing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Markdown,
}

/// Audio attachment to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioUpload {
    /// Local MP3 file
    pub path: PathBuf,
    pub title: String,
    pub performer: String,
}

/// Something the user did in a chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Plain text message
    Text {
        session: SessionId,
        message: MessageId,
        text: String,
    },
    /// Button press carrying an encoded action
    Action {
        session: SessionId,
        /// Opaque id used to acknowledge the press
        action_id: String,
        /// Message the button was attached to
        message: Option<MessageId>,
        data: String,
    },
}

impl InboundEvent {
    pub fn session(&self) -> SessionId {
        match self {
            InboundEvent::Text { session, .. } | InboundEvent::Action { session, .. } => *session,
        }
    }
}

/// Outbound chat operations
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a text message, optionally with a keyboard
    async fn send_text(
        &self,
        chat: SessionId,
        text: &str,
        format: TextFormat,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError>;

    /// Send an audio file with title/performer metadata
    async fn send_audio(&self, chat: SessionId, audio: &AudioUpload) -> Result<MessageId, TransportError>;

    /// Replace the keyboard on an existing message (empty keyboard removes it)
    async fn edit_keyboard(
        &self,
        chat: SessionId,
        message: MessageId,
        keyboard: &Keyboard,
    ) -> Result<(), TransportError>;

    async fn delete_message(&self, chat: SessionId, message: MessageId) -> Result<(), TransportError>;

    /// Acknowledge a button press so the client stops its spinner
    async fn acknowledge(&self, action_id: &str) -> Result<(), TransportError>;
}
