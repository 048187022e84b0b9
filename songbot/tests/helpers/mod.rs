//! Test Helper Utilities
//!
//! In-memory chat transport and media provider for driving the dispatcher
//! without the network or yt-dlp.

#![allow(dead_code)]

use async_trait::async_trait;
use songbot::media::{FetchedAudio, MediaError, MediaProvider, TempArtifact};
use songbot::transport::{AudioUpload, ChatTransport, InboundEvent, TextFormat, TransportError};
use songbot::BotState;
use songbot_common::config::Tunables;
use songbot_common::{Action, Keyboard, MessageId, ResultItem, SessionId};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Semaphore;

/// One outbound call seen by [`FakeTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        chat: SessionId,
        id: MessageId,
        text: String,
        format: TextFormat,
        keyboard: Option<Keyboard>,
    },
    Audio {
        chat: SessionId,
        upload: AudioUpload,
        /// Whether the file was on disk at upload time
        file_existed: bool,
    },
    Edit {
        chat: SessionId,
        message: MessageId,
        keyboard: Keyboard,
    },
    Delete {
        chat: SessionId,
        message: MessageId,
    },
    Ack(String),
}

/// Records every call and hands out increasing message ids
#[derive(Default)]
pub struct FakeTransport {
    calls: Mutex<Vec<Sent>>,
    next_id: AtomicI64,
    fail_deletes: bool,
    reject_markdown: bool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every delete fails with an API error
    pub fn failing_deletes() -> Arc<Self> {
        Arc::new(Self {
            fail_deletes: true,
            ..Self::default()
        })
    }

    /// Every Markdown send fails the way an entity parse error does
    pub fn rejecting_markdown() -> Arc<Self> {
        Arc::new(Self {
            reject_markdown: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<Sent> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Text of every sent message, in order
    pub fn texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Last message sent with a keyboard
    pub fn last_keyboard_message(&self) -> Option<(MessageId, String, Keyboard)> {
        self.calls().into_iter().rev().find_map(|c| match c {
            Sent::Text {
                id,
                text,
                keyboard: Some(keyboard),
                ..
            } => Some((id, text, keyboard)),
            _ => None,
        })
    }

    pub fn edits(&self) -> Vec<(MessageId, Keyboard)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Sent::Edit { message, keyboard, .. } => Some((message, keyboard)),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<MessageId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Sent::Delete { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn audios(&self) -> Vec<(AudioUpload, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Sent::Audio {
                    upload, file_existed, ..
                } => Some((upload, file_existed)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Sent) {
        self.calls.lock().unwrap().push(call);
    }

    fn allocate_id(&self) -> MessageId {
        MessageId(1000 + self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn send_text(
        &self,
        chat: SessionId,
        text: &str,
        format: TextFormat,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError> {
        if self.reject_markdown && format == TextFormat::Markdown {
            return Err(TransportError::Api {
                code: 400,
                description: "Bad Request: can't parse entities".to_string(),
            });
        }
        let id = self.allocate_id();
        self.record(Sent::Text {
            chat,
            id,
            text: text.to_string(),
            format,
            keyboard: keyboard.cloned(),
        });
        Ok(id)
    }

    async fn send_audio(&self, chat: SessionId, audio: &AudioUpload) -> Result<MessageId, TransportError> {
        let id = self.allocate_id();
        self.record(Sent::Audio {
            chat,
            upload: audio.clone(),
            file_existed: audio.path.exists(),
        });
        Ok(id)
    }

    async fn edit_keyboard(
        &self,
        chat: SessionId,
        message: MessageId,
        keyboard: &Keyboard,
    ) -> Result<(), TransportError> {
        self.record(Sent::Edit {
            chat,
            message,
            keyboard: keyboard.clone(),
        });
        Ok(())
    }

    async fn delete_message(&self, chat: SessionId, message: MessageId) -> Result<(), TransportError> {
        self.record(Sent::Delete { chat, message });
        if self.fail_deletes {
            return Err(TransportError::Api {
                code: 400,
                description: "Bad Request: message can't be deleted".to_string(),
            });
        }
        Ok(())
    }

    async fn acknowledge(&self, action_id: &str) -> Result<(), TransportError> {
        self.record(Sent::Ack(action_id.to_string()));
        Ok(())
    }
}

/// How [`FakeMedia::fetch_audio`] behaves
#[derive(Debug, Clone)]
pub enum FetchBehavior {
    /// Write a small file and report this source title
    Succeed { title: Option<String> },
    Restricted,
    Fail(String),
}

/// Scripted search results and downloads
pub struct FakeMedia {
    search_results: Mutex<Result<Vec<ResultItem>, String>>,
    fetch: Mutex<FetchBehavior>,
    /// When set, searches wait for a permit before answering
    gate: Option<Arc<Semaphore>>,
    pub dir: TempDir,
    pub searches: AtomicUsize,
    pub fetches: AtomicUsize,
    pub last_fetch: Mutex<Option<PathBuf>>,
}

impl FakeMedia {
    pub fn new(results: Vec<ResultItem>) -> Self {
        Self {
            search_results: Mutex::new(Ok(results)),
            fetch: Mutex::new(FetchBehavior::Succeed { title: None }),
            gate: None,
            dir: TempDir::new().unwrap(),
            searches: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            last_fetch: Mutex::new(None),
        }
    }

    pub fn failing_search(message: &str) -> Self {
        let media = Self::new(Vec::new());
        *media.search_results.lock().unwrap() = Err(message.to_string());
        media
    }

    /// Searches block until permits are added to `gate`
    pub fn gated(results: Vec<ResultItem>, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(results)
        }
    }

    pub fn set_results(&self, results: Vec<ResultItem>) {
        *self.search_results.lock().unwrap() = Ok(results);
    }

    pub fn set_fetch(&self, behavior: FetchBehavior) {
        *self.fetch.lock().unwrap() = behavior;
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaProvider for FakeMedia {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<ResultItem>, MediaError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }

        let results = self.search_results.lock().unwrap().clone();
        results
            .map(|items| items.into_iter().take(limit).collect())
            .map_err(MediaError::Failed)
    }

    async fn fetch_audio(&self, locator: &str) -> Result<FetchedAudio, MediaError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst);
        let behavior = self.fetch.lock().unwrap().clone();

        match behavior {
            FetchBehavior::Succeed { title } => {
                let path = self.dir.path().join(format!("yt_fake{n}.mp3"));
                std::fs::write(&path, locator.as_bytes())?;
                *self.last_fetch.lock().unwrap() = Some(path.clone());
                Ok(FetchedAudio {
                    artifact: TempArtifact::new(path),
                    title,
                    uploader: Some("Fake Uploader".to_string()),
                    thumbnail: None,
                })
            }
            FetchBehavior::Restricted => Err(MediaError::Restricted(
                "ERROR: Sign in to confirm you're not a bot".to_string(),
            )),
            FetchBehavior::Fail(message) => Err(MediaError::Failed(message)),
        }
    }
}

/// `n` distinct results titled "Artist {i} - Song {i}"
pub fn results(n: usize) -> Vec<ResultItem> {
    (0..n)
        .map(|i| {
            ResultItem::new(
                format!("vid{i}"),
                format!("Artist {i} - Song {i}"),
                format!("https://www.youtube.com/watch?v=vid{i}"),
            )
        })
        .collect()
}

pub fn test_tunables() -> Tunables {
    Tunables {
        page_size: 10,
        ..Tunables::default()
    }
}

pub fn build_state(tunables: Tunables, media: Arc<FakeMedia>, transport: Arc<FakeTransport>) -> BotState {
    BotState::new(tunables, media, transport).unwrap()
}

pub fn text(session: i64, message: i64, text: &str) -> InboundEvent {
    InboundEvent::Text {
        session: SessionId(session),
        message: MessageId(message),
        text: text.to_string(),
    }
}

pub fn press(session: i64, message: Option<MessageId>, action: Action) -> InboundEvent {
    press_raw(session, message, &action.encode())
}

pub fn press_raw(session: i64, message: Option<MessageId>, data: &str) -> InboundEvent {
    InboundEvent::Action {
        session: SessionId(session),
        action_id: format!("cb-{session}"),
        message,
        data: data.to_string(),
    }
}

/// Labels of the navigation row (last row)
pub fn nav_labels(keyboard: &Keyboard) -> Vec<String> {
    keyboard
        .rows
        .last()
        .map(|row| row.iter().map(|b| b.label.clone()).collect())
        .unwrap_or_default()
}

/// Labels of the item rows (every row but the last)
pub fn item_labels(keyboard: &Keyboard) -> Vec<String> {
    let n = keyboard.rows.len().saturating_sub(1);
    keyboard.rows[..n]
        .iter()
        .flat_map(|row| row.iter().map(|b| b.label.clone()))
        .collect()
}
