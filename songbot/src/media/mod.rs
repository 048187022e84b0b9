//! Media search and download
//!
//! [`MediaProvider`] is the seam to the external extraction tooling. The
//! production implementation shells out to yt-dlp ([`ytdlp::YtDlpProvider`]).
//!
//! Downloaded files are owned by a [`TempArtifact`]; dropping it removes the
//! file, so a failed delivery never leaves audio behind.

pub mod ytdlp;

use async_trait::async_trait;
use songbot_common::ResultItem;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub use ytdlp::YtDlpProvider;

/// Media provider errors
#[derive(Debug, Error)]
pub enum MediaError {
    /// Source requires login or is blocked in this region; do not retry
    #[error("Access restricted: {0}")]
    Restricted(String),

    /// Extraction tool is not installed
    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    /// Tool ran and failed
    #[error("{0}")]
    Failed(String),

    /// Tool output could not be understood
    #[error("Failed to parse tool output: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Terminal errors are reported as-is and never retried
    pub fn is_terminal(&self) -> bool {
        matches!(self, MediaError::Restricted(_))
    }
}

/// A transcoded audio file plus what the source said about it
#[derive(Debug)]
pub struct FetchedAudio {
    pub artifact: TempArtifact,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub thumbnail: Option<String>,
}

/// Search and download backend
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Up to `limit` hits for `query`, in provider order
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ResultItem>, MediaError>;

    /// Download `locator` and transcode it to MP3 on local storage
    async fn fetch_audio(&self, locator: &str) -> Result<FetchedAudio, MediaError>;
}

/// A file on local storage removed when this guard is dropped
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(file = %self.path.display(), "Removed temporary audio"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %self.path.display(), "Failed to remove temporary audio: {}", e),
        }
    }
}
