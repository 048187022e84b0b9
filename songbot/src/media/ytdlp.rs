//! yt-dlp media provider
//!
//! Search runs `yt-dlp --flat-playlist -J --skip-download "ytsearchN:<query>"` and reads the
//! playlist entries. Download extracts the best audio stream, has ffmpeg
//! transcode it to 192k MP3 with metadata (and cover art when enabled), and
//! reads the info JSON printed alongside.
//!
//! Login/region restrictions are detected from stderr. When a proxy is
//! configured a restricted download is retried once through it.

use super::{FetchedAudio, MediaError, MediaProvider, TempArtifact};
use async_trait::async_trait;
use serde::Deserialize;
use songbot_common::config::Tunables;
use songbot_common::ResultItem;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// stderr fragments (lowercase) meaning the video cannot be fetched anonymously
const RESTRICTION_MARKERS: &[&str] = &["sign in to confirm", "region-restricted"];

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    entries: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DownloadInfo {
    title: Option<String>,
    uploader: Option<String>,
    thumbnail: Option<String>,
}

/// Parse `-J` output of a flat search into result items
///
/// Entries without an id are skipped and a missing title becomes the id. The
/// entry URL is used as locator when it is absolute, otherwise a watch URL is
/// built from the id.
fn parse_search_output(stdout: &[u8]) -> Result<Vec<ResultItem>, MediaError> {
    let page: SearchPage =
        serde_json::from_slice(stdout).map_err(|e| MediaError::Parse(e.to_string()))?;

    Ok(page
        .entries
        .into_iter()
        .filter_map(|entry| {
            let id = entry.id?;
            let locator = match entry.url {
                Some(url) if url.starts_with("http") => url,
                _ => format!("{WATCH_URL}{id}"),
            };
            let title = entry
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| id.clone());
            Some(ResultItem { id, title, locator })
        })
        .collect())
}

/// Info JSON is the first stdout line; a missing or odd line is not fatal
fn parse_download_info(stdout: &[u8]) -> DownloadInfo {
    let text = String::from_utf8_lossy(stdout);
    text.lines()
        .find(|line| line.trim_start().starts_with('{'))
        .and_then(|line| serde_json::from_str(line).ok())
        .unwrap_or_default()
}

/// Map a failed run's stderr to an error
fn classify_failure(stderr: &[u8]) -> MediaError {
    let text = String::from_utf8_lossy(stderr);
    let lowered = text.to_lowercase();

    let summary = text
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("yt-dlp exited with an error")
        .trim()
        .to_string();

    if RESTRICTION_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        MediaError::Restricted(summary)
    } else {
        MediaError::Failed(summary)
    }
}

fn is_output_of(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix)
}

/// First `<prefix>*.mp3` in `dir`
fn find_output(dir: &Path, prefix: &str) -> std::io::Result<Option<PathBuf>> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if is_output_of(&name, prefix) && name.to_lowercase().ends_with(".mp3") {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

/// Remove every file left behind by a failed download
fn remove_partials(dir: &Path, prefix: &str) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        if is_output_of(&entry.file_name().to_string_lossy(), prefix) {
            // Wrapping in an artifact reuses its logging removal
            drop(TempArtifact::new(entry.path()));
        }
    }
}

/// yt-dlp backed search and download
pub struct YtDlpProvider {
    binary: String,
    temp_dir: PathBuf,
    embed_thumbnail: bool,
    proxy: Option<String>,
    cookies_file: Option<PathBuf>,
}

impl YtDlpProvider {
    pub fn new(tunables: &Tunables) -> Self {
        Self {
            binary: tunables.ytdlp_binary.clone(),
            temp_dir: tunables.temp_dir.clone(),
            embed_thumbnail: tunables.embed_thumbnail,
            proxy: tunables.proxy.clone(),
            cookies_file: tunables.cookies_file.clone(),
        }
    }

    /// Installed yt-dlp version, or `ToolNotFound`
    pub async fn version(&self) -> Result<String, MediaError> {
        let output = self.run(vec!["--version".into()]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn common_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--no-warnings".into()];
        if let Some(cookies) = &self.cookies_file {
            args.push("--cookies".into());
            args.push(cookies.into());
        }
        args
    }

    async fn run(&self, args: Vec<OsString>) -> Result<Output, MediaError> {
        Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MediaError::ToolNotFound(self.binary.clone())
                } else {
                    MediaError::Io(e)
                }
            })
    }

    async fn download(&self, locator: &str, prefix: &str, proxy: Option<&str>) -> Result<FetchedAudio, MediaError> {
        let template = self.temp_dir.join(format!("{prefix}.%(ext)s"));

        let mut args = self.common_args();
        args.extend(
            [
                "--no-playlist",
                "-f",
                "bestaudio/best",
                "-x",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "192K",
                "--add-metadata",
                "--dump-json",
                "--no-simulate",
            ]
            .map(OsString::from),
        );
        if self.embed_thumbnail {
            args.push("--embed-thumbnail".into());
        }
        if let Some(proxy) = proxy {
            args.push("--proxy".into());
            args.push(proxy.into());
        }
        args.push("-o".into());
        args.push(template.into());
        args.push(locator.into());

        debug!(locator, prefix, via_proxy = proxy.is_some(), "Running yt-dlp download");
        let output = self.run(args).await?;

        if !output.status.success() {
            return Err(classify_failure(&output.stderr));
        }

        let path = find_output(&self.temp_dir, prefix)?
            .ok_or_else(|| MediaError::Failed("yt-dlp finished without producing an MP3".to_string()))?;
        let info = parse_download_info(&output.stdout);

        Ok(FetchedAudio {
            artifact: TempArtifact::new(path),
            title: info.title,
            uploader: info.uploader,
            thumbnail: info.thumbnail,
        })
    }
}

#[async_trait]
impl MediaProvider for YtDlpProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ResultItem>, MediaError> {
        let mut args = self.common_args();
        args.extend(["--flat-playlist", "-J", "--skip-download"].map(OsString::from));
        args.push(format!("ytsearch{limit}:{query}").into());

        let output = self.run(args).await?;
        if !output.status.success() {
            return Err(classify_failure(&output.stderr));
        }

        let items = parse_search_output(&output.stdout)?;
        debug!(query, hits = items.len(), "yt-dlp search completed");
        Ok(items)
    }

    async fn fetch_audio(&self, locator: &str) -> Result<FetchedAudio, MediaError> {
        let prefix = format!("yt_{}", Uuid::new_v4().simple());

        let mut result = self.download(locator, &prefix, None).await;

        let restricted = matches!(result, Err(MediaError::Restricted(_)));
        if let (true, Some(proxy)) = (restricted, self.proxy.as_deref()) {
            info!(locator, "Restricted download, retrying through proxy");
            remove_partials(&self.temp_dir, &prefix);
            result = self.download(locator, &prefix, Some(proxy)).await;
        }

        if let Err(e) = &result {
            if e.is_terminal() {
                warn!(locator, "Skipping restricted video: {}", e);
            }
            remove_partials(&self.temp_dir, &prefix);
        }

        result
    }
}
