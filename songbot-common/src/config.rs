//! Configuration loading
//!
//! Tunables are resolved once at startup in this priority order:
//! 1. Command-line argument / environment variable (both captured by the
//!    binary's argument parser into [`Overrides`])
//! 2. TOML config file
//! 3. Compiled defaults
//!
//! The resulting [`BotConfig`] is immutable for the life of the process.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Environment variable naming an explicit TOML config file
pub const CONFIG_ENV_VAR: &str = "SONGBOT_CONFIG";

/// Token value shipped in sample configs; treated as missing
pub const PLACEHOLDER_TOKEN: &str = "YourTokenHere";

/// Logging section of the TOML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter directive (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Contents of the optional TOML config file
///
/// Every field is optional; absent fields fall through to compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TomlConfig {
    pub token: Option<String>,
    pub page_size: Option<usize>,
    pub max_results: Option<usize>,
    pub cache_ttl_secs: Option<u64>,
    pub cache_capacity: Option<usize>,
    pub workers: Option<usize>,
    pub queue_depth: Option<usize>,
    pub session_idle_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub temp_dir: Option<PathBuf>,
    pub embed_thumbnail: Option<bool>,
    pub ytdlp_binary: Option<String>,
    pub proxy: Option<String>,
    pub cookies_file: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Values taken from the command line or environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub token: Option<String>,
    pub page_size: Option<usize>,
    pub max_results: Option<usize>,
    pub cache_ttl_secs: Option<u64>,
    pub cache_capacity: Option<usize>,
    pub workers: Option<usize>,
    pub queue_depth: Option<usize>,
    pub session_idle_secs: Option<u64>,
    pub temp_dir: Option<PathBuf>,
    pub ytdlp_binary: Option<String>,
    pub proxy: Option<String>,
    pub cookies_file: Option<PathBuf>,
}

/// Process-wide tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunables {
    /// Results per page
    pub page_size: usize,
    /// Results requested from the search provider
    pub max_results: usize,
    /// Lifetime of a query cache entry
    pub cache_ttl: Duration,
    /// Maximum query cache entries
    pub cache_capacity: usize,
    /// Concurrent search/download jobs
    pub workers: usize,
    /// Jobs allowed to wait for a worker before new ones are rejected
    pub queue_depth: usize,
    /// Sessions idle longer than this are swept
    pub session_idle: Duration,
    /// Period of the idle sweep
    pub sweep_interval: Duration,
    /// Where downloaded audio is staged
    pub temp_dir: PathBuf,
    /// Embed the video thumbnail as cover art
    pub embed_thumbnail: bool,
    /// yt-dlp executable name or path
    pub ytdlp_binary: String,
    /// Proxy used to retry restricted downloads
    pub proxy: Option<String>,
    /// Netscape cookie file passed to yt-dlp
    pub cookies_file: Option<PathBuf>,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            page_size: 10,
            max_results: 30,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 200,
            workers: 2,
            queue_depth: 8,
            session_idle: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            temp_dir: std::env::temp_dir(),
            embed_thumbnail: true,
            ytdlp_binary: "yt-dlp".to_string(),
            proxy: None,
            cookies_file: None,
        }
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub tunables: Tunables,
    pub log_level: String,
}

impl BotConfig {
    /// Layer overrides over the TOML file over compiled defaults, then validate
    pub fn resolve(overrides: Overrides, toml: TomlConfig) -> Result<Self> {
        let defaults = Tunables::default();

        let token = overrides
            .token
            .or(toml.token)
            .filter(|t| !t.trim().is_empty() && t != PLACEHOLDER_TOKEN)
            .ok_or_else(|| {
                Error::Config(
                    "Bot token not configured. Set TELEGRAM_TOKEN, pass --token, \
                     or add `token = \"...\"` to the config file"
                        .to_string(),
                )
            })?;

        let tunables = Tunables {
            page_size: overrides.page_size.or(toml.page_size).unwrap_or(defaults.page_size),
            max_results: overrides.max_results.or(toml.max_results).unwrap_or(defaults.max_results),
            cache_ttl: overrides
                .cache_ttl_secs
                .or(toml.cache_ttl_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            cache_capacity: overrides
                .cache_capacity
                .or(toml.cache_capacity)
                .unwrap_or(defaults.cache_capacity),
            workers: overrides.workers.or(toml.workers).unwrap_or(defaults.workers),
            queue_depth: overrides.queue_depth.or(toml.queue_depth).unwrap_or(defaults.queue_depth),
            session_idle: overrides
                .session_idle_secs
                .or(toml.session_idle_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_idle),
            sweep_interval: toml
                .sweep_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            temp_dir: overrides.temp_dir.or(toml.temp_dir).unwrap_or(defaults.temp_dir),
            embed_thumbnail: toml.embed_thumbnail.unwrap_or(defaults.embed_thumbnail),
            ytdlp_binary: overrides
                .ytdlp_binary
                .or(toml.ytdlp_binary)
                .unwrap_or(defaults.ytdlp_binary),
            proxy: overrides.proxy.or(toml.proxy).filter(|p| !p.trim().is_empty()),
            cookies_file: overrides.cookies_file.or(toml.cookies_file),
        };

        tunables.validate()?;

        Ok(Self {
            token,
            tunables,
            log_level: toml.logging.level,
        })
    }
}

impl Tunables {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("page_size", self.page_size),
            ("max_results", self.max_results),
            ("cache_capacity", self.cache_capacity),
            ("workers", self.workers),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be at least 1")));
            }
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::Config("sweep_interval_secs must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Locate the TOML config file
///
/// Explicit path (CLI) wins, then `SONGBOT_CONFIG`, then
/// `<config dir>/songbot/config.toml` if it exists.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("songbot").join("config.toml"))
        .filter(|p| p.exists())
}

/// Read the TOML config file
///
/// Returns `None` when the file does not exist so the caller can warn and
/// fall back to defaults. A file that exists but does not parse is a
/// configuration error.
pub fn load_toml_config(path: &Path) -> Result<Option<TomlConfig>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };

    Ok(Some(toml::from_str(&content)?))
}

/// Write cookie text to a private file for yt-dlp
///
/// The file gets a random name under `dir`, is created exclusively (an
/// existing file or symlink is never reused) and is readable only by the
/// owner on Unix. It is removed when the returned handle is dropped.
pub fn write_cookie_file(content: &str, dir: &Path) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("songbot_cookies_")
        .suffix(".txt")
        .tempfile_in(dir)?;

    file.write_all(content.as_bytes())?;
    file.flush()?;

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_token() -> Overrides {
        Overrides {
            token: Some("123:abc".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_match_reference_tunables() {
        let t = Tunables::default();
        assert_eq!(t.page_size, 10);
        assert_eq!(t.max_results, 30);
        assert_eq!(t.cache_ttl, Duration::from_secs(300));
        assert_eq!(t.cache_capacity, 200);
        assert_eq!(t.workers, 2);
        assert!(t.embed_thumbnail);
    }

    #[test]
    fn test_override_beats_toml_beats_default() {
        let toml = TomlConfig {
            page_size: Some(5),
            max_results: Some(50),
            ..Default::default()
        };
        let overrides = Overrides {
            page_size: Some(8),
            ..with_token()
        };

        let config = BotConfig::resolve(overrides, toml).unwrap();
        assert_eq!(config.tunables.page_size, 8);
        assert_eq!(config.tunables.max_results, 50);
        assert_eq!(config.tunables.cache_capacity, 200);
    }

    #[test]
    fn test_missing_or_placeholder_token_rejected() {
        assert!(matches!(
            BotConfig::resolve(Overrides::default(), TomlConfig::default()),
            Err(Error::Config(_))
        ));

        let placeholder = Overrides {
            token: Some(PLACEHOLDER_TOKEN.to_string()),
            ..Default::default()
        };
        assert!(BotConfig::resolve(placeholder, TomlConfig::default()).is_err());
    }

    #[test]
    fn test_zero_tunables_rejected() {
        for overrides in [
            Overrides { page_size: Some(0), ..with_token() },
            Overrides { cache_capacity: Some(0), ..with_token() },
            Overrides { workers: Some(0), ..with_token() },
        ] {
            assert!(BotConfig::resolve(overrides, TomlConfig::default()).is_err());
        }
    }

    #[test]
    fn test_blank_proxy_ignored() {
        let overrides = Overrides {
            proxy: Some("  ".to_string()),
            ..with_token()
        };
        let config = BotConfig::resolve(overrides, TomlConfig::default()).unwrap();
        assert_eq!(config.tunables.proxy, None);
    }
}
