//! songbot - music search chat bot
//!
//! Resolves configuration, checks the external tooling, then long-polls the
//! Bot API until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use songbot::media::YtDlpProvider;
use songbot::transport::TelegramClient;
use songbot::{poller, sweeper, BotState};
use songbot_common::config::{self, BotConfig, Overrides};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for songbot
#[derive(Parser, Debug)]
#[command(name = "songbot")]
#[command(about = "Music search chat bot backed by yt-dlp")]
#[command(version)]
struct Args {
    /// TOML config file (default: ~/.config/songbot/config.toml)
    #[arg(short, long, env = "SONGBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Bot API token
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Results per page
    #[arg(long, env = "SONGBOT_PAGE_SIZE")]
    page_size: Option<usize>,

    /// Results requested per search
    #[arg(long, env = "SONGBOT_MAX_RESULTS")]
    max_results: Option<usize>,

    /// Query cache entry lifetime in seconds
    #[arg(long, env = "SONGBOT_CACHE_TTL")]
    cache_ttl: Option<u64>,

    /// Maximum query cache entries
    #[arg(long, env = "SONGBOT_CACHE_CAPACITY")]
    cache_capacity: Option<usize>,

    /// Concurrent search/download jobs
    #[arg(long, env = "SONGBOT_WORKERS")]
    workers: Option<usize>,

    /// Jobs allowed to wait for a worker
    #[arg(long, env = "SONGBOT_QUEUE_DEPTH")]
    queue_depth: Option<usize>,

    /// Idle seconds before a session is swept
    #[arg(long, env = "SONGBOT_SESSION_IDLE")]
    session_idle: Option<u64>,

    /// Staging directory for downloads
    #[arg(long, env = "SONGBOT_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// yt-dlp executable
    #[arg(long, env = "SONGBOT_YTDLP")]
    ytdlp: Option<String>,

    /// Proxy for retrying restricted downloads
    #[arg(long, env = "YTDLP_PROXY")]
    proxy: Option<String>,

    /// Netscape cookie file for yt-dlp
    #[arg(long, env = "YOUTUBE_COOKIES_FILE")]
    cookies_file: Option<PathBuf>,

    /// Cookie file contents; written to a private file in the temp dir
    #[arg(long, env = "YOUTUBE_COOKIES", hide_env_values = true)]
    cookies: Option<String>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            token: self.token.clone(),
            page_size: self.page_size,
            max_results: self.max_results,
            cache_ttl_secs: self.cache_ttl,
            cache_capacity: self.cache_capacity,
            workers: self.workers,
            queue_depth: self.queue_depth,
            session_idle_secs: self.session_idle,
            temp_dir: self.temp_dir.clone(),
            ytdlp_binary: self.ytdlp.clone(),
            proxy: self.proxy.clone(),
            cookies_file: self.cookies_file.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config file is read before tracing so its log level can seed the filter
    let config_path = config::resolve_config_path(args.config.as_deref());
    let toml_config = match &config_path {
        Some(path) => config::load_toml_config(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => None,
    };
    let config_missing = config_path.is_some() && toml_config.is_none();
    let toml_config = toml_config.unwrap_or_default();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting songbot v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
    );

    match (&config_path, config_missing) {
        (Some(path), true) => warn!("Config file {} not found, using defaults", path.display()),
        (Some(path), false) => info!("Config file: {}", path.display()),
        (None, _) => info!("No config file, using environment and defaults"),
    }

    let mut bot_config = BotConfig::resolve(args.overrides(), toml_config).context("Invalid configuration")?;

    // Held until main returns; dropping it removes the file
    let mut cookie_file = None;
    if bot_config.tunables.cookies_file.is_none() {
        if let Some(cookies) = args.cookies.as_deref().filter(|c| !c.trim().is_empty()) {
            let file = config::write_cookie_file(cookies, &bot_config.tunables.temp_dir)
                .context("Failed to write cookie file")?;
            info!("Cookie file written to {}", file.path().display());
            bot_config.tunables.cookies_file = Some(file.path().to_path_buf());
            cookie_file = Some(file);
        }
    }

    let tunables = bot_config.tunables;
    info!(
        page_size = tunables.page_size,
        max_results = tunables.max_results,
        cache_ttl_secs = tunables.cache_ttl.as_secs(),
        workers = tunables.workers,
        queue_depth = tunables.queue_depth,
        proxy = tunables.proxy.is_some(),
        cookies = tunables.cookies_file.is_some(),
        "Configuration resolved"
    );

    let media = YtDlpProvider::new(&tunables);
    match media.version().await {
        Ok(version) => info!("yt-dlp version {}", version),
        Err(e) => warn!("yt-dlp unavailable, searches will fail: {}", e),
    }

    let client = Arc::new(TelegramClient::new(&bot_config.token).context("Failed to build Bot API client")?);
    let username = client.get_me().await.context("Bot API rejected the token")?;
    info!("Authorized as @{}", username);

    let state = BotState::new(tunables, Arc::new(media), client.clone()).context("Failed to initialize state")?;

    let shutdown = CancellationToken::new();
    let sweeper = sweeper::spawn_sweeper(state.clone(), shutdown.clone());
    let polling = tokio::spawn(poller::run_polling(state.clone(), client, shutdown.clone()));

    shutdown_signal().await;
    shutdown.cancel();
    state.pool.close();

    let _ = tokio::join!(sweeper, polling);

    drop(cookie_file);

    let uptime = Utc::now() - state.startup_time;
    info!(uptime_secs = uptime.num_seconds(), "Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
