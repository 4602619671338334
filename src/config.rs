// Server configuration.
//
// Every knob is a CLI flag with an environment fallback so the service can be
// configured entirely from the hosting platform's env vars.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::Level;
use url::Url;

use crate::downloader::catalog::CatalogSettings;
use crate::downloader::credentials::Credentials;
use crate::downloader::enricher::DEFAULT_LANGUAGE;
use crate::downloader::models::NetworkConfig;
use crate::downloader::orchestrator::EngineSettings;
use crate::downloader::relay::DEFAULT_WINDOW_BYTES;
use crate::downloader::stream::CHUNK_SIZE;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid Cobalt endpoint {url}: {reason}")]
    InvalidCobaltUrl { url: String, reason: String },

    #[error("Invalid proxy URL {url}: {reason}")]
    InvalidProxy { url: String, reason: String },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },

    #[error("Relay window must be at least {min} bytes, got {got}")]
    WindowTooSmall { min: usize, got: usize },

    #[error("Unknown log level: {0}")]
    LogLevel(String),
}

/// Command-line interface
#[derive(Debug, Clone, Parser)]
#[command(name = "youtube-relay")]
#[command(about = "Resolve YouTube links through fallback strategies and stream the media")]
#[command(version)]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 4000)]
    pub port: u16,

    /// Address to bind
    #[arg(long, env = "BIND_ADDRESS", default_value_t = Ipv4Addr::UNSPECIFIED)]
    pub bind: Ipv4Addr,

    /// Browser cookies exported as a JSON array
    #[arg(long, env = "YOUTUBE_COOKIES", hide_env_values = true)]
    pub cookies: Option<String>,

    /// Path to the yt-dlp binary
    #[arg(long, env = "YTDLP_PATH")]
    pub ytdlp_path: Option<String>,

    /// Cobalt-compatible API endpoint; the Cobalt strategy is disabled when unset
    #[arg(long, env = "COBALT_API_URL")]
    pub cobalt_url: Option<String>,

    /// HTTP or SOCKS5 proxy for upstream traffic
    #[arg(long, env = "PROXY_URL")]
    pub proxy: Option<String>,

    /// Upper bound for one strategy attempt, in seconds
    #[arg(long, env = "ATTEMPT_TIMEOUT_SECS", default_value_t = 30)]
    pub attempt_timeout_secs: u64,

    /// Pause after a rate-limited attempt, in milliseconds
    #[arg(long, env = "RATE_LIMIT_BACKOFF_MS", default_value_t = 750)]
    pub rate_limit_backoff_ms: u64,

    /// Bytes buffered between upstream and client per download
    #[arg(long, env = "RELAY_WINDOW_BYTES", default_value_t = DEFAULT_WINDOW_BYTES)]
    pub relay_window_bytes: usize,

    /// Preferred caption language for transcripts
    #[arg(long, env = "CAPTION_LANGUAGE", default_value = DEFAULT_LANGUAGE)]
    pub caption_language: String,

    /// Console log level (overridden by RUST_LOG)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    pub credentials: Option<Arc<Credentials>>,
    pub ytdlp_path: Option<String>,
    pub catalog: CatalogSettings,
    pub engine: EngineSettings,
    pub network: NetworkConfig,
    pub relay_window_bytes: usize,
    pub caption_language: String,
    pub log_level: Level,
}

impl ServerConfig {
    /// Validate CLI input. An unusable cookie blob is logged and ignored rather than rejected.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        if cli.attempt_timeout_secs == 0 {
            return Err(ConfigError::Zero {
                name: "ATTEMPT_TIMEOUT_SECS",
            });
        }
        if cli.relay_window_bytes < CHUNK_SIZE {
            return Err(ConfigError::WindowTooSmall {
                min: CHUNK_SIZE,
                got: cli.relay_window_bytes,
            });
        }

        let log_level = cli
            .log_level
            .parse::<Level>()
            .map_err(|_| ConfigError::LogLevel(cli.log_level.clone()))?;

        let cobalt_endpoint = non_empty(cli.cobalt_url)
            .map(|url| {
                Url::parse(&url)
                    .map(|_| url.clone())
                    .map_err(|e| ConfigError::InvalidCobaltUrl {
                        url: url.clone(),
                        reason: e.to_string(),
                    })
            })
            .transpose()?;

        let proxy = non_empty(cli.proxy)
            .map(|url| {
                reqwest::Proxy::all(url.as_str())
                    .map(|_| url.clone())
                    .map_err(|e| ConfigError::InvalidProxy {
                        url: url.clone(),
                        reason: e.to_string(),
                    })
            })
            .transpose()?;

        let attempt_timeout = Duration::from_secs(cli.attempt_timeout_secs);
        let network = NetworkConfig {
            proxy: proxy.clone(),
            timeout: cli.attempt_timeout_secs.min(u64::from(u32::MAX)) as u32,
        };

        Ok(Self {
            bind_address: SocketAddr::from((cli.bind, cli.port)),
            credentials: Credentials::load(cli.cookies.as_deref()),
            ytdlp_path: non_empty(cli.ytdlp_path),
            catalog: CatalogSettings {
                cobalt_endpoint,
                proxy,
                socket_timeout: Some(attempt_timeout),
            },
            engine: EngineSettings {
                attempt_timeout,
                rate_limit_backoff: Duration::from_millis(cli.rate_limit_backoff_ms),
            },
            network,
            relay_window_bytes: cli.relay_window_bytes,
            caption_language: cli.caption_language.trim().to_string(),
            log_level,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
