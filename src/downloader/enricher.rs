// Caption enricher - best-effort transcript text for the info endpoint
//
// Never fails: any problem collapses to the fixed placeholder.

use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use super::models::{CaptionTrack, NetworkConfig};
use super::utils::build_http_client;

/// Shown when no transcript could be produced
pub const PLACEHOLDER: &str = "[System] This video has no detailed or auto-generated captions.";

pub const DEFAULT_LANGUAGE: &str = "vi";

lazy_static! {
    static ref TEXT_RE: Regex = Regex::new(r#"<text start="([\d.]+)"[^>]*>([^<]+)</text>"#).unwrap();
}

/// Fetches timed-text XML for a track
#[async_trait]
pub trait CaptionFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, String>;
}

/// reqwest-backed fetcher
pub struct HttpCaptionFetcher {
    network: NetworkConfig,
}

impl HttpCaptionFetcher {
    pub fn new(network: NetworkConfig) -> Self {
        Self { network }
    }
}

#[async_trait]
impl CaptionFetcher for HttpCaptionFetcher {
    async fn fetch(&self, url: &str) -> Result<String, String> {
        let client = build_http_client(&self.network)?;
        let response = client
            .get(url)
            .timeout(Duration::from_secs(u64::from(self.network.timeout)))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("Caption fetch returned HTTP {}", response.status()));
        }
        response.text().await.map_err(|e| e.to_string())
    }
}

pub struct CaptionEnricher {
    fetcher: Box<dyn CaptionFetcher>,
    language: String,
}

impl CaptionEnricher {
    pub fn new(fetcher: Box<dyn CaptionFetcher>, language: impl Into<String>) -> Self {
        Self {
            fetcher,
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Transcript for the preferred-language track, or [`PLACEHOLDER`]
    pub async fn enrich(&self, tracks: &[CaptionTrack]) -> String {
        let Some(track) = self.pick_track(tracks) else {
            debug!("No caption tracks available");
            return PLACEHOLDER.to_string();
        };

        debug!(language = %track.language_code, "Fetching captions");
        match self.fetcher.fetch(&track.base_url).await {
            Ok(xml) => {
                let rendered = render_transcript(&xml);
                if rendered.is_empty() {
                    PLACEHOLDER.to_string()
                } else {
                    rendered
                }
            }
            Err(e) => {
                warn!("Error fetching caption: {}", e);
                PLACEHOLDER.to_string()
            }
        }
    }

    /// Preferred language first, otherwise the first track
    pub fn pick_track<'a>(&self, tracks: &'a [CaptionTrack]) -> Option<&'a CaptionTrack> {
        tracks
            .iter()
            .find(|t| t.language_code == self.language)
            .or_else(|| tracks.first())
    }
}

/// Render `<text start="..">..</text>` entries as `[mm:ss] text` lines
pub fn render_transcript(xml: &str) -> String {
    TEXT_RE
        .captures_iter(xml)
        .filter_map(|caps| {
            let start: f64 = caps[1].parse().ok()?;
            Some(format!("[{}] {}", format_time(start), unescape(&caps[2])))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `mm:ss`, minutes not wrapped at the hour
fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

fn unescape(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
