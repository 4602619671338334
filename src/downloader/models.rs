// Common data models for downloader

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

lazy_static! {
    static ref VIDEO_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap();
}

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("URL is missing")]
    Missing,

    #[error("Invalid URL: {0}")]
    Malformed(String),

    #[error("Not a YouTube video link: {0}")]
    NotYoutube(String),

    #[error("No video id in link: {0}")]
    NoVideoId(String),

    #[error("No playlist id in link: {0}")]
    NoPlaylistId(String),
}

/// Parse user input as a URL, tolerating a missing scheme
fn parse_url(input: &str) -> Result<Url, TargetError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TargetError::Missing);
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    Url::parse(&with_scheme).map_err(|_| TargetError::Malformed(trimmed.to_string()))
}

fn is_youtube_host(host: &str) -> bool {
    YOUTUBE_HOSTS.contains(&host)
}

/// A validated video reference, normalized to the canonical watch URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    video_id: String,
    url: String,
}

impl Target {
    /// Validate a user-supplied link.
    ///
    /// Accepts `watch?v=`, `youtu.be/`, `shorts/`, `embed/`, `live/` and `v/` forms.
    pub fn parse(input: &str) -> Result<Self, TargetError> {
        let url = parse_url(input)?;
        let host = url.host_str().unwrap_or("").to_lowercase();

        let candidate = if host == "youtu.be" {
            url.path_segments()
                .and_then(|mut segments| segments.next())
                .map(str::to_string)
        } else if is_youtube_host(&host) {
            let mut segments = url.path_segments().into_iter().flatten();
            match segments.next() {
                Some("watch") => url
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                Some("shorts") | Some("embed") | Some("live") | Some("v") => {
                    segments.next().map(str::to_string)
                }
                _ => None,
            }
        } else {
            return Err(TargetError::NotYoutube(input.trim().to_string()));
        };

        match candidate {
            Some(id) if VIDEO_ID_RE.is_match(&id) => Ok(Self::from_video_id_unchecked(id)),
            _ => Err(TargetError::NoVideoId(input.trim().to_string())),
        }
    }

    fn from_video_id_unchecked(video_id: String) -> Self {
        let url = format!("https://www.youtube.com/watch?v={}", video_id);
        Self { video_id, url }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Canonical watch URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// A validated playlist reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistTarget {
    list_id: String,
    url: String,
}

impl PlaylistTarget {
    pub fn parse(input: &str) -> Result<Self, TargetError> {
        let url = parse_url(input)?;
        let host = url.host_str().unwrap_or("").to_lowercase();
        if !(is_youtube_host(&host) || host == "youtu.be") {
            return Err(TargetError::NotYoutube(input.trim().to_string()));
        }

        let list_id = url
            .query_pairs()
            .find(|(k, _)| k == "list")
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| TargetError::NoPlaylistId(input.trim().to_string()))?;

        let url = format!("https://www.youtube.com/playlist?list={}", list_id);
        Ok(Self { list_id, url })
    }

    pub fn list_id(&self) -> &str {
        &self.list_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Auto-generated Mix lists are endless and cannot be enumerated
    pub fn is_mix(&self) -> bool {
        self.list_id.starts_with("RD")
    }
}

/// Requested output shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MediaKind {
    /// Audio and video together
    #[default]
    FullMedia,
    AudioOnly,
    /// Highest available video without audio
    VideoOnly,
}

impl MediaKind {
    /// Parse the `type` selector; unknown values fall back to full media
    pub fn from_selector(selector: Option<&str>) -> Self {
        match selector.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("audio") => Self::AudioOnly,
            Some("video_silent") => Self::VideoOnly,
            _ => Self::FullMedia,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullMedia => "video",
            Self::AudioOnly => "audio",
            Self::VideoOnly => "video_silent",
        }
    }
}

/// Caller's intent: output shape plus optional quality ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Intent {
    pub kind: MediaKind,
    /// Maximum video height in pixels
    pub max_height: Option<u32>,
}

impl Intent {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            max_height: None,
        }
    }

    pub fn with_max_height(mut self, height: Option<u32>) -> Self {
        self.max_height = height;
        self
    }

    /// Build from query selectors (`type`, `quality` like "720p" or "720")
    pub fn from_query(selector: Option<&str>, quality: Option<&str>) -> Self {
        let max_height = quality
            .map(|q| q.trim().trim_end_matches(['p', 'P']))
            .and_then(|q| q.parse::<u32>().ok())
            .filter(|h| *h > 0);

        Self::new(MediaKind::from_selector(selector)).with_max_height(max_height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A timed-text track exposed by the upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub language_code: String,
    /// URL returning `<text start=".." dur="..">..</text>` XML
    pub base_url: String,
}

/// Video information extracted from YouTube
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDetails {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub view_count: Option<u64>,
    pub description: String,
    /// Ordered smallest to largest
    pub thumbnails: Vec<Thumbnail>,
    pub duration_seconds: u64,
    pub caption_tracks: Vec<CaptionTrack>,
}

impl VideoDetails {
    /// Largest thumbnail (last in the list)
    pub fn best_thumbnail(&self) -> Option<&str> {
        self.thumbnails.last().map(|t| t.url.as_str())
    }
}

/// Network configuration for backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// HTTP or SOCKS5 proxy URL (e.g., "socks5h://127.0.0.1:1080")
    pub proxy: Option<String>,

    /// Socket timeout in seconds
    pub timeout: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: 30,
        }
    }
}
