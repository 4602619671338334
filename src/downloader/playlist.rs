// Playlist listing via `yt-dlp --flat-playlist`
//
// One sequential call with no strategy fallback. Mix lists are endless
// radio-style queues and are refused up front.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::credentials::Credentials;
use super::errors::DownloadError;
use super::models::{NetworkConfig, PlaylistTarget};
use super::utils::{get_proxy_args, get_timeout_args, locate_ytdlp, run_output_with_timeout};

/// Maximum entries returned for one playlist
pub const PLAYLIST_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub thumbnail_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    pub title: String,
    pub entries: Vec<PlaylistEntry>,
}

pub struct PlaylistFetcher {
    ytdlp_path: String,
    network: NetworkConfig,
    credentials: Option<Arc<Credentials>>,
}

impl PlaylistFetcher {
    pub fn new(
        ytdlp_path: Option<&str>,
        network: NetworkConfig,
        credentials: Option<Arc<Credentials>>,
    ) -> Self {
        Self {
            ytdlp_path: locate_ytdlp(ytdlp_path),
            network,
            credentials,
        }
    }

    fn args(&self, target: &PlaylistTarget) -> Vec<String> {
        let mut args = vec![
            "--flat-playlist".to_string(),
            "--dump-single-json".to_string(),
            "--no-warnings".to_string(),
            "--playlist-end".to_string(),
            PLAYLIST_LIMIT.to_string(),
        ];
        if let Some(credentials) = &self.credentials {
            args.push("--add-header".to_string());
            args.push(format!("Cookie:{}", credentials.cookie_header()));
        }
        args.extend(get_proxy_args(&self.network));
        args.extend(get_timeout_args(&self.network));
        args.push(target.url().to_string());
        args
    }

    pub async fn fetch(&self, target: &PlaylistTarget) -> Result<Playlist, DownloadError> {
        if target.is_mix() {
            return Err(DownloadError::Unsupported(format!(
                "Mix playlists cannot be listed: {}",
                target.list_id()
            )));
        }

        debug!(list_id = target.list_id(), "Listing playlist");
        let timeout_secs = u64::from(self.network.timeout) * 2;
        let output = run_output_with_timeout(&self.ytdlp_path, self.args(target), timeout_secs)
            .await
            .map_err(DownloadError::classify)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::classify(stderr.trim().to_string()));
        }

        parse_playlist(&output.stdout)
    }
}

pub fn parse_playlist(stdout: &[u8]) -> Result<Playlist, DownloadError> {
    let json: Value = serde_json::from_slice(stdout)?;

    let entries = json["entries"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(parse_entry)
                .take(PLAYLIST_LIMIT)
                .collect()
        })
        .unwrap_or_default();

    Ok(Playlist {
        title: json["title"].as_str().unwrap_or("Unknown").to_string(),
        entries,
    })
}

fn parse_entry(entry: &Value) -> Option<PlaylistEntry> {
    let id = entry["id"].as_str()?.to_string();
    let thumbnail_url = entry["thumbnails"]
        .as_array()
        .and_then(|list| list.last())
        .and_then(|t| t["url"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", id));

    Some(PlaylistEntry {
        title: entry["title"].as_str().unwrap_or("Unknown").to_string(),
        channel: entry["channel"]
            .as_str()
            .or_else(|| entry["uploader"].as_str())
            .unwrap_or("Unknown")
            .to_string(),
        thumbnail_url,
        id,
    })
}
