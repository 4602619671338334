// JSON shapes returned by the info and playlist endpoints

use serde::Serialize;

use crate::downloader::models::VideoDetails;
use crate::downloader::playlist::{Playlist, PlaylistEntry};

/// Characters of description kept in the excerpt
const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub id: String,
    pub title: String,
    pub channel: String,
    /// Thousands-separated count, or a label when not applicable
    pub view_count: String,
    pub description_excerpt: String,
    pub thumbnail_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    pub caption_or_description_text: String,
}

impl Metadata {
    pub fn from_details(details: &VideoDetails, caption_text: String) -> Self {
        Self {
            id: details.id.clone(),
            title: details.title.clone(),
            channel: details.channel.clone(),
            view_count: details.view_count.map(format_thousands).unwrap_or_default(),
            description_excerpt: excerpt(&details.description),
            thumbnail_url: details.best_thumbnail().unwrap_or_default().to_string(),
            duration_seconds: Some(details.duration_seconds),
            caption_or_description_text: caption_text,
        }
    }

    pub fn from_playlist_entry(entry: &PlaylistEntry, playlist_title: &str) -> Self {
        Self {
            id: entry.id.clone(),
            title: entry.title.clone(),
            channel: entry.channel.clone(),
            view_count: "Playlist".to_string(),
            description_excerpt: format!("Video in playlist: {}", playlist_title),
            thumbnail_url: entry.thumbnail_url.clone(),
            duration_seconds: None,
            caption_or_description_text: String::new(),
        }
    }

    pub fn from_playlist(playlist: &Playlist) -> Vec<Self> {
        playlist
            .entries
            .iter()
            .map(|entry| Self::from_playlist_entry(entry, &playlist.title))
            .collect()
    }
}

/// 1234567 -> "1,234,567"
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// First 200 characters plus "...", empty when there is no description
pub fn excerpt(description: &str) -> String {
    if description.is_empty() {
        return String::new();
    }
    let head: String = description.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", head)
}
