// Request handlers for the info, download and playlist endpoints

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use super::error::ApiError;
use super::metadata::Metadata;
use super::server::AppState;
use crate::downloader::format_selector::FormatSelector;
use crate::downloader::models::{Intent, MediaKind, PlaylistTarget, Target};
use crate::downloader::relay::{self, RelayError, RelayOutcome};
use crate::downloader::stream::ResolutionResult;

pub const HEALTH_TEXT: &str = "Server YT Downloader is running normally!";

lazy_static! {
    /// Everything outside word characters, whitespace and the Latin/Vietnamese letter range
    static ref UNSAFE_TITLE_RE: Regex = Regex::new(r"[^\w\s\x{00C0}-\x{1EF9}]").unwrap();
}

#[derive(Debug, Default, Deserialize)]
pub struct MediaQuery {
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub quality: Option<String>,
}

impl MediaQuery {
    fn target(&self) -> Result<Target, ApiError> {
        Ok(Target::parse(self.url.as_deref().unwrap_or_default())?)
    }

    fn intent(&self) -> Intent {
        Intent::from_query(self.kind.as_deref(), self.quality.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaylistQuery {
    pub url: Option<String>,
}

pub async fn health() -> &'static str {
    HEALTH_TEXT
}

pub async fn info(
    State(state): State<AppState>,
    Query(query): Query<MediaQuery>,
) -> Result<Json<Metadata>, ApiError> {
    let target = query.target()?;
    let catalog = state.catalogs.build(&query.intent());

    let details = state.engine.resolve_details(&target, &catalog).await?;
    let caption_text = state.enricher.enrich(&details.caption_tracks).await;

    Ok(Json(Metadata::from_details(&details, caption_text)))
}

pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<MediaQuery>,
) -> Result<Response, ApiError> {
    let target = query.target()?;
    let intent = query.intent();
    let catalog = state.catalogs.build(&intent);

    let result = state.engine.resolve(&target, &intent, &catalog).await?;
    let cancel = state.shutdown.child_token();

    match result {
        ResolutionResult::Stream(handle) => {
            let content_type = handle
                .content_type
                .clone()
                .unwrap_or_else(|| FormatSelector::fallback_content_type(&intent).to_string());
            let content_length = handle.content_length;
            let title = handle
                .title
                .clone()
                .unwrap_or_else(|| target.video_id().to_string());

            let (mut sink, body) = relay::channel(state.relay_window_bytes, cancel.clone());
            tokio::spawn(async move {
                // relay() logs the outcome; an upstream error already aborted the body
                match relay::relay(ResolutionResult::Stream(handle), &mut sink, &cancel).await {
                    Ok(_) | Err(RelayError::Upstream { .. }) => {}
                    Err(e) => tracing::error!("Relay ended unexpectedly: {}", e),
                }
            });

            let filename = download_filename(&title, target.video_id(), &intent, &content_type);
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            if let Ok(value) = HeaderValue::from_str(&content_disposition(&filename)) {
                headers.insert(header::CONTENT_DISPOSITION, value);
            }
            if let Some(length) = content_length {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            }

            Ok((StatusCode::OK, headers, Body::from_stream(body)).into_response())
        }
        other => {
            let mut sink = relay::NullSink;
            match relay::relay(other, &mut sink, &cancel).await? {
                RelayOutcome::Redirect(url) => {
                    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
                }
                RelayOutcome::Completed { .. } | RelayOutcome::Cancelled { .. } => {
                    Ok(StatusCode::NO_CONTENT.into_response())
                }
            }
        }
    }
}

pub async fn playlist(
    State(state): State<AppState>,
    Query(query): Query<PlaylistQuery>,
) -> Result<Json<Vec<Metadata>>, ApiError> {
    let target = PlaylistTarget::parse(query.url.as_deref().unwrap_or_default())?;
    let playlist = state.playlists.fetch(&target).await?;
    tracing::info!(
        list_id = target.list_id(),
        entries = playlist.entries.len(),
        "Playlist listed"
    );
    Ok(Json(Metadata::from_playlist(&playlist)))
}

/// Filesystem-safe title; falls back to the video id when nothing survives
pub fn sanitize_title(title: &str, video_id: &str) -> String {
    let cleaned = UNSAFE_TITLE_RE.replace_all(title, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        video_id.to_string()
    } else {
        cleaned.to_string()
    }
}

fn extension_for(content_type: &str, intent: &Intent) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "audio/mp4" | "audio/m4a" => "m4a",
        "audio/webm" | "video/webm" => "webm",
        "audio/mpeg" => "mp3",
        "video/mp4" => "mp4",
        _ => match intent.kind {
            MediaKind::AudioOnly => "m4a",
            MediaKind::FullMedia | MediaKind::VideoOnly => "mp4",
        },
    }
}

pub fn download_filename(title: &str, video_id: &str, intent: &Intent, content_type: &str) -> String {
    let base = sanitize_title(title, video_id);
    let suffix = match intent.kind {
        MediaKind::VideoOnly => "_HighRes_NoAudio",
        MediaKind::FullMedia | MediaKind::AudioOnly => "",
    };
    format!("{}{}.{}", base, suffix, extension_for(content_type, intent))
}

/// RFC 5987 `attachment` disposition
pub fn content_disposition(filename: &str) -> String {
    format!("attachment; filename*=UTF-8''{}", urlencoding::encode(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_title_keeps_vietnamese() {
        assert_eq!(sanitize_title("Sơn Tùng M-TP | Official MV!", "id"), "Sơn Tùng MTP  Official MV");
        assert_eq!(sanitize_title("???", "dQw4w9WgXcQ"), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_download_filename() {
        let video = Intent::new(MediaKind::FullMedia);
        let audio = Intent::new(MediaKind::AudioOnly);
        let silent = Intent::new(MediaKind::VideoOnly);

        assert_eq!(download_filename("Clip", "id", &video, "video/mp4"), "Clip.mp4");
        assert_eq!(download_filename("Clip", "id", &audio, "audio/mp4; codecs=\"mp4a.40.2\""), "Clip.m4a");
        assert_eq!(download_filename("Clip", "id", &audio, "audio/webm"), "Clip.webm");
        assert_eq!(
            download_filename("Clip", "id", &silent, "application/octet-stream"),
            "Clip_HighRes_NoAudio.mp4"
        );
    }

    #[test]
    fn test_content_disposition_is_percent_encoded() {
        assert_eq!(
            content_disposition("Sơn Tùng.mp4"),
            "attachment; filename*=UTF-8''S%C6%A1n%20T%C3%B9ng.mp4"
        );
    }

    #[test]
    fn test_media_query_intent() {
        let query = MediaQuery {
            url: Some("https://youtu.be/dQw4w9WgXcQ".into()),
            kind: Some("audio".into()),
            quality: Some("720p".into()),
        };
        assert_eq!(query.intent().kind, MediaKind::AudioOnly);
        assert_eq!(query.intent().max_height, Some(720));
        assert_eq!(query.target().unwrap().video_id(), "dQw4w9WgXcQ");

        let missing = MediaQuery::default();
        assert!(matches!(missing.target(), Err(ApiError::Target(_))));
    }
}
