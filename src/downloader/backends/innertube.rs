// InnerTube player API backend
//
// POSTs to /youtubei/v1/player with the strategy's client context. The response
// carries playability, details and the format list. Formats that only offer a
// signatureCipher would need player JS deciphering and are treated as unusable.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::debug;

use crate::downloader::catalog::{BackendConfig, Delivery, PlayerClient};
use crate::downloader::errors::{DownloadError, FailureKind};
use crate::downloader::format_selector::{ExtendedFormat, FormatSelector};
use crate::downloader::models::{CaptionTrack, Intent, Target, Thumbnail, VideoDetails};
use crate::downloader::stream::{HttpSource, ResolutionResult, StreamHandle};
use crate::downloader::traits::DownloaderBackend;
use crate::downloader::utils::build_http_client;

pub const DEFAULT_BASE_URL: &str = "https://www.youtube.com";
const ORIGIN: &str = "https://www.youtube.com";

/// Client identity sent in `context.client`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientContext {
    pub name: &'static str,
    pub id: u32,
    pub version: &'static str,
    pub user_agent: &'static str,
}

const WEB_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
const SAFARI_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15";

impl ClientContext {
    pub fn for_client(client: PlayerClient) -> Self {
        match client {
            PlayerClient::Web => Self {
                name: "WEB",
                id: 1,
                version: "2.20240726.00.00",
                user_agent: WEB_UA,
            },
            PlayerClient::WebSafari => Self {
                name: "WEB",
                id: 1,
                version: "2.20240726.00.00",
                user_agent: SAFARI_UA,
            },
            PlayerClient::Ios => Self {
                name: "IOS",
                id: 5,
                version: "19.29.1",
                user_agent: "com.google.ios.youtube/19.29.1 (iPhone16,2; U; CPU iOS 17_5_1 like Mac OS X;)",
            },
            PlayerClient::Android => Self {
                name: "ANDROID",
                id: 3,
                version: "19.29.37",
                user_agent: "com.google.android.youtube/19.29.37 (Linux; U; Android 11) gzip",
            },
            PlayerClient::Tv => Self {
                name: "TVHTML5",
                id: 7,
                version: "7.20240724.13.00",
                user_agent: "Mozilla/5.0 (ChromiumStylePlatform) Cobalt/Version",
            },
        }
    }

    /// The `context.client` object
    fn to_json(self) -> Value {
        let mut client = json!({
            "clientName": self.name,
            "clientVersion": self.version,
            "hl": "en",
            "gl": "US",
            "userAgent": self.user_agent,
        });
        match self.name {
            "IOS" => {
                client["deviceMake"] = json!("Apple");
                client["deviceModel"] = json!("iPhone16,2");
                client["osName"] = json!("iPhone");
                client["osVersion"] = json!("17.5.1.21F90");
            }
            "ANDROID" => {
                client["androidSdkVersion"] = json!(30);
                client["osName"] = json!("Android");
                client["osVersion"] = json!("11");
            }
            _ => {}
        }
        client
    }
}

pub struct InnertubeBackend {
    base_url: String,
}

impl InnertubeBackend {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn request_body(target: &Target, context: ClientContext) -> Value {
        json!({
            "videoId": target.video_id(),
            "context": { "client": context.to_json() },
            "contentCheckOk": true,
            "racyCheckOk": true,
        })
    }

    async fn player(&self, target: &Target, config: &BackendConfig) -> Result<Value, DownloadError> {
        let context = ClientContext::for_client(config.client);
        let client = build_http_client(&config.network).map_err(DownloadError::Transient)?;
        let url = format!("{}/youtubei/v1/player?prettyPrint=false", self.base_url);

        let mut request = client
            .post(&url)
            .timeout(Duration::from_secs(u64::from(config.network.timeout)))
            .header("User-Agent", context.user_agent)
            .header("X-YouTube-Client-Name", context.id.to_string())
            .header("X-YouTube-Client-Version", context.version)
            .header("Origin", ORIGIN)
            .json(&Self::request_body(target, context));

        if let Some(credentials) = &config.credentials {
            request = request.header("Cookie", credentials.cookie_header());
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            if let Some(authorization) = credentials.sapisid_authorization(ORIGIN, now) {
                request = request
                    .header("Authorization", authorization)
                    .header("X-Origin", ORIGIN);
            }
        }

        debug!(client = context.name, video_id = target.video_id(), "InnerTube player request");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DownloadError::from_status(status.as_u16(), &body));
        }

        let body = response.bytes().await?;
        let player: Value = serde_json::from_slice(&body)?;
        check_playability(&player)?;
        Ok(player)
    }
}

impl Default for InnertubeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DownloaderBackend for InnertubeBackend {
    fn name(&self) -> &'static str {
        "innertube"
    }

    async fn attempt(
        &self,
        target: &Target,
        intent: &Intent,
        config: &BackendConfig,
    ) -> Result<ResolutionResult, DownloadError> {
        let player = self.player(target, config).await?;
        let formats = parse_formats(&player);
        let chosen = choose_format(&formats, intent)?;
        let media_url = chosen.url.clone().unwrap_or_default();

        if config.delivery == Delivery::Redirect {
            return Ok(ResolutionResult::Redirect(media_url));
        }

        let context = ClientContext::for_client(config.client);
        let client = build_http_client(&config.network).map_err(DownloadError::Transient)?;
        let response = client
            .get(&media_url)
            .header("User-Agent", context.user_agent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::from_status(status.as_u16(), ""));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| chosen.content_type().map(str::to_string));
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .or(chosen.filesize);

        let handle = StreamHandle::new(Box::new(HttpSource::new(response)))
            .with_content_type(content_type)
            .with_content_length(content_length)
            .with_title(player["videoDetails"]["title"].as_str().map(str::to_string));
        Ok(ResolutionResult::Stream(handle))
    }

    async fn fetch_details(
        &self,
        target: &Target,
        config: &BackendConfig,
    ) -> Result<VideoDetails, DownloadError> {
        let player = self.player(target, config).await?;
        parse_details(&player, target)
    }
}

/// Map `playabilityStatus` onto the failure taxonomy
pub fn check_playability(player: &Value) -> Result<(), DownloadError> {
    let playability = &player["playabilityStatus"];
    let status = playability["status"].as_str().unwrap_or("OK");
    let reason = playability["reason"]
        .as_str()
        .or_else(|| playability["messages"][0].as_str())
        .unwrap_or("")
        .to_string();
    let message = if reason.is_empty() {
        format!("Playability status {}", status)
    } else {
        format!("{}: {}", status, reason)
    };

    match status {
        "OK" => Ok(()),
        "LOGIN_REQUIRED" | "AGE_CHECK_REQUIRED" | "CONTENT_CHECK_REQUIRED" => {
            Err(DownloadError::AuthRequired(message))
        }
        "ERROR" => {
            let classified = DownloadError::classify(message.clone());
            if classified.kind() == FailureKind::Transient {
                Err(DownloadError::NotFound(message))
            } else {
                Err(classified)
            }
        }
        _ => Err(DownloadError::classify(message)),
    }
}

/// Collect muxed and adaptive formats
pub fn parse_formats(player: &Value) -> Vec<ExtendedFormat> {
    let streaming = &player["streamingData"];
    ["formats", "adaptiveFormats"]
        .iter()
        .filter_map(|key| streaming[*key].as_array())
        .flatten()
        .map(|f| {
            let format = ExtendedFormat {
                format_id: f["itag"].as_u64().map(|i| i.to_string()).unwrap_or_default(),
                url: f["url"].as_str().map(str::to_string),
                width: f["width"].as_u64().map(|w| w as u32),
                height: f["height"].as_u64().map(|h| h as u32),
                filesize: f["contentLength"].as_str().and_then(|s| s.parse().ok()),
                abr: f["averageBitrate"].as_f64().map(|b| (b / 1000.0) as f32),
                tbr: f["bitrate"].as_f64().map(|b| (b / 1000.0) as f32),
                ..Default::default()
            };
            match f["mimeType"].as_str() {
                Some(mime) => format.with_mime(mime),
                None => format,
            }
        })
        .collect()
}

fn choose_format<'a>(formats: &'a [ExtendedFormat], intent: &Intent) -> Result<&'a ExtendedFormat, DownloadError> {
    if formats.is_empty() {
        return Err(DownloadError::Transient("Player response has no streaming data".to_string()));
    }
    FormatSelector::choose(formats, intent).ok_or_else(|| {
        if formats.iter().all(|f| !f.is_usable()) {
            DownloadError::Transient("All formats require signature deciphering".to_string())
        } else {
            DownloadError::Transient(format!("No format matches {}", intent.kind.as_str()))
        }
    })
}

/// Build details from `videoDetails` and the caption tracklist
pub fn parse_details(player: &Value, target: &Target) -> Result<VideoDetails, DownloadError> {
    let details = &player["videoDetails"];
    if !details.is_object() {
        return Err(DownloadError::Transient("Player response has no videoDetails".to_string()));
    }

    let thumbnails = details["thumbnail"]["thumbnails"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|t| {
                    Some(Thumbnail {
                        url: t["url"].as_str()?.to_string(),
                        width: t["width"].as_u64().map(|w| w as u32),
                        height: t["height"].as_u64().map(|h| h as u32),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let caption_tracks = player["captions"]["playerCaptionsTracklistRenderer"]["captionTracks"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|t| {
                    Some(CaptionTrack {
                        language_code: t["languageCode"].as_str()?.to_string(),
                        base_url: t["baseUrl"].as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(VideoDetails {
        id: details["videoId"].as_str().unwrap_or(target.video_id()).to_string(),
        title: details["title"].as_str().unwrap_or("Unknown").to_string(),
        channel: details["author"].as_str().unwrap_or("Unknown").to_string(),
        view_count: details["viewCount"].as_str().and_then(|v| v.parse().ok()),
        description: details["shortDescription"].as_str().unwrap_or("").to_string(),
        thumbnails,
        duration_seconds: details["lengthSeconds"]
            .as_str()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        caption_tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::catalog::BackendFamily;
    use crate::downloader::models::MediaKind;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    fn target() -> Target {
        Target::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap()
    }

    fn player_response(media_base: &str) -> Value {
        json!({
            "playabilityStatus": {"status": "OK"},
            "videoDetails": {
                "videoId": "dQw4w9WgXcQ",
                "title": "Never Gonna Give You Up",
                "author": "Rick Astley",
                "viewCount": "1500000000",
                "lengthSeconds": "212",
                "shortDescription": "The official video",
                "thumbnail": {"thumbnails": [
                    {"url": "https://i.ytimg.com/small.jpg", "width": 168, "height": 94},
                    {"url": "https://i.ytimg.com/large.jpg", "width": 1920, "height": 1080}
                ]}
            },
            "captions": {"playerCaptionsTracklistRenderer": {"captionTracks": [
                {"baseUrl": "https://www.youtube.com/api/timedtext?v=dQw4w9WgXcQ&lang=en", "languageCode": "en"}
            ]}},
            "streamingData": {
                "formats": [
                    {"itag": 18, "url": format!("{}/media/18", media_base),
                     "mimeType": "video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"", "width": 640, "height": 360}
                ],
                "adaptiveFormats": [
                    {"itag": 140, "url": format!("{}/media/140", media_base),
                     "mimeType": "audio/mp4; codecs=\"mp4a.40.2\"", "averageBitrate": 129000, "contentLength": "11"},
                    {"itag": 251, "signatureCipher": "s=abc&sp=sig&url=https%3A%2F%2Fx",
                     "mimeType": "audio/webm; codecs=\"opus\"", "averageBitrate": 160000}
                ]
            }
        })
    }

    #[test]
    fn test_playability_classification() {
        let status = |s: &str, reason: &str| {
            json!({"playabilityStatus": {"status": s, "reason": reason}})
        };

        assert!(check_playability(&status("OK", "")).is_ok());
        assert_eq!(
            check_playability(&status("LOGIN_REQUIRED", "Sign in to confirm you're not a bot"))
                .unwrap_err()
                .kind(),
            FailureKind::AuthRequired
        );
        assert_eq!(
            check_playability(&status("ERROR", "Video unavailable")).unwrap_err().kind(),
            FailureKind::NotFound
        );
        assert_eq!(
            check_playability(&status("ERROR", "")).unwrap_err().kind(),
            FailureKind::NotFound
        );
        assert_eq!(
            check_playability(&status("UNPLAYABLE", "Something odd happened")).unwrap_err().kind(),
            FailureKind::Transient
        );
    }

    #[test]
    fn test_parse_formats_and_details() {
        let player = player_response("https://rr1.googlevideo.com");
        let formats = parse_formats(&player);
        assert_eq!(formats.len(), 3);
        assert!(!formats[2].is_usable());

        let audio = choose_format(&formats, &Intent::new(MediaKind::AudioOnly)).unwrap();
        assert_eq!(audio.format_id, "140");

        let details = parse_details(&player, &target()).unwrap();
        assert_eq!(details.channel, "Rick Astley");
        assert_eq!(details.view_count, Some(1_500_000_000));
        assert_eq!(details.duration_seconds, 212);
        assert_eq!(details.best_thumbnail(), Some("https://i.ytimg.com/large.jpg"));
        assert_eq!(details.caption_tracks[0].language_code, "en");
    }

    #[test]
    fn test_ciphered_only_is_transient() {
        let player = json!({
            "playabilityStatus": {"status": "OK"},
            "streamingData": {"adaptiveFormats": [
                {"itag": 251, "signatureCipher": "s=abc", "mimeType": "audio/webm; codecs=\"opus\""}
            ]}
        });
        let formats = parse_formats(&player);
        let err = choose_format(&formats, &Intent::new(MediaKind::AudioOnly)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transient);
        assert!(err.message().contains("deciphering"));
    }

    #[test]
    fn test_request_body_uses_client_context() {
        let body = InnertubeBackend::request_body(&target(), ClientContext::for_client(PlayerClient::Ios));
        assert_eq!(body["videoId"], "dQw4w9WgXcQ");
        assert_eq!(body["context"]["client"]["clientName"], "IOS");
        assert_eq!(body["context"]["client"]["deviceModel"], "iPhone16,2");
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_proxied_stream_from_local_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let response = player_response(&base);
        let router = Router::new()
            .route("/youtubei/v1/player", post(move || async move { Json(response) }))
            .route(
                "/media/140",
                get(|| async { ([(axum::http::header::CONTENT_TYPE, "audio/mp4")], "hello audio") }),
            );
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let backend = InnertubeBackend::with_base_url(base.clone());
        let config = BackendConfig::new(BackendFamily::Innertube, PlayerClient::Ios);
        let result = backend
            .attempt(&target(), &Intent::new(MediaKind::AudioOnly), &config)
            .await
            .unwrap();

        let ResolutionResult::Stream(mut handle) = result else {
            panic!("expected a stream");
        };
        assert_eq!(handle.content_type.as_deref(), Some("audio/mp4"));
        assert_eq!(handle.content_length, Some(11));
        assert_eq!(handle.title.as_deref(), Some("Never Gonna Give You Up"));

        let mut collected = Vec::new();
        while let Some(chunk) = handle.source.next_chunk().await.unwrap() {
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected, b"hello audio");
    }

    #[tokio::test]
    async fn test_redirect_delivery_and_http_errors() {
        let ok = player_response("https://rr1.googlevideo.com");
        let base = serve(Router::new().route(
            "/youtubei/v1/player",
            post(move || async move { Json(ok) }),
        ))
        .await;

        let backend = InnertubeBackend::with_base_url(base);
        let mut config = BackendConfig::new(BackendFamily::Innertube, PlayerClient::Android);
        config.delivery = Delivery::Redirect;
        let result = backend.attempt(&target(), &Intent::default(), &config).await.unwrap();
        assert!(matches!(result, ResolutionResult::Redirect(url) if url.ends_with("/media/18")));

        let limited = serve(Router::new().route(
            "/youtubei/v1/player",
            post(|| async { (axum::http::StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        ))
        .await;
        let err = InnertubeBackend::with_base_url(limited)
            .fetch_details(&target(), &config)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::RateLimited);
    }
}
