// Cobalt-compatible extraction API backend
//
// Only media resolution is offered; the API exposes no descriptive metadata.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::downloader::catalog::BackendConfig;
use crate::downloader::errors::DownloadError;
use crate::downloader::models::{Intent, MediaKind, Target, VideoDetails};
use crate::downloader::stream::ResolutionResult;
use crate::downloader::traits::DownloaderBackend;
use crate::downloader::utils::build_http_client;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CobaltRequest<'a> {
    url: &'a str,
    download_mode: &'static str,
    video_quality: String,
}

impl<'a> CobaltRequest<'a> {
    fn new(target: &'a Target, intent: &Intent) -> Self {
        let download_mode = match intent.kind {
            MediaKind::FullMedia => "auto",
            MediaKind::AudioOnly => "audio",
            MediaKind::VideoOnly => "mute",
        };
        let video_quality = intent
            .max_height
            .map(|h| h.to_string())
            .unwrap_or_else(|| "max".to_string());

        Self {
            url: target.url(),
            download_mode,
            video_quality,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PickerItem {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CobaltErrorBody {
    code: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
enum CobaltResponse {
    Redirect { url: String },
    Tunnel { url: String },
    Picker { picker: Vec<PickerItem> },
    LocalProcessing {},
    Error { error: CobaltErrorBody },
}

impl CobaltResponse {
    fn into_result(self) -> Result<ResolutionResult, DownloadError> {
        match self {
            Self::Redirect { url } | Self::Tunnel { url } => Ok(ResolutionResult::Redirect(url)),
            Self::Picker { picker } => {
                let urls: Vec<String> = picker.into_iter().map(|p| p.url).collect();
                if urls.is_empty() {
                    Err(DownloadError::Transient("Cobalt returned an empty picker".to_string()))
                } else {
                    Ok(ResolutionResult::Picker(urls))
                }
            }
            Self::LocalProcessing {} => Err(DownloadError::Transient(
                "Cobalt asked for client-side processing".to_string(),
            )),
            Self::Error { error } => Err(classify_code(&error.code)),
        }
    }
}

/// `error.api.content.video.unavailable` -> "error api content video unavailable"
pub fn classify_code(code: &str) -> DownloadError {
    let normalized = code.replace(['.', '_'], " ");
    DownloadError::classify(format!("Cobalt {}", normalized))
}

pub struct CobaltBackend;

impl CobaltBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CobaltBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DownloaderBackend for CobaltBackend {
    fn name(&self) -> &'static str {
        "cobalt"
    }

    fn provides_details(&self) -> bool {
        false
    }

    async fn attempt(
        &self,
        target: &Target,
        intent: &Intent,
        config: &BackendConfig,
    ) -> Result<ResolutionResult, DownloadError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| DownloadError::Unsupported("No Cobalt endpoint configured".to_string()))?;

        let client = build_http_client(&config.network).map_err(DownloadError::Transient)?;
        debug!(endpoint, video_id = target.video_id(), "Cobalt request");

        let response = client
            .post(endpoint)
            .timeout(Duration::from_secs(u64::from(config.network.timeout)))
            .header("Accept", "application/json")
            .json(&CobaltRequest::new(target, intent))
            .send()
            .await?;

        // Cobalt reports failures as JSON bodies with 4xx statuses
        let status = response.status();
        let body = response.bytes().await?;
        match serde_json::from_slice::<CobaltResponse>(&body) {
            Ok(parsed) => parsed.into_result(),
            Err(_) if !status.is_success() => Err(DownloadError::from_status(
                status.as_u16(),
                &String::from_utf8_lossy(&body),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_details(
        &self,
        _target: &Target,
        _config: &BackendConfig,
    ) -> Result<VideoDetails, DownloadError> {
        Err(DownloadError::Unsupported(
            "Cobalt does not provide video details".to_string(),
        ))
    }
}
