// yt-dlp CLI backend
//
// Details come from `--dump-json`; media is piped from `-f <spec> -o -` so the
// relay can stream it without touching disk. The configured player client,
// cookie header and proxy are passed through on every invocation.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::downloader::catalog::{BackendConfig, Delivery};
use crate::downloader::errors::DownloadError;
use crate::downloader::format_selector::FormatSelector;
use crate::downloader::models::{CaptionTrack, Intent, Target, Thumbnail, VideoDetails};
use crate::downloader::stream::{ProcessSource, ResolutionResult, StreamHandle};
use crate::downloader::traits::DownloaderBackend;
use crate::downloader::utils::{get_proxy_args, get_timeout_args, locate_ytdlp, run_output_with_timeout};

/// Timed-text flavour whose XML is `<text start=".." dur="..">..</text>`
const CAPTION_EXT: &str = "srv1";

/// Prefix of the title line printed before the download starts. With `-o -`
/// yt-dlp sends `--print` output to stderr.
const TITLE_MARKER: &str = "youtube-relay-title:";

/// How long to wait for the title line once media is flowing
const TITLE_WAIT: Duration = Duration::from_millis(500);

pub struct YtDlpBackend {
    ytdlp_path: String,
}

impl YtDlpBackend {
    pub fn new(override_path: Option<&str>) -> Self {
        Self {
            ytdlp_path: locate_ytdlp(override_path),
        }
    }

    pub fn path(&self) -> &str {
        &self.ytdlp_path
    }

    /// Arguments shared by every invocation for a strategy
    fn common_args(config: &BackendConfig) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--extractor-args".to_string(),
            format!("youtube:player_client={}", config.client.ytdlp_name()),
        ];

        if let Some(credentials) = &config.credentials {
            args.push("--add-header".to_string());
            args.push(format!("Cookie:{}", credentials.cookie_header()));
        }

        args.extend(get_proxy_args(&config.network));
        args.extend(get_timeout_args(&config.network));
        args
    }

    fn details_args(target: &Target, config: &BackendConfig) -> Vec<String> {
        let mut args = vec!["--dump-json".to_string(), "--skip-download".to_string()];
        args.extend(Self::common_args(config));
        args.push(target.url().to_string());
        args
    }

    fn stream_args(target: &Target, intent: &Intent, config: &BackendConfig) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            FormatSelector::ytdlp_format_spec(intent),
            "-o".to_string(),
            "-".to_string(),
            "--quiet".to_string(),
            "--no-part".to_string(),
            "--print".to_string(),
            format!("before_dl:{}%(title)s", TITLE_MARKER),
            "--no-simulate".to_string(),
        ];
        args.extend(Self::common_args(config));
        args.push(target.url().to_string());
        args
    }

    fn url_args(target: &Target, intent: &Intent, config: &BackendConfig) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            FormatSelector::ytdlp_format_spec(intent),
            "--get-url".to_string(),
        ];
        args.extend(Self::common_args(config));
        args.push(target.url().to_string());
        args
    }

    async fn run(&self, args: Vec<String>, config: &BackendConfig) -> Result<Vec<u8>, DownloadError> {
        debug!(program = %self.ytdlp_path, args = %args.join(" "), "Running yt-dlp");

        // The engine bounds the attempt too; this only stops a stuck child early
        let timeout_secs = u64::from(config.network.timeout) * 4;
        let output = run_output_with_timeout(&self.ytdlp_path, args, timeout_secs)
            .await
            .map_err(DownloadError::classify)?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DownloadError::classify(stderr.trim().to_string()))
        }
    }
}

#[async_trait]
impl DownloaderBackend for YtDlpBackend {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn attempt(
        &self,
        target: &Target,
        intent: &Intent,
        config: &BackendConfig,
    ) -> Result<ResolutionResult, DownloadError> {
        if config.delivery == Delivery::Redirect {
            let stdout = self.run(Self::url_args(target, intent, config), config).await?;
            let text = String::from_utf8_lossy(&stdout);
            let url = text
                .lines()
                .map(str::trim)
                .find(|l| l.starts_with("http"))
                .ok_or_else(|| DownloadError::Transient("yt-dlp returned no media URL".to_string()))?;
            return Ok(ResolutionResult::Redirect(url.to_string()));
        }

        let args = Self::stream_args(target, intent, config);
        debug!(program = %self.ytdlp_path, args = %args.join(" "), "Spawning yt-dlp stream");

        let mut source = ProcessSource::spawn_announcing(&self.ytdlp_path, &args, Some(TITLE_MARKER))
            .map_err(DownloadError::Transient)?;
        source.prime().await.map_err(DownloadError::classify)?;
        let title = source.announced(TITLE_WAIT).await;

        let handle = StreamHandle::new(Box::new(source))
            .with_content_type(Some(FormatSelector::fallback_content_type(intent).to_string()))
            .with_title(title);
        Ok(ResolutionResult::Stream(handle))
    }

    async fn fetch_details(
        &self,
        target: &Target,
        config: &BackendConfig,
    ) -> Result<VideoDetails, DownloadError> {
        let stdout = self.run(Self::details_args(target, config), config).await?;
        parse_details(&stdout, target)
    }
}

/// Parse `--dump-json` output
pub fn parse_details(stdout: &[u8], target: &Target) -> Result<VideoDetails, DownloadError> {
    let json: Value = serde_json::from_slice(stdout)?;

    let thumbnails = json["thumbnails"]
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
                .collect::<Vec<_>>()
        })
        .filter(|list| !list.is_empty())
        .or_else(|| {
            json["thumbnail"].as_str().map(|url| {
                vec![Thumbnail {
                    url: url.to_string(),
                    width: None,
                    height: None,
                }]
            })
        })
        .unwrap_or_default();

    Ok(VideoDetails {
        id: json["id"].as_str().unwrap_or(target.video_id()).to_string(),
        title: json["title"].as_str().unwrap_or("Unknown").to_string(),
        channel: json["channel"]
            .as_str()
            .or_else(|| json["uploader"].as_str())
            .unwrap_or("Unknown")
            .to_string(),
        view_count: json["view_count"].as_u64(),
        description: json["description"].as_str().unwrap_or("").to_string(),
        thumbnails,
        duration_seconds: json["duration"].as_f64().unwrap_or(0.0) as u64,
        caption_tracks: parse_caption_tracks(&json),
    })
}

/// Manual subtitles first, then automatic captions; only tracks offering srv1 XML
fn parse_caption_tracks(json: &Value) -> Vec<CaptionTrack> {
    let mut tracks = Vec::new();

    for key in ["subtitles", "automatic_captions"] {
        let Some(languages) = json[key].as_object() else {
            continue;
        };
        for (language, entries) in languages {
            if tracks.iter().any(|t: &CaptionTrack| &t.language_code == language) {
                continue;
            }
            let url = entries.as_array().and_then(|entries| {
                entries
                    .iter()
                    .find(|e| e["ext"].as_str() == Some(CAPTION_EXT))
                    .and_then(|e| e["url"].as_str())
            });
            if let Some(url) = url {
                tracks.push(CaptionTrack {
                    language_code: language.clone(),
                    base_url: url.to_string(),
                });
            }
        }
    }

    tracks
}
