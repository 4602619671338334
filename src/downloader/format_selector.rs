// FormatSelector - unified format selection logic
//
// Picks one concrete stream out of the formats an upstream enumerates, and builds
// the equivalent yt-dlp format spec when yt-dlp does the picking itself.
// Handles:
// - Quality ceiling (max height)
// - Audio-only / video-only / muxed intent
// - Codec preferences (H.264 and AAC for compatibility)

use serde::{Deserialize, Serialize};

use super::models::{Intent, MediaKind};

/// One downloadable format as enumerated by the upstream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedFormat {
    /// Format ID (e.g., "137", "140")
    pub format_id: String,
    /// Direct media URL; `None` when the upstream only offers a ciphered URL
    pub url: Option<String>,
    /// Full MIME type (e.g., `video/mp4; codecs="avc1.4d401f"`)
    pub mime_type: Option<String>,
    /// Video width in pixels
    pub width: Option<u32>,
    /// Video height in pixels
    pub height: Option<u32>,
    /// Video codec (avc1, vp9, av01, none)
    pub vcodec: Option<String>,
    /// Audio codec (mp4a, opus, none)
    pub acodec: Option<String>,
    /// File size in bytes
    pub filesize: Option<u64>,
    /// Audio bitrate in kbps
    pub abr: Option<f32>,
    /// Total bitrate in kbps
    pub tbr: Option<f32>,
}

impl ExtendedFormat {
    /// Fill container and codecs from a MIME type like `audio/mp4; codecs="mp4a.40.2"`
    pub fn with_mime(mut self, mime: &str) -> Self {
        let (essence, codecs) = split_mime(mime);
        let codecs: Vec<&str> = codecs.split(',').map(str::trim).filter(|c| !c.is_empty()).collect();

        if essence.starts_with("audio/") {
            self.vcodec = Some("none".to_string());
            self.acodec = codecs.first().map(|c| c.to_string());
        } else if essence.starts_with("video/") {
            self.vcodec = codecs.first().map(|c| c.to_string());
            self.acodec = Some(
                codecs
                    .get(1)
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string()),
            );
        }
        self.mime_type = Some(mime.to_string());
        self
    }

    /// MIME type without parameters (`video/mp4`)
    pub fn content_type(&self) -> Option<&str> {
        self.mime_type.as_deref().map(|m| split_mime(m).0)
    }

    pub fn has_video(&self) -> bool {
        self.vcodec
            .as_ref()
            .map_or(false, |v| v != "none" && !v.is_empty())
    }

    pub fn has_audio(&self) -> bool {
        self.acodec
            .as_ref()
            .map_or(false, |a| a != "none" && !a.is_empty())
    }

    /// Whether the format can be fetched without deciphering
    pub fn is_usable(&self) -> bool {
        self.url.as_deref().map_or(false, |u| !u.is_empty())
    }

    /// Check if format is H.264 (avc1)
    pub fn is_h264(&self) -> bool {
        self.vcodec
            .as_ref()
            .map_or(false, |v| v.starts_with("avc1"))
    }

    /// Check if audio is AAC (m4a)
    pub fn is_aac(&self) -> bool {
        self.acodec
            .as_ref()
            .map_or(false, |a| a.starts_with("mp4a"))
    }

    fn audio_rank(&self) -> u32 {
        self.abr.or(self.tbr).map(|b| (b * 100.0) as u32).unwrap_or(0)
    }
}

fn split_mime(mime: &str) -> (&str, &str) {
    match mime.split_once(';') {
        Some((essence, params)) => {
            let codecs = params
                .trim()
                .strip_prefix("codecs=")
                .unwrap_or("")
                .trim_matches('"');
            (essence.trim(), codecs)
        }
        None => (mime.trim(), ""),
    }
}

/// Format selector with smart quality detection
pub struct FormatSelector;

impl FormatSelector {
    /// Choose the format that best satisfies the intent.
    ///
    /// Only usable (directly fetchable) formats are considered. The height ceiling
    /// is relaxed when nothing fits under it, matching the yt-dlp `/b` fallback.
    pub fn choose<'a>(formats: &'a [ExtendedFormat], intent: &Intent) -> Option<&'a ExtendedFormat> {
        let usable: Vec<&ExtendedFormat> = formats.iter().filter(|f| f.is_usable()).collect();

        match intent.kind {
            MediaKind::AudioOnly => {
                let audio: Vec<&ExtendedFormat> = usable
                    .iter()
                    .copied()
                    .filter(|f| f.has_audio() && !f.has_video())
                    .collect();
                Self::find_best_audio(&audio).or_else(|| {
                    let muxed = Self::filter(&usable, |f| f.has_audio() && f.has_video());
                    Self::find_best_video(&muxed)
                })
            }
            MediaKind::VideoOnly => {
                let video = Self::filter(&usable, |f| f.has_video() && !f.has_audio());
                Self::pick_video(&video, intent.max_height)
            }
            MediaKind::FullMedia => {
                let muxed = Self::filter(&usable, |f| f.has_audio() && f.has_video());
                Self::pick_video(&muxed, intent.max_height)
            }
        }
    }

    fn filter<'a>(
        formats: &[&'a ExtendedFormat],
        predicate: impl Fn(&ExtendedFormat) -> bool,
    ) -> Vec<&'a ExtendedFormat> {
        formats.iter().copied().filter(|f| predicate(*f)).collect()
    }

    fn pick_video<'a>(
        formats: &[&'a ExtendedFormat],
        max_height: Option<u32>,
    ) -> Option<&'a ExtendedFormat> {
        if let Some(ceiling) = max_height {
            let capped = Self::filter(formats, |f| f.height.map_or(true, |h| h <= ceiling));
            if let Some(best) = Self::find_best_video(&capped) {
                return Some(best);
            }
        }
        Self::find_best_video(formats)
    }

    /// Find best video format (highest resolution with H.264 preference)
    fn find_best_video<'a>(formats: &[&'a ExtendedFormat]) -> Option<&'a ExtendedFormat> {
        // First try to find best H.264 (most compatible)
        let best_h264 = formats
            .iter()
            .filter(|f| f.is_h264())
            .max_by_key(|f| f.height.unwrap_or(0));

        let best_any = formats.iter().max_by_key(|f| f.height.unwrap_or(0)).copied();

        match (best_h264, best_any) {
            (Some(h264), Some(any)) => {
                // If VP9/AV1 is much higher resolution (e.g., 4K vs 1080p), use that
                let h264_height = h264.height.unwrap_or(0);
                let any_height = any.height.unwrap_or(0);
                if any_height > h264_height.saturating_mul(3) / 2 {
                    Some(any)
                } else {
                    Some(*h264)
                }
            }
            (None, any) => any,
            (Some(h264), None) => Some(*h264),
        }
    }

    /// Find best audio format (prefer AAC for compatibility)
    fn find_best_audio<'a>(formats: &[&'a ExtendedFormat]) -> Option<&'a ExtendedFormat> {
        let aac = formats
            .iter()
            .filter(|f| f.is_aac())
            .max_by_key(|f| f.audio_rank());

        if let Some(a) = aac {
            return Some(*a);
        }

        // Fallback to highest bitrate audio
        formats.iter().max_by_key(|f| f.audio_rank()).copied()
    }

    /// Format spec for `yt-dlp -f` that yields a single file on stdout
    pub fn ytdlp_format_spec(intent: &Intent) -> String {
        match (intent.kind, intent.max_height) {
            (MediaKind::AudioOnly, _) => "ba[ext=m4a]/ba/b".to_string(),
            (MediaKind::FullMedia, Some(h)) => {
                format!("b[ext=mp4][height<={h}]/b[height<={h}]/b")
            }
            (MediaKind::FullMedia, None) => "b[ext=mp4]/b".to_string(),
            (MediaKind::VideoOnly, Some(h)) => {
                format!("bv[ext=mp4][height<={h}]/bv[height<={h}]/bv")
            }
            (MediaKind::VideoOnly, None) => "bv[ext=mp4]/bv".to_string(),
        }
    }

    /// Content type to report when the upstream does not say
    pub fn fallback_content_type(intent: &Intent) -> &'static str {
        match intent.kind {
            MediaKind::AudioOnly => "audio/mp4",
            MediaKind::FullMedia | MediaKind::VideoOnly => "video/mp4",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_format(id: &str, mime: &str, height: Option<u32>, abr: Option<f32>) -> ExtendedFormat {
        ExtendedFormat {
            format_id: id.to_string(),
            url: Some(format!("https://rr1.googlevideo.com/videoplayback?itag={}", id)),
            height,
            abr,
            ..Default::default()
        }
        .with_mime(mime)
    }

    fn catalog() -> Vec<ExtendedFormat> {
        vec![
            make_format("18", r#"video/mp4; codecs="avc1.42001E, mp4a.40.2""#, Some(360), None),
            make_format("22", r#"video/mp4; codecs="avc1.64001F, mp4a.40.2""#, Some(720), None),
            make_format("137", r#"video/mp4; codecs="avc1.640028""#, Some(1080), None),
            make_format("136", r#"video/mp4; codecs="avc1.4d401f""#, Some(720), None),
            make_format("248", r#"video/webm; codecs="vp9""#, Some(1080), None),
            make_format("140", r#"audio/mp4; codecs="mp4a.40.2""#, None, Some(129.5)),
            make_format("251", r#"audio/webm; codecs="opus""#, None, Some(160.0)),
        ]
    }

    #[test]
    fn test_mime_parsing() {
        let f = make_format("18", r#"video/mp4; codecs="avc1.42001E, mp4a.40.2""#, Some(360), None);
        assert!(f.has_video() && f.has_audio());
        assert!(f.is_h264() && f.is_aac());
        assert_eq!(f.content_type(), Some("video/mp4"));

        let a = make_format("251", r#"audio/webm; codecs="opus""#, None, Some(160.0));
        assert!(a.has_audio() && !a.has_video());
        assert_eq!(a.content_type(), Some("audio/webm"));
    }

    #[test]
    fn test_full_media_respects_ceiling() {
        let formats = catalog();
        let best = FormatSelector::choose(&formats, &Intent::default()).unwrap();
        assert_eq!(best.format_id, "22");

        let capped =
            FormatSelector::choose(&formats, &Intent::default().with_max_height(Some(480))).unwrap();
        assert_eq!(capped.format_id, "18");

        // Nothing under the ceiling: fall back to the best available
        let tiny =
            FormatSelector::choose(&formats, &Intent::default().with_max_height(Some(144))).unwrap();
        assert_eq!(tiny.format_id, "22");
    }

    #[test]
    fn test_audio_prefers_aac() {
        let formats = catalog();
        let audio = FormatSelector::choose(&formats, &Intent::new(MediaKind::AudioOnly)).unwrap();
        assert_eq!(audio.format_id, "140");
    }

    #[test]
    fn test_video_only_h264_preference() {
        let formats = catalog();
        let video = FormatSelector::choose(&formats, &Intent::new(MediaKind::VideoOnly)).unwrap();
        assert_eq!(video.format_id, "137");
        assert!(!video.has_audio());
    }

    #[test]
    fn test_absurd_heights_do_not_overflow() {
        let formats = vec![
            make_format("999", r#"video/mp4; codecs="avc1.640028""#, Some(u32::MAX), None),
            make_format("248", r#"video/webm; codecs="vp9""#, Some(1080), None),
        ];
        let video = FormatSelector::choose(&formats, &Intent::new(MediaKind::VideoOnly)).unwrap();
        assert_eq!(video.format_id, "999");
    }

    #[test]
    fn test_ciphered_formats_are_ignored() {
        let mut formats = catalog();
        for f in formats.iter_mut() {
            f.url = None;
        }
        assert!(FormatSelector::choose(&formats, &Intent::default()).is_none());
    }

    #[test]
    fn test_ytdlp_format_spec() {
        assert_eq!(
            FormatSelector::ytdlp_format_spec(&Intent::default().with_max_height(Some(720))),
            "b[ext=mp4][height<=720]/b[height<=720]/b"
        );
        assert_eq!(
            FormatSelector::ytdlp_format_spec(&Intent::new(MediaKind::AudioOnly)),
            "ba[ext=m4a]/ba/b"
        );
        assert_eq!(
            FormatSelector::ytdlp_format_spec(&Intent::new(MediaKind::VideoOnly)),
            "bv[ext=mp4]/bv"
        );
    }
}
