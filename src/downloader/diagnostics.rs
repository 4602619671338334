// Blocking diagnostics - maps upstream error text and HTTP statuses to failure kinds
//
// This is the single classification table used by every backend. Patterns are
// checked in order of specificity and the first match wins; anything that does
// not match is treated as transient so the engine keeps trying strategies.

use serde::{Deserialize, Serialize};

use super::errors::FailureKind;

/// Reasons an upstream might refuse or fail a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockingReason {
    /// DRM-protected or paid content (Premium, Music, Movies)
    DrmProtected,

    /// Member-only content (requires channel membership)
    MembersOnly,

    /// Upstream does not handle this kind of link at all
    UnsupportedUrl,

    /// SABR streaming protection hides formats for this client
    SabrStreaming,

    /// Proof of Origin token required for this client
    PoTokenRequired,

    /// Age-restricted content requiring login
    AgeRestricted,

    /// Private video requiring authorization
    PrivateVideo,

    /// Generic sign-in wall ("Sign in to confirm you're not a bot", LOGIN_REQUIRED)
    SignInRequired,

    /// Upstream service outage (5xx, "service unavailable")
    ServiceUnavailable,

    /// Video deleted, never existed, or unavailable
    VideoUnavailable,

    /// Geographic restriction
    GeoBlocked,

    /// Rate limiting (429 or similar)
    RateLimited,

    /// Bot detection triggered without an explicit sign-in hint
    BotDetection,

    /// HTTP 401/403 without further detail
    Http403Forbidden,

    /// Network timeout or refused connection
    NetworkTimeout,

    /// Response body could not be parsed
    MalformedResponse,

    /// Nothing recognizable
    Unknown,
}

impl BlockingReason {
    /// Failure kind the resolution engine acts on
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::DrmProtected | Self::UnsupportedUrl => FailureKind::Unsupported,
            Self::MembersOnly
            | Self::AgeRestricted
            | Self::PrivateVideo
            | Self::SignInRequired
            | Self::BotDetection
            | Self::Http403Forbidden => FailureKind::AuthRequired,
            Self::VideoUnavailable => FailureKind::NotFound,
            Self::RateLimited => FailureKind::RateLimited,
            Self::SabrStreaming
            | Self::ServiceUnavailable
            | Self::PoTokenRequired
            | Self::GeoBlocked
            | Self::NetworkTimeout
            | Self::MalformedResponse
            | Self::Unknown => FailureKind::Transient,
        }
    }

    /// Check if cookies might help
    pub fn cookies_might_help(&self) -> bool {
        matches!(
            self,
            Self::Http403Forbidden
                | Self::SabrStreaming
                | Self::PoTokenRequired
                | Self::AgeRestricted
                | Self::BotDetection
                | Self::PrivateVideo
                | Self::MembersOnly
                | Self::SignInRequired
        )
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::DrmProtected => "DRM-protected content",
            Self::MembersOnly => "Members-only content",
            Self::UnsupportedUrl => "Unsupported link",
            Self::SabrStreaming => "SABR streaming protection active",
            Self::PoTokenRequired => "Proof of Origin token required",
            Self::AgeRestricted => "Age-restricted content",
            Self::PrivateVideo => "Private video",
            Self::SignInRequired => "Sign-in required",
            Self::ServiceUnavailable => "Upstream service unavailable",
            Self::VideoUnavailable => "Video unavailable",
            Self::GeoBlocked => "Geographic restriction",
            Self::RateLimited => "Rate limited by upstream",
            Self::BotDetection => "Bot detection triggered",
            Self::Http403Forbidden => "Access denied (HTTP 403)",
            Self::NetworkTimeout => "Network timeout or connection failure",
            Self::MalformedResponse => "Malformed upstream response",
            Self::Unknown => "Unknown upstream failure",
        }
    }
}

/// Ordered pattern table. Matching is done on lowercased text.
const RULES: &[(BlockingReason, &[&str])] = &[
    (
        BlockingReason::DrmProtected,
        &[
            "drm",
            "widevine",
            "playready",
            "fairplay",
            "encrypted media",
            "content is protected",
            "youtube premium",
            "requires purchase",
            "rental",
            "pay to watch",
            "this video requires payment",
        ],
    ),
    (
        BlockingReason::MembersOnly,
        &[
            "members only",
            "members-only",
            "join this channel",
            "membership required",
            "available to members",
        ],
    ),
    (
        BlockingReason::UnsupportedUrl,
        &["unsupported url", "unsupported", "not supported"],
    ),
    (
        BlockingReason::SabrStreaming,
        &["sabr", "forcing sabr streaming"],
    ),
    (
        BlockingReason::PoTokenRequired,
        &["po token", "proof of origin"],
    ),
    (
        BlockingReason::AgeRestricted,
        &["age-restricted", "confirm your age", "age_verification"],
    ),
    (
        BlockingReason::PrivateVideo,
        &[
            "private video",
            "video is private",
            "sign in if you've been granted access",
        ],
    ),
    (
        BlockingReason::SignInRequired,
        &[
            "sign in",
            "sign-in",
            "login required",
            "login_required",
            "login",
            "log in",
            "cookies",
            "authentication",
        ],
    ),
    (
        BlockingReason::ServiceUnavailable,
        &[
            "service unavailable",
            "temporarily unavailable",
            "bad gateway",
            "gateway timeout",
            "internal server error",
            "http error 5",
        ],
    ),
    (
        BlockingReason::VideoUnavailable,
        &[
            "video unavailable",
            "video is unavailable",
            "video has been removed",
            "content isn't available",
            "no longer available",
            "not found",
            "does not exist",
        ],
    ),
    (
        BlockingReason::GeoBlocked,
        &[
            "not available in your country",
            "blocked in your country",
            "geo restrict",
            "geographic restriction",
        ],
    ),
    (
        BlockingReason::RateLimited,
        &["429", "rate limit", "rate exceeded", "too many requests"],
    ),
    (
        BlockingReason::BotDetection,
        &["bot", "captcha", "unusual traffic", "automated"],
    ),
    (
        BlockingReason::Http403Forbidden,
        &["403", "forbidden", "401", "unauthorized"],
    ),
    (
        BlockingReason::NetworkTimeout,
        &[
            "timeout",
            "timed out",
            "connection refused",
            "connection reset",
            "network unreachable",
            "error trying to connect",
            "dns error",
        ],
    ),
    (
        BlockingReason::MalformedResponse,
        &["json", "parse", "malformed", "invalid response", "expected value"],
    ),
];

/// Analyze error text and return the blocking reason
pub fn diagnose_error(error: &str) -> BlockingReason {
    let lower = error.to_lowercase();

    RULES
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(reason, _)| *reason)
        .unwrap_or(BlockingReason::Unknown)
}

/// Classify an HTTP status returned by an upstream
pub fn diagnose_status(status: u16) -> BlockingReason {
    match status {
        401 | 403 => BlockingReason::Http403Forbidden,
        404 | 410 => BlockingReason::VideoUnavailable,
        429 => BlockingReason::RateLimited,
        501 => BlockingReason::UnsupportedUrl,
        500..=599 => BlockingReason::ServiceUnavailable,
        _ => BlockingReason::Unknown,
    }
}

/// Patterns from the table that occur in the error (for log context)
pub fn matched_patterns(error: &str) -> Vec<&'static str> {
    let lower = error.to_lowercase();

    RULES
        .iter()
        .flat_map(|(_, patterns)| patterns.iter())
        .filter(|p| lower.contains(*p))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_is_auth_required() {
        let error = "ERROR: [youtube] dQw4w9WgXcQ: Sign in to confirm you're not a bot. Use --cookies-from-browser or --cookies for the authentication.";
        assert_eq!(diagnose_error(error), BlockingReason::SignInRequired);
        assert_eq!(diagnose_error(error).failure_kind(), FailureKind::AuthRequired);
    }

    #[test]
    fn test_403_detection() {
        let error = "ERROR: unable to download video data: HTTP Error 403: Forbidden";
        assert_eq!(diagnose_error(error), BlockingReason::Http403Forbidden);
        assert_eq!(diagnose_status(403).failure_kind(), FailureKind::AuthRequired);
    }

    #[test]
    fn test_unavailable_is_not_found() {
        let error = "ERROR: [youtube] xxxxxxxxxxx: Video unavailable";
        assert_eq!(diagnose_error(error).failure_kind(), FailureKind::NotFound);
        assert_eq!(
            diagnose_error("HTTP Error 404: Not Found").failure_kind(),
            FailureKind::NotFound
        );
        assert_eq!(diagnose_status(410).failure_kind(), FailureKind::NotFound);
    }

    #[test]
    fn test_service_outage_is_transient() {
        let error = "ERROR: unable to download webpage: HTTP Error 503: Service Unavailable, read timed out";
        assert_eq!(diagnose_error(error), BlockingReason::ServiceUnavailable);
        assert_eq!(diagnose_error(error).failure_kind(), FailureKind::Transient);
        assert_eq!(
            diagnose_error("The service is temporarily unavailable").failure_kind(),
            FailureKind::Transient
        );
        assert_eq!(diagnose_status(503), BlockingReason::ServiceUnavailable);
        assert_eq!(diagnose_status(501).failure_kind(), FailureKind::Unsupported);
    }

    #[test]
    fn test_private_video_wins_over_unavailable() {
        let error = "Private video. Sign in if you've been granted access to this video";
        assert_eq!(diagnose_error(error), BlockingReason::PrivateVideo);
        assert_eq!(diagnose_error(error).failure_kind(), FailureKind::AuthRequired);
    }

    #[test]
    fn test_rate_limit_detection() {
        assert_eq!(
            diagnose_error("HTTP Error 429: Too Many Requests"),
            BlockingReason::RateLimited
        );
        assert_eq!(diagnose_status(429).failure_kind(), FailureKind::RateLimited);
        assert_eq!(
            diagnose_error("error api rate exceeded").failure_kind(),
            FailureKind::RateLimited
        );
    }

    #[test]
    fn test_timeout_and_parse_are_transient() {
        assert_eq!(
            diagnose_error("Timed out after 30s").failure_kind(),
            FailureKind::Transient
        );
        assert_eq!(
            diagnose_error("Invalid JSON: expected value at line 1").failure_kind(),
            FailureKind::Transient
        );
    }

    #[test]
    fn test_po_token_is_transient() {
        let error = "mweb client https formats require a GVS PO Token";
        assert_eq!(diagnose_error(error), BlockingReason::PoTokenRequired);
        assert_eq!(diagnose_error(error).failure_kind(), FailureKind::Transient);
    }

    #[test]
    fn test_drm_is_unsupported() {
        let error = "Widevine encrypted content cannot be downloaded";
        assert_eq!(diagnose_error(error), BlockingReason::DrmProtected);
        assert_eq!(diagnose_error(error).failure_kind(), FailureKind::Unsupported);
    }

    #[test]
    fn test_members_only_needs_credentials() {
        let error = "This video is available to members only";
        assert_eq!(diagnose_error(error), BlockingReason::MembersOnly);
        assert!(diagnose_error(error).cookies_might_help());
    }

    #[test]
    fn test_unrecognized_fails_open_to_transient() {
        assert_eq!(diagnose_error("something odd happened"), BlockingReason::Unknown);
        assert_eq!(diagnose_error("").failure_kind(), FailureKind::Transient);
        assert_eq!(diagnose_status(502).failure_kind(), FailureKind::Transient);
    }

    #[test]
    fn test_matched_patterns_for_context() {
        let patterns = matched_patterns("HTTP Error 403: Forbidden");
        assert!(patterns.contains(&"403"));
        assert!(patterns.contains(&"forbidden"));
    }
}
