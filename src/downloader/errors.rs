// Error types for downloader backends and the resolution engine

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::diagnostics::{diagnose_error, diagnose_status, BlockingReason};

/// Classified failure kinds. The engine decides whether to continue on these alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Worth trying the next strategy
    Transient,
    /// Worth trying the next strategy after a short backoff
    RateLimited,
    /// Credentials missing or expired; surfaced distinctly when the catalog is exhausted
    AuthRequired,
    /// Target does not exist; stops the catalog
    NotFound,
    /// Operation not available for this target class; stops the catalog
    Unsupported,
}

impl FailureKind {
    /// Whether remaining strategies must be skipped
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NotFound | Self::Unsupported)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::RateLimited => "rate_limited",
            Self::AuthRequired => "auth_required",
            Self::NotFound => "not_found",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    /// Connection failure, timeout, malformed body, or anything unrecognized
    #[error("Upstream temporarily failed: {0}")]
    Transient(String),

    /// Upstream signalled HTTP 429 or an explicit rate limit
    #[error("Upstream is rate-limiting requests: {0}")]
    RateLimited(String),

    /// Sign-in wall, bot check, HTTP 401/403
    #[error("Upstream requires authentication: {0}")]
    AuthRequired(String),

    /// Target is deleted, missing, or unavailable
    #[error("Video not found: {0}")]
    NotFound(String),

    /// Operation cannot be served for this target
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl DownloadError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transient(_) => FailureKind::Transient,
            Self::RateLimited(_) => FailureKind::RateLimited,
            Self::AuthRequired(_) => FailureKind::AuthRequired,
            Self::NotFound(_) => FailureKind::NotFound,
            Self::Unsupported(_) => FailureKind::Unsupported,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m)
            | Self::RateLimited(m)
            | Self::AuthRequired(m)
            | Self::NotFound(m)
            | Self::Unsupported(m) => m,
        }
    }

    /// Build an error of the given kind
    pub fn with_kind(kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            FailureKind::Transient => Self::Transient(message),
            FailureKind::RateLimited => Self::RateLimited(message),
            FailureKind::AuthRequired => Self::AuthRequired(message),
            FailureKind::NotFound => Self::NotFound(message),
            FailureKind::Unsupported => Self::Unsupported(message),
        }
    }

    /// Classify free-form upstream text through the diagnostics table
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = diagnose_error(&message).failure_kind();
        Self::with_kind(kind, message)
    }

    /// Classify a non-success HTTP status. Server errors are always transient;
    /// otherwise a recognizable body takes precedence over a generic status.
    pub fn from_status(status: u16, body: &str) -> Self {
        let by_status = diagnose_status(status);
        let kind = match by_status {
            BlockingReason::ServiceUnavailable => FailureKind::Transient,
            BlockingReason::Unknown => diagnose_error(body).failure_kind(),
            reason => reason.failure_kind(),
        };
        let snippet: String = body.chars().take(200).collect();
        Self::with_kind(kind, format!("HTTP {}: {}", status, snippet.trim()))
    }

    pub fn timeout(after: Duration) -> Self {
        Self::Transient(format!("Timed out after {}s", after.as_secs_f32()))
    }
}

// Convert from String for backward compatibility
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        Self::classify(s)
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::from_status(status.as_u16(), &e.to_string()),
            None if e.is_timeout() => Self::Transient(format!("Request timed out: {}", e)),
            None => Self::Transient(format!("Request failed: {}", e)),
        }
    }
}

impl From<serde_json::Error> for DownloadError {
    fn from(e: serde_json::Error) -> Self {
        Self::Transient(format!("Malformed response body: {}", e))
    }
}

/// Last failure recorded for one strategy
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub strategy: String,
    pub error: DownloadError,
}

/// Outcome of an exhausted (or short-circuited) catalog
#[derive(Debug, Clone, Error)]
#[error("{kind} ({tried}): {summary}", tried = tried_label(.attempts), summary = summarize(.attempts))]
pub struct AggregatedFailure {
    pub kind: FailureKind,
    pub attempts: Vec<AttemptFailure>,
}

impl AggregatedFailure {
    /// Aggregate per-strategy failures.
    ///
    /// A terminal kind (NotFound/Unsupported) in the list wins; otherwise any
    /// AuthRequired wins over generic unavailability.
    pub fn from_attempts(attempts: Vec<AttemptFailure>) -> Self {
        let kinds: Vec<FailureKind> = attempts.iter().map(|a| a.error.kind()).collect();

        let kind = if let Some(terminal) = kinds.iter().find(|k| k.is_terminal()) {
            *terminal
        } else if kinds.contains(&FailureKind::AuthRequired) {
            FailureKind::AuthRequired
        } else {
            FailureKind::Transient
        };

        Self { kind, attempts }
    }

    /// Most recent upstream message, if any attempt was made
    pub fn last_error(&self) -> Option<&DownloadError> {
        self.attempts.last().map(|a| &a.error)
    }
}

fn tried_label(attempts: &[AttemptFailure]) -> String {
    match attempts.len() {
        1 => "1 strategy tried".to_string(),
        n => format!("{} strategies tried", n),
    }
}

fn summarize(attempts: &[AttemptFailure]) -> String {
    if attempts.is_empty() {
        return "no strategies available".to_string();
    }

    attempts
        .iter()
        .map(|a| format!("{} -> {}", a.strategy, a.error.kind()))
        .collect::<Vec<_>>()
        .join(", ")
}
