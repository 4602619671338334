// HTTP boundary errors
//
// Every failure leaves as `{ "error": <category>, "detail": <message> }` with a
// status derived from the failure kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::downloader::errors::{AggregatedFailure, DownloadError, FailureKind};
use crate::downloader::models::TargetError;
use crate::downloader::relay::RelayError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Resolution(#[from] AggregatedFailure),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

impl ApiError {
    fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Target(_) | Self::Relay(_) => None,
            Self::Resolution(failure) => Some(failure.kind),
            Self::Download(error) => Some(error.kind()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match (self, self.kind()) {
            (Self::Target(_), _) => StatusCode::BAD_REQUEST,
            (_, Some(FailureKind::AuthRequired)) => StatusCode::FORBIDDEN,
            (_, Some(FailureKind::NotFound)) => StatusCode::NOT_FOUND,
            (_, Some(FailureKind::Unsupported)) => StatusCode::NOT_IMPLEMENTED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable category
    pub fn category(&self) -> &'static str {
        match (self, self.kind()) {
            (Self::Target(_), _) => "invalid_target",
            (Self::Relay(_), _) => "relay_failed",
            (_, Some(FailureKind::AuthRequired)) => "auth_required",
            (_, Some(FailureKind::NotFound)) => "not_found",
            (_, Some(FailureKind::Unsupported)) => "unsupported",
            _ => "unavailable",
        }
    }

    fn detail(&self) -> String {
        match self.kind() {
            Some(FailureKind::AuthRequired) => format!(
                "Server is blocked by YouTube; refresh the server cookies. {}",
                self
            ),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(category = self.category(), "Request failed: {}", self);
        } else {
            tracing::warn!(category = self.category(), "Request rejected: {}", self);
        }

        let body = ErrorBody {
            error: self.category(),
            detail: self.detail(),
        };
        (status, Json(body)).into_response()
    }
}
