use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Every expected failure of the share lifecycle. These are ordinary result
/// values, not panics; handlers branch on the kind and callers see a stable
/// code plus a short message, never backend internals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShareError {
    #[error("encrypted content and IV are required")]
    MissingCiphertext,
    #[error("view limit must be between 1 and 100")]
    InvalidViewLimit,
    #[error("expiration time must be in the future")]
    InvalidExpiration,
    /// Absent and expired are indistinguishable: a probe cannot learn
    /// whether an id ever existed.
    #[error("share not found or expired")]
    NotFoundOrExpired,
    #[error("password required")]
    PasswordRequired,
    #[error("incorrect password")]
    IncorrectPassword,
    #[error("view limit reached")]
    ViewLimitReached,
    #[error("storage unavailable")]
    StorageFailure,
}

impl ShareError {
    /// Stable machine-readable code carried in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCiphertext => "missing_ciphertext",
            Self::InvalidViewLimit => "invalid_view_limit",
            Self::InvalidExpiration => "invalid_expiration",
            Self::NotFoundOrExpired => "not_found_or_expired",
            Self::PasswordRequired => "password_required",
            Self::IncorrectPassword => "incorrect_password",
            Self::ViewLimitReached => "view_limit_reached",
            Self::StorageFailure => "storage_failure",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCiphertext | Self::InvalidViewLimit | Self::InvalidExpiration => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFoundOrExpired => StatusCode::NOT_FOUND,
            Self::PasswordRequired | Self::IncorrectPassword => StatusCode::UNAUTHORIZED,
            Self::ViewLimitReached => StatusCode::GONE,
            Self::StorageFailure => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ShareError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(json!({
                "success": false,
                "error": self.code(),
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}
