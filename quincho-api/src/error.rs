use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use quincho_domain::repository::RepoError;
use quincho_domain::DomainError;

#[derive(Debug)]
pub enum AppError {
    /// Authoritative constraint rejection: the interval is occupied. A
    /// decision point for the user, never auto-retried.
    SlotTaken,
    ValidationError(String),
    Unauthorized,
    Forbidden,
    NotFound,
    /// Idempotent-cancellation guard: the reservation already left the
    /// active set.
    AlreadyClosed,
    TokenExpired,
    TokenInvalid,
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code, so clients can tell "slot just taken"
    /// apart from generic validation failures.
    fn code(&self) -> &'static str {
        match self {
            AppError::SlotTaken => "slot_taken",
            AppError::ValidationError(_) => "validation_error",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::NotFound => "not_found",
            AppError::AlreadyClosed => "already_closed",
            AppError::TokenExpired => "token_expired",
            AppError::TokenInvalid => "token_invalid",
            AppError::InternalServerError(_) | AppError::Anyhow(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, error_message) = match self {
            AppError::SlotTaken => (
                StatusCode::CONFLICT,
                "El horario acaba de ser tomado, elegí otro".to_string(),
            ),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            // Deliberately generic: no detail about why the gate closed.
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::AlreadyClosed => (
                StatusCode::CONFLICT,
                "Reservation is no longer active".to_string(),
            ),
            AppError::TokenExpired => (
                StatusCode::GONE,
                "Confirmation link expired, please book again".to_string(),
            ),
            AppError::TokenInvalid => (
                StatusCode::NOT_FOUND,
                "Confirmation link is invalid or already used".to_string(),
            ),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::SlotTaken => AppError::SlotTaken,
            RepoError::NotFound => AppError::NotFound,
            RepoError::AlreadyClosed => AppError::AlreadyClosed,
            RepoError::TokenExpired => AppError::TokenExpired,
            RepoError::TokenInvalid => AppError::TokenInvalid,
            RepoError::Backend(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
