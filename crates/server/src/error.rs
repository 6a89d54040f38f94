//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side errors to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`; service errors convert via `From` so the mapping
//! from domain error to status code lives in one place.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::group::GroupError;
use crate::services::list::ListError;
use crate::services::permission::PermissionError;
use crate::services::reservation::ReservationError;
use crate::services::token::TokenError;
use crate::store::StoreError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request from the client.
    #[error("{0}")]
    Validation(String),

    /// The request needs authentication it did not carry.
    #[error("unauthorized")]
    Unauthorized,

    /// The actor can see the resource but may not perform the action.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found (or the actor may not know whether it exists).
    #[error("not found")]
    NotFound,

    /// A uniqueness or version check failed.
    #[error("{0}")]
    Conflict(String),

    /// The actor exceeded a rate limit.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// The backing store timed out or was unreachable; the request may be
    /// retried.
    #[error("service unavailable")]
    Unavailable,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-safe message. Internal detail never leaves the process.
    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_owned(),
            Self::Unavailable => "Service temporarily unavailable, please retry".to_owned(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Internal(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "request error"
            );
        }

        let status = self.status();
        let body = Json(json!({ "error": self.client_message() }));
        let mut response = (status, body).into_response();

        if let Self::RateLimited {
            retry_after: Some(wait),
        } = self
        {
            if let Ok(value) = HeaderValue::from_str(&wait.as_secs().to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Timeout | StoreError::Unavailable(_) => Self::Unavailable,
            StoreError::Database(_) | StoreError::DataCorruption(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<PermissionError> for AppError {
    fn from(err: PermissionError) -> Self {
        match err {
            PermissionError::NotFound => Self::NotFound,
            PermissionError::Forbidden => Self::Forbidden,
            PermissionError::Store(err) => err.into(),
        }
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::NotFound => Self::NotFound,
            ReservationError::AlreadyReserved => {
                Self::Conflict("wish is already reserved".to_owned())
            }
            ReservationError::Forbidden => Self::Forbidden,
            ReservationError::Validation(msg) => Self::Validation(msg),
            ReservationError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            ReservationError::Store(err) => err.into(),
        }
    }
}

impl From<ListError> for AppError {
    fn from(err: ListError) -> Self {
        match err {
            ListError::NotFound => Self::NotFound,
            ListError::Forbidden => Self::Forbidden,
            ListError::Conflict(msg) => Self::Conflict(msg),
            ListError::Validation(msg) => Self::Validation(msg),
            // Wrong password reads as 403, not 401: the request was
            // authenticated fine, the capability proof failed.
            ListError::WrongPassword => Self::Forbidden,
            ListError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            ListError::Store(err) => err.into(),
        }
    }
}

impl From<GroupError> for AppError {
    fn from(err: GroupError) -> Self {
        match err {
            GroupError::NotFound => Self::NotFound,
            GroupError::Forbidden => Self::Forbidden,
            GroupError::Validation(msg) => Self::Validation(msg),
            GroupError::Store(err) => err.into(),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::SessionRequired => Self::Forbidden,
            TokenError::InvalidName(msg) => Self::Validation(msg),
            TokenError::WrongPassword => Self::Forbidden,
            TokenError::NotPasswordProtected => {
                Self::Validation("list is not password-protected".to_owned())
            }
            TokenError::NotFound => Self::NotFound,
            TokenError::Hash(msg) => Self::Internal(msg),
            TokenError::Store(err) => err.into(),
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        fn status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(status(AppError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(AppError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status(AppError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(AppError::Conflict("slug taken".to_owned())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(AppError::RateLimited { retry_after: None }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status(AppError::Internal("boom".to_owned())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let response = AppError::RateLimited {
            retry_after: Some(Duration::from_secs(120)),
        }
        .into_response();
        assert_eq!(
            response.headers().get(header::RETRY_AFTER),
            Some(&HeaderValue::from_static("120"))
        );
    }

    #[test]
    fn internal_detail_stays_server_side() {
        let err = AppError::Internal("database password leaked".to_owned());
        assert_eq!(err.client_message(), "Internal server error");
    }

    #[test]
    fn timeout_maps_to_retryable_unavailable() {
        let err: AppError = StoreError::Timeout.into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
