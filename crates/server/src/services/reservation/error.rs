//! Reservation engine error types.

use std::time::Duration;

use thiserror::Error;

use crate::services::permission::PermissionError;
use crate::store::StoreError;

/// Errors from reservation operations.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// The wish or reservation does not exist, or the actor may not know
    /// whether it does.
    #[error("not found")]
    NotFound,

    /// Someone else already holds a live reservation on this wish.
    #[error("wish is already reserved")]
    AlreadyReserved,

    /// The actor can see the resource but may not perform the action.
    #[error("forbidden")]
    Forbidden,

    /// The request failed input validation.
    #[error("{0}")]
    Validation(String),

    /// The actor exceeded a rate limit.
    #[error("rate limited")]
    RateLimited {
        /// How long to wait before retrying, when known.
        retry_after: Option<Duration>,
    },

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PermissionError> for ReservationError {
    fn from(err: PermissionError) -> Self {
        match err {
            PermissionError::NotFound => Self::NotFound,
            PermissionError::Forbidden => Self::Forbidden,
            PermissionError::Store(err) => Self::Store(err),
        }
    }
}
