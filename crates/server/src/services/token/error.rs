//! Token service error types.

use thiserror::Error;

use crate::store::StoreError;

/// Errors from credential issuing and validation.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Personal API tokens may only be minted from an interactive session;
    /// a bearer token that can mint more bearer tokens turns one leak into
    /// an escalation chain.
    #[error("token creation requires an interactive session")]
    SessionRequired,

    /// Token name failed validation.
    #[error("invalid token name: {0}")]
    InvalidName(String),

    /// The list password did not match.
    #[error("wrong list password")]
    WrongPassword,

    /// The list is not password-protected.
    #[error("list is not password-protected")]
    NotPasswordProtected,

    /// The token does not exist or belongs to someone else. The two cases
    /// are deliberately indistinguishable.
    #[error("token not found")]
    NotFound,

    /// Password hash handling failed.
    #[error("password hash error: {0}")]
    Hash(String),

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),
}
