//! User domain types.

use chrono::{DateTime, Utc};

use wishbox_core::{Email, EmailId, UserId};

/// A Wishbox user (domain type).
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Display name shown on lists and profiles.
    pub display_name: String,
    /// When the user signed up.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

/// An email address attached to a user.
///
/// Invariant (enforced by the store): every user keeps at least one verified
/// email, and the primary email is always verified.
#[derive(Debug, Clone)]
pub struct UserEmail {
    /// Database ID of this email row.
    pub id: EmailId,
    /// User who owns this address.
    pub user_id: UserId,
    /// The address itself.
    pub email: Email,
    /// Whether a verification code was confirmed for this address.
    pub verified: bool,
    /// Whether this is the user's primary address.
    pub primary: bool,
    /// When the address was added.
    pub created_at: DateTime<Utc>,
}
