//! Claimant identity for reservations.

use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::UserId;

/// Who is claiming (or claimed) a wish.
///
/// Exactly one of the variants applies to a reservation. Anonymous claimants
/// supply a contact pair at claim time and receive a management token as
/// their sole credential; the token itself is never stored here, only its
/// digest in the reservation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Claimant {
    /// An authenticated user.
    User { user_id: UserId },
    /// An anonymous gift-giver identified only by name and email.
    Anonymous { name: String, email: Email },
}

impl Claimant {
    /// The user ID, when the claimant is an authenticated user.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User { user_id } => Some(*user_id),
            Self::Anonymous { .. } => None,
        }
    }

    /// Whether this claimant is anonymous.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous { .. })
    }
}
