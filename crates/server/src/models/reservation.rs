//! Reservation domain types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use wishbox_core::{Claimant, ReservationId, WishId};

/// A live claim on a wish.
///
/// The store enforces at most one live reservation per wish via a uniqueness
/// constraint on `wish_id`. This struct carries claimant identity and must
/// therefore never be serialized onto an owner-reachable read path; owners
/// only ever see the aggregate boolean from
/// `Store::reserved_wish_flags`.
#[derive(Debug, Clone)]
pub struct Reservation {
    /// Unique reservation ID.
    pub id: ReservationId,
    /// The reserved wish.
    pub wish_id: WishId,
    /// Who claimed it.
    pub claimant: Claimant,
    /// SHA-256 digest of the anonymous management token; `Some` exactly when
    /// the claimant is anonymous.
    pub manage_token_digest: Option<String>,
    /// When the claim was made.
    pub reserved_at: DateTime<Utc>,
    /// When the claimant marked the item purchased, if they have.
    pub purchased_at: Option<DateTime<Utc>>,
    /// Claimant-supplied purchase date (may differ from `purchased_at`).
    pub purchased_date: Option<NaiveDate>,
    /// When a purchase reminder was last sent, if ever.
    pub reminder_sent_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Whether the claimant has marked this purchased.
    #[must_use]
    pub const fn is_purchased(&self) -> bool {
        self.purchased_at.is_some()
    }
}

/// The claimant-facing view of a reservation.
///
/// Serialized to claimants (and only to claimants) from the `mine` read path
/// and from claim responses. Deliberately omits the management token digest.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationView {
    pub id: ReservationId,
    pub wish_id: WishId,
    pub claimant: Claimant,
    pub reserved_at: DateTime<Utc>,
    pub purchased_at: Option<DateTime<Utc>>,
    pub purchased_date: Option<NaiveDate>,
}

impl From<&Reservation> for ReservationView {
    fn from(r: &Reservation) -> Self {
        Self {
            id: r.id,
            wish_id: r.wish_id,
            claimant: r.claimant.clone(),
            reserved_at: r.reserved_at,
            purchased_at: r.purchased_at,
            purchased_date: r.purchased_date,
        }
    }
}
