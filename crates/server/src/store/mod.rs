//! Store contracts consumed by the engines.
//!
//! The engines only ever talk to these traits. Two implementations exist:
//! [`postgres::PgStore`] for production and [`memory::MemoryStore`] for
//! hermetic tests.
//!
//! Two guarantees the engines lean on, and every implementation must
//! provide:
//!
//! - `create_reservation_if_unclaimed` is atomic: concurrent calls for the
//!   same wish yield exactly one success and `StoreError::Conflict` for the
//!   rest (uniqueness constraint, not check-then-act).
//! - `bulk_mutate_reservations` validates and applies against a single
//!   consistent snapshot (one transaction), reporting per-id partial
//!   success.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use wishbox_core::{
    Claimant, GroupId, GroupRole, ListId, ReservationId, Slug, TokenId, UserId, WishId,
};

use crate::models::{
    ApiToken, ApiTokenRecord, Group, List, ListWish, NewApiToken, Reservation, User, Wish,
};

/// Errors surfaced by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness or version check failed (already reserved, slug taken,
    /// stale sort update). Surfaced to callers, never retried silently.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The operation exceeded its bounded transaction timeout. Retryable;
    /// transactional atomicity guarantees nothing was partially applied.
    #[error("store operation timed out")]
    Timeout,

    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row violated a domain invariant on read.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// Fields needed to create a reservation.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub wish_id: WishId,
    pub claimant: Claimant,
    /// Digest of the anonymous management token; required iff the claimant
    /// is anonymous.
    pub manage_token_digest: Option<String>,
}

/// The actor key a bulk mutation authenticates each reservation against.
#[derive(Debug, Clone)]
pub enum ReservationOwnerKey {
    /// An authenticated claimant.
    User(UserId),
    /// An anonymous claimant, identified by the digest of their management
    /// token.
    TokenDigest(String),
}

impl ReservationOwnerKey {
    /// Whether this key controls the given reservation.
    #[must_use]
    pub fn owns(&self, reservation: &Reservation) -> bool {
        match self {
            Self::User(user_id) => reservation.claimant.user_id() == Some(*user_id),
            Self::TokenDigest(digest) => {
                reservation.manage_token_digest.as_deref() == Some(digest.as_str())
            }
        }
    }
}

/// What a bulk reservation mutation does to each passing row.
#[derive(Debug, Clone, Copy)]
pub enum BulkReservationAction {
    /// Release the reservation entirely.
    Cancel,
    /// Set `purchased_at`/`purchased_date` (idempotent on already-purchased
    /// rows).
    MarkPurchased {
        /// Claimant-supplied purchase date.
        date: NaiveDate,
    },
    /// Clear the purchase marking.
    UnmarkPurchased,
}

/// Why a single id failed within a bulk mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkFailureReason {
    /// No such reservation (or it was released concurrently).
    NotFound,
    /// The reservation belongs to a different claimant.
    NotOwned,
    /// The reservation is not in a state the action applies to.
    InvalidState,
}

/// A single failed id within a bulk mutation.
#[derive(Debug, Clone, Serialize)]
pub struct BulkFailure {
    pub id: ReservationId,
    pub reason: BulkFailureReason,
}

/// Partial-success report of a bulk mutation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkOutcome {
    pub succeeded: Vec<ReservationId>,
    pub failed: Vec<BulkFailure>,
}

impl BulkOutcome {
    /// Total number of ids processed.
    #[must_use]
    pub fn total_processed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Persistence contract for the engines.
#[async_trait]
pub trait Store: Send + Sync {
    // ----- users -----

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    // ----- wishes -----

    async fn get_wish(&self, id: WishId) -> Result<Option<Wish>, StoreError>;

    /// All lists a wish currently appears in.
    async fn lists_containing_wish(&self, id: WishId) -> Result<Vec<List>, StoreError>;

    // ----- lists -----

    async fn get_list(&self, id: ListId) -> Result<Option<List>, StoreError>;

    async fn list_admin_ids(&self, id: ListId) -> Result<Vec<UserId>, StoreError>;

    /// Groups the list has been shared into.
    async fn list_group_ids(&self, id: ListId) -> Result<Vec<GroupId>, StoreError>;

    async fn list_wishes(&self, id: ListId) -> Result<Vec<ListWish>, StoreError>;

    /// Set a list's slug. Fails with `Conflict` when the slug is taken
    /// within the owner's namespace or the list already has one (slugs are
    /// one-time-settable).
    async fn claim_slug(&self, id: ListId, slug: &Slug) -> Result<(), StoreError>;

    /// Replace the list's password hash and flip visibility to `Password`.
    async fn set_list_password(&self, id: ListId, password_hash: &str) -> Result<(), StoreError>;

    /// Move a wish within a list. Compares `expected_updated_at` against the
    /// association row and fails with `Conflict` on mismatch instead of
    /// silently overwriting a concurrent reorder.
    async fn update_list_wish_sort(
        &self,
        list_id: ListId,
        wish_id: WishId,
        sort_key: &str,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // ----- groups -----

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>, StoreError>;

    async fn group_role(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<Option<GroupRole>, StoreError>;

    async fn set_group_role(
        &self,
        group_id: GroupId,
        user_id: UserId,
        role: GroupRole,
    ) -> Result<(), StoreError>;

    async fn remove_group_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<(), StoreError>;

    // ----- reservations -----

    /// Create a reservation iff the wish has no live reservation. Atomic:
    /// backed by the uniqueness constraint on `wish_id`, so concurrent
    /// claims resolve as one success plus `Conflict`s.
    async fn create_reservation_if_unclaimed(
        &self,
        new: NewReservation,
    ) -> Result<Reservation, StoreError>;

    async fn get_reservation(
        &self,
        id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError>;

    async fn delete_reservation(&self, id: ReservationId) -> Result<(), StoreError>;

    async fn set_reservation_purchased(
        &self,
        id: ReservationId,
        purchased_at: Option<DateTime<Utc>>,
        purchased_date: Option<NaiveDate>,
    ) -> Result<(), StoreError>;

    async fn reservations_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Reservation>, StoreError>;

    async fn reservation_by_token_digest(
        &self,
        digest: &str,
    ) -> Result<Option<Reservation>, StoreError>;

    /// Owner-safe aggregate: for every wish in the list, whether a live
    /// reservation exists. Never exposes claimant data by construction.
    async fn reserved_wish_flags(
        &self,
        list_id: ListId,
    ) -> Result<HashMap<WishId, bool>, StoreError>;

    /// Validate ownership and state for every id against one snapshot, apply
    /// the action to the passing rows, and report the split. Runs in a
    /// single bounded-timeout transaction.
    async fn bulk_mutate_reservations(
        &self,
        action: BulkReservationAction,
        ids: &[ReservationId],
        owner: ReservationOwnerKey,
    ) -> Result<BulkOutcome, StoreError>;

    // ----- personal API tokens -----

    async fn insert_api_token(&self, new: NewApiToken) -> Result<ApiToken, StoreError>;

    async fn api_token_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<ApiTokenRecord>, StoreError>;

    /// Write the digest for a legacy plaintext row and clear the plaintext.
    async fn upgrade_api_token_digest(
        &self,
        id: TokenId,
        digest: &str,
    ) -> Result<(), StoreError>;

    async fn revoke_api_token(&self, id: TokenId) -> Result<(), StoreError>;

    async fn api_tokens_for_user(&self, user_id: UserId) -> Result<Vec<ApiToken>, StoreError>;

    async fn touch_api_token(
        &self,
        id: TokenId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Counter state for one fixed window, as returned by the backend.
#[derive(Debug, Clone, Copy)]
pub struct WindowCount {
    /// The counter value after this increment.
    pub count: u32,
    /// Time remaining until the window resets.
    pub retry_after: Duration,
}

/// Atomic increment-with-expiry contract for the rate limiter.
///
/// Check-and-increment must be one atomic step; a separate read would let
/// concurrent requests both slip past a nearly exhausted limit.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    async fn increment_and_check(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<WindowCount, StoreError>;
}
