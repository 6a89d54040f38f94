//! In-memory store for tests and local development.
//!
//! Emulates the uniqueness and snapshot guarantees of the Postgres store
//! with a single mutex: every operation runs under one lock, so claims are
//! atomic and bulk mutations see a consistent snapshot.
//!
//! The rate-limit backend side supports fault injection
//! ([`MemoryStore::set_rate_backend_failing`]) and a movable clock
//! ([`MemoryStore::advance_time`]) so fail-open/fail-closed policies and
//! window resets are testable without sleeping.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use wishbox_core::{
    Claimant, DisplayLevel, GroupId, GroupInvitePolicy, GroupRole, ListId, ListVisibility,
    ReservationId, ShareToken, Slug, TokenId, UserId, WishId, sort_key,
};

use crate::models::{
    ApiToken, ApiTokenRecord, Group, GroupMember, List, ListWish, NewApiToken, Reservation,
    User, Wish,
};

use super::{
    BulkFailure, BulkFailureReason, BulkOutcome, BulkReservationAction, NewReservation,
    RateLimitBackend, ReservationOwnerKey, Store, StoreError, WindowCount,
};

#[derive(Debug)]
struct RateWindow {
    started: Instant,
    count: u32,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    users: HashMap<UserId, User>,
    wishes: HashMap<WishId, Wish>,
    lists: HashMap<ListId, List>,
    list_wishes: Vec<ListWish>,
    list_admins: HashMap<ListId, Vec<UserId>>,
    list_groups: HashMap<ListId, Vec<GroupId>>,
    groups: HashMap<GroupId, Group>,
    group_members: HashMap<(GroupId, UserId), GroupMember>,
    reservations: HashMap<ReservationId, Reservation>,
    api_tokens: HashMap<TokenId, ApiTokenRecord>,
    rate_windows: HashMap<String, RateWindow>,
    time_advance: Duration,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn now(&self) -> Instant {
        Instant::now() + self.time_advance
    }
}

/// In-memory [`Store`] and [`RateLimitBackend`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    rate_failing: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Make the rate-limit backend report `Unavailable` until cleared.
    pub fn set_rate_backend_failing(&self, failing: bool) {
        self.rate_failing.store(failing, Ordering::SeqCst);
    }

    /// Move the rate limiter's clock forward.
    pub fn advance_time(&self, by: Duration) {
        self.lock().time_advance += by;
    }

    // ----- seeding helpers -----

    /// Insert a user and return its ID.
    pub fn seed_user(&self, display_name: &str) -> UserId {
        let mut state = self.lock();
        let id = UserId::new(state.next_id());
        let now = Utc::now();
        state.users.insert(
            id,
            User {
                id,
                display_name: display_name.to_owned(),
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Insert a list and return its ID.
    pub fn seed_list(
        &self,
        owner_id: UserId,
        name: &str,
        visibility: ListVisibility,
        password_hash: Option<String>,
    ) -> ListId {
        let mut state = self.lock();
        let raw = state.next_id();
        let id = ListId::new(raw);
        let now = Utc::now();
        state.lists.insert(
            id,
            List {
                id,
                owner_id,
                name: name.to_owned(),
                visibility,
                slug: None,
                share_token: ShareToken::new(format!("share-{raw:08x}")),
                password_hash,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Insert a wish and return its ID.
    pub fn seed_wish(&self, owner_id: UserId, title: &str) -> WishId {
        let mut state = self.lock();
        let id = WishId::new(state.next_id());
        let now = Utc::now();
        state.wishes.insert(
            id,
            Wish {
                id,
                owner_id,
                title: title.to_owned(),
                url: None,
                price: None,
                image_url: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Append a wish to a list with a fresh sort key.
    pub fn add_wish_to_list(&self, list_id: ListId, wish_id: WishId) {
        let mut state = self.lock();
        let last_key = state
            .list_wishes
            .iter()
            .filter(|lw| lw.list_id == list_id)
            .map(|lw| lw.sort_key.clone())
            .max();
        let key = sort_key::between(last_key.as_deref(), None)
            .unwrap_or_else(|_| sort_key::initial());
        let now = Utc::now();
        state.list_wishes.push(ListWish {
            list_id,
            wish_id,
            added_at: now,
            display_level: DisplayLevel::Normal,
            sort_key: key,
            updated_at: now,
        });
    }

    /// Grant a user co-editor rights on a list.
    pub fn add_list_admin(&self, list_id: ListId, user_id: UserId) {
        self.lock()
            .list_admins
            .entry(list_id)
            .or_default()
            .push(user_id);
    }

    /// Insert a group and return its ID.
    pub fn seed_group(&self, name: &str, invite_policy: GroupInvitePolicy) -> GroupId {
        let mut state = self.lock();
        let id = GroupId::new(state.next_id());
        state.groups.insert(
            id,
            Group {
                id,
                name: name.to_owned(),
                invite_policy,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Add a member to a group.
    pub fn add_group_member(&self, group_id: GroupId, user_id: UserId, role: GroupRole) {
        self.lock().group_members.insert(
            (group_id, user_id),
            GroupMember {
                group_id,
                user_id,
                role,
                joined_at: Utc::now(),
            },
        );
    }

    /// Share a list into a group.
    pub fn share_list_with_group(&self, list_id: ListId, group_id: GroupId) {
        self.lock()
            .list_groups
            .entry(list_id)
            .or_default()
            .push(group_id);
    }

    /// Insert a pre-digest-migration token row (plaintext secret, no
    /// digest). Only the migration tests want this.
    pub fn seed_legacy_api_token(&self, user_id: UserId, prefix: &str, secret: &str) -> TokenId {
        let mut state = self.lock();
        let id = TokenId::new(state.next_id());
        state.api_tokens.insert(
            id,
            ApiTokenRecord {
                token: ApiToken {
                    id,
                    user_id,
                    name: "legacy".to_owned(),
                    device_type: wishbox_core::TokenDeviceType::Other,
                    prefix: prefix.to_owned(),
                    expires_at: None,
                    revoked_at: None,
                    created_at: Utc::now(),
                    last_used_at: None,
                },
                digest: None,
                legacy_secret: Some(secret.to_owned()),
            },
        );
        id
    }

    /// Raw token record access for migration assertions.
    #[must_use]
    pub fn api_token_record(&self, id: TokenId) -> Option<ApiTokenRecord> {
        self.lock().api_tokens.get(&id).cloned()
    }

    /// The list's share token (tests need it to build unlock requests).
    #[must_use]
    pub fn share_token(&self, list_id: ListId) -> Option<ShareToken> {
        self.lock().lists.get(&list_id).map(|l| l.share_token.clone())
    }

    /// The association row for a wish in a list.
    #[must_use]
    pub fn list_wish(&self, list_id: ListId, wish_id: WishId) -> Option<ListWish> {
        self.lock()
            .list_wishes
            .iter()
            .find(|lw| lw.list_id == list_id && lw.wish_id == wish_id)
            .cloned()
    }
}

fn apply_bulk_action(
    action: BulkReservationAction,
    reservation: &mut Reservation,
) -> Result<(), BulkFailureReason> {
    match action {
        BulkReservationAction::Cancel => Ok(()),
        BulkReservationAction::MarkPurchased { date } => {
            if reservation.purchased_at.is_none() {
                reservation.purchased_at = Some(Utc::now());
                reservation.purchased_date = Some(date);
            }
            Ok(())
        }
        BulkReservationAction::UnmarkPurchased => {
            if reservation.purchased_at.is_none() {
                return Err(BulkFailureReason::InvalidState);
            }
            reservation.purchased_at = None;
            reservation.purchased_date = None;
            Ok(())
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn get_wish(&self, id: WishId) -> Result<Option<Wish>, StoreError> {
        Ok(self.lock().wishes.get(&id).cloned())
    }

    async fn lists_containing_wish(&self, id: WishId) -> Result<Vec<List>, StoreError> {
        let state = self.lock();
        Ok(state
            .list_wishes
            .iter()
            .filter(|lw| lw.wish_id == id)
            .filter_map(|lw| state.lists.get(&lw.list_id).cloned())
            .collect())
    }

    async fn get_list(&self, id: ListId) -> Result<Option<List>, StoreError> {
        Ok(self.lock().lists.get(&id).cloned())
    }

    async fn list_admin_ids(&self, id: ListId) -> Result<Vec<UserId>, StoreError> {
        Ok(self.lock().list_admins.get(&id).cloned().unwrap_or_default())
    }

    async fn list_group_ids(&self, id: ListId) -> Result<Vec<GroupId>, StoreError> {
        Ok(self.lock().list_groups.get(&id).cloned().unwrap_or_default())
    }

    async fn list_wishes(&self, id: ListId) -> Result<Vec<ListWish>, StoreError> {
        let mut wishes: Vec<ListWish> = self
            .lock()
            .list_wishes
            .iter()
            .filter(|lw| lw.list_id == id)
            .cloned()
            .collect();
        wishes.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
        Ok(wishes)
    }

    async fn claim_slug(&self, id: ListId, slug: &Slug) -> Result<(), StoreError> {
        let mut state = self.lock();
        let owner_id = match state.lists.get(&id) {
            Some(list) => {
                if list.slug.is_some() {
                    return Err(StoreError::Conflict("slug already set".to_owned()));
                }
                list.owner_id
            }
            None => return Err(StoreError::Conflict("list not found".to_owned())),
        };
        let taken = state
            .lists
            .values()
            .any(|l| l.owner_id == owner_id && l.slug.as_ref() == Some(slug));
        if taken {
            return Err(StoreError::Conflict("slug taken".to_owned()));
        }
        if let Some(list) = state.lists.get_mut(&id) {
            list.slug = Some(slug.clone());
            list.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_list_password(&self, id: ListId, password_hash: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let list = state
            .lists
            .get_mut(&id)
            .ok_or_else(|| StoreError::Conflict("list not found".to_owned()))?;
        list.password_hash = Some(password_hash.to_owned());
        list.visibility = ListVisibility::Password;
        list.updated_at = Utc::now();
        Ok(())
    }

    async fn update_list_wish_sort(
        &self,
        list_id: ListId,
        wish_id: WishId,
        sort_key: &str,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let row = state
            .list_wishes
            .iter_mut()
            .find(|lw| lw.list_id == list_id && lw.wish_id == wish_id)
            .ok_or_else(|| StoreError::Conflict("wish not in list".to_owned()))?;
        if row.updated_at != expected_updated_at {
            return Err(StoreError::Conflict("sort order changed concurrently".to_owned()));
        }
        row.sort_key = sort_key.to_owned();
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>, StoreError> {
        Ok(self.lock().groups.get(&id).cloned())
    }

    async fn group_role(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<Option<GroupRole>, StoreError> {
        Ok(self
            .lock()
            .group_members
            .get(&(group_id, user_id))
            .map(|m| m.role))
    }

    async fn set_group_role(
        &self,
        group_id: GroupId,
        user_id: UserId,
        role: GroupRole,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let member = state
            .group_members
            .get_mut(&(group_id, user_id))
            .ok_or_else(|| StoreError::Conflict("not a member".to_owned()))?;
        member.role = role;
        Ok(())
    }

    async fn remove_group_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        self.lock().group_members.remove(&(group_id, user_id));
        Ok(())
    }

    async fn create_reservation_if_unclaimed(
        &self,
        new: NewReservation,
    ) -> Result<Reservation, StoreError> {
        // One lock for check and insert: this is the uniqueness constraint.
        let mut state = self.lock();
        if state
            .reservations
            .values()
            .any(|r| r.wish_id == new.wish_id)
        {
            return Err(StoreError::Conflict("wish already reserved".to_owned()));
        }
        let id = ReservationId::new(state.next_id());
        let reservation = Reservation {
            id,
            wish_id: new.wish_id,
            claimant: new.claimant,
            manage_token_digest: new.manage_token_digest,
            reserved_at: Utc::now(),
            purchased_at: None,
            purchased_date: None,
            reminder_sent_at: None,
        };
        state.reservations.insert(id, reservation.clone());
        Ok(reservation)
    }

    async fn get_reservation(
        &self,
        id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError> {
        Ok(self.lock().reservations.get(&id).cloned())
    }

    async fn delete_reservation(&self, id: ReservationId) -> Result<(), StoreError> {
        self.lock().reservations.remove(&id);
        Ok(())
    }

    async fn set_reservation_purchased(
        &self,
        id: ReservationId,
        purchased_at: Option<DateTime<Utc>>,
        purchased_date: Option<NaiveDate>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let reservation = state
            .reservations
            .get_mut(&id)
            .ok_or_else(|| StoreError::Conflict("reservation not found".to_owned()))?;
        reservation.purchased_at = purchased_at;
        reservation.purchased_date = purchased_date;
        Ok(())
    }

    async fn reservations_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Reservation>, StoreError> {
        Ok(self
            .lock()
            .reservations
            .values()
            .filter(|r| matches!(r.claimant, Claimant::User { user_id: u } if u == user_id))
            .cloned()
            .collect())
    }

    async fn reservation_by_token_digest(
        &self,
        digest: &str,
    ) -> Result<Option<Reservation>, StoreError> {
        Ok(self
            .lock()
            .reservations
            .values()
            .find(|r| r.manage_token_digest.as_deref() == Some(digest))
            .cloned())
    }

    async fn reserved_wish_flags(
        &self,
        list_id: ListId,
    ) -> Result<HashMap<WishId, bool>, StoreError> {
        let state = self.lock();
        Ok(state
            .list_wishes
            .iter()
            .filter(|lw| lw.list_id == list_id)
            .map(|lw| {
                let reserved = state
                    .reservations
                    .values()
                    .any(|r| r.wish_id == lw.wish_id);
                (lw.wish_id, reserved)
            })
            .collect())
    }

    async fn bulk_mutate_reservations(
        &self,
        action: BulkReservationAction,
        ids: &[ReservationId],
        owner: ReservationOwnerKey,
    ) -> Result<BulkOutcome, StoreError> {
        // One lock span = one snapshot, matching the Postgres transaction.
        let mut state = self.lock();
        let mut outcome = BulkOutcome::default();
        for &id in ids {
            let Some(reservation) = state.reservations.get_mut(&id) else {
                outcome.failed.push(BulkFailure {
                    id,
                    reason: BulkFailureReason::NotFound,
                });
                continue;
            };
            if !owner.owns(reservation) {
                outcome.failed.push(BulkFailure {
                    id,
                    reason: BulkFailureReason::NotOwned,
                });
                continue;
            }
            match apply_bulk_action(action, reservation) {
                Ok(()) => {
                    if matches!(action, BulkReservationAction::Cancel) {
                        state.reservations.remove(&id);
                    }
                    outcome.succeeded.push(id);
                }
                Err(reason) => outcome.failed.push(BulkFailure { id, reason }),
            }
        }
        Ok(outcome)
    }

    async fn insert_api_token(&self, new: NewApiToken) -> Result<ApiToken, StoreError> {
        let mut state = self.lock();
        let id = TokenId::new(state.next_id());
        let token = ApiToken {
            id,
            user_id: new.user_id,
            name: new.name,
            device_type: new.device_type,
            prefix: new.prefix,
            expires_at: new.expires_at,
            revoked_at: None,
            created_at: Utc::now(),
            last_used_at: None,
        };
        state.api_tokens.insert(
            id,
            ApiTokenRecord {
                token: token.clone(),
                digest: Some(new.digest),
                legacy_secret: None,
            },
        );
        Ok(token)
    }

    async fn api_token_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<ApiTokenRecord>, StoreError> {
        Ok(self
            .lock()
            .api_tokens
            .values()
            .find(|r| r.token.prefix == prefix)
            .cloned())
    }

    async fn upgrade_api_token_digest(
        &self,
        id: TokenId,
        digest: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(record) = state.api_tokens.get_mut(&id) {
            record.digest = Some(digest.to_owned());
            record.legacy_secret = None;
        }
        Ok(())
    }

    async fn revoke_api_token(&self, id: TokenId) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(record) = state.api_tokens.get_mut(&id) {
            record.token.revoked_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn api_tokens_for_user(&self, user_id: UserId) -> Result<Vec<ApiToken>, StoreError> {
        Ok(self
            .lock()
            .api_tokens
            .values()
            .filter(|r| r.token.user_id == user_id)
            .map(|r| r.token.clone())
            .collect())
    }

    async fn touch_api_token(
        &self,
        id: TokenId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(record) = state.api_tokens.get_mut(&id) {
            record.token.last_used_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl RateLimitBackend for MemoryStore {
    async fn increment_and_check(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<WindowCount, StoreError> {
        if self.rate_failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("rate backend down".to_owned()));
        }
        let mut state = self.lock();
        let now = state.now();
        let entry = state
            .rate_windows
            .entry(key.to_owned())
            .or_insert(RateWindow {
                started: now,
                count: 0,
            });
        if now.duration_since(entry.started) >= window {
            entry.started = now;
            entry.count = 0;
        }
        entry.count += 1;
        let elapsed = now.duration_since(entry.started);
        Ok(WindowCount {
            count: entry.count,
            retry_after: window.saturating_sub(elapsed),
        })
    }
}
