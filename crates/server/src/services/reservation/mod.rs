//! The reservation engine.
//!
//! Claims, releases, purchase marking, and bulk mutations on reservations.
//! Every mutation runs the same pipeline: rate gate, actor resolution,
//! permission check, then a single store call whose atomicity carries the
//! concurrency guarantee. The engine never does check-then-act on claim
//! state; `Store::create_reservation_if_unclaimed` resolves races at the
//! uniqueness constraint.
//!
//! Two identity rules hold everywhere in this module:
//!
//! - A list owner never learns who reserved their wishes. The only
//!   owner-reachable read is [`ReservationService::list_reservation_status`],
//!   which returns booleans.
//! - "Not yours" and "does not exist" are the same error. Management
//!   operations against someone else's reservation come back `NotFound`.

mod error;

pub use error::ReservationError;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use wishbox_core::{Action, Claimant, ListId, ReservationId, Resource, ShareToken, UserId, WishId};

use crate::models::ReservationView;
use crate::services::permission::{Actor, PermissionService};
use crate::services::rate_limit::{RateLimitAction, RateLimiter};
use crate::services::token::TokenService;
use crate::store::{
    BulkOutcome, BulkReservationAction, NewReservation, ReservationOwnerKey, Store, StoreError,
};

/// Ceiling on ids per bulk mutation; larger batches are rejected up front
/// rather than holding row locks for an unbounded span.
pub const MAX_BULK_IDS: usize = 100;

/// A claim request, fully assembled by the HTTP layer.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    /// The wish being claimed.
    pub wish_id: WishId,
    /// Who is claiming.
    pub claimant: Claimant,
    /// The caller's list-access cookie, if they sent one.
    pub access_cookie: Option<String>,
    /// A share token from the URL the caller arrived through, if any.
    pub share_token: Option<ShareToken>,
    /// Rate-limit identifier (user id or client fingerprint).
    pub rate_key: String,
}

/// A successful claim.
#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub reservation: ReservationView,
    /// The management secret, minted for anonymous claimants only. Shown
    /// once; only its digest is stored.
    pub manage_secret: Option<String>,
}

/// The identity managing an existing reservation.
#[derive(Debug, Clone)]
pub enum ReservationActor {
    /// An authenticated user managing their own claims.
    User(UserId),
    /// An anonymous claimant presenting their management secret.
    AnonymousToken(String),
}

/// Reservation operations.
#[derive(Clone)]
pub struct ReservationService {
    store: Arc<dyn Store>,
    permissions: PermissionService,
    limiter: RateLimiter,
    tokens: Arc<TokenService>,
}

impl ReservationService {
    /// Create the engine over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        permissions: PermissionService,
        limiter: RateLimiter,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            store,
            permissions,
            limiter,
            tokens,
        }
    }

    /// Claim a wish.
    ///
    /// Anonymous claimants get a one-time management secret back; the store
    /// keeps only its digest.
    ///
    /// # Errors
    ///
    /// `RateLimited` before anything else runs; `NotFound`/`Forbidden` from
    /// the permission check (owners always get `Forbidden`, invisible wishes
    /// `NotFound`); `AlreadyReserved` when another claimant won the race.
    pub async fn claim(&self, req: ClaimRequest) -> Result<ClaimOutcome, ReservationError> {
        let decision = self
            .limiter
            .check(RateLimitAction::ClaimWish, &req.rate_key)
            .await;
        if !decision.allowed {
            return Err(ReservationError::RateLimited {
                retry_after: decision.retry_after,
            });
        }

        if let Claimant::Anonymous { name, .. } = &req.claimant {
            if name.trim().is_empty() {
                return Err(ReservationError::Validation(
                    "claimant name must not be empty".to_owned(),
                ));
            }
        }

        let actor = self
            .resolve_actor(
                req.claimant.user_id(),
                req.wish_id,
                req.access_cookie.as_deref(),
                req.share_token.as_ref(),
            )
            .await?;
        self.permissions
            .require(&actor, Action::Reserve, Resource::Wish(req.wish_id))
            .await?;

        let (manage_secret, manage_token_digest) = if req.claimant.is_anonymous() {
            let (secret, digest) = self.tokens.mint_reservation_secret();
            (Some(secret), Some(digest))
        } else {
            (None, None)
        };

        let created = self
            .store
            .create_reservation_if_unclaimed(NewReservation {
                wish_id: req.wish_id,
                claimant: req.claimant,
                manage_token_digest,
            })
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => ReservationError::AlreadyReserved,
                other => ReservationError::Store(other),
            })?;

        tracing::info!(
            wish_id = %created.wish_id,
            reservation_id = %created.id,
            anonymous = created.claimant.is_anonymous(),
            "wish reserved"
        );

        Ok(ClaimOutcome {
            reservation: ReservationView::from(&created),
            manage_secret,
        })
    }

    /// Release a reservation.
    ///
    /// # Errors
    ///
    /// `NotFound` when the reservation is missing or held by someone else.
    pub async fn release(
        &self,
        actor: &ReservationActor,
        id: ReservationId,
    ) -> Result<(), ReservationError> {
        let reservation = self.owned_reservation(actor, id).await?;
        self.store.delete_reservation(reservation.id).await?;
        tracing::info!(reservation_id = %id, "reservation released");
        Ok(())
    }

    /// Mark a reservation purchased.
    ///
    /// Idempotent: a second call leaves the original `purchased_at` and
    /// date untouched.
    ///
    /// # Errors
    ///
    /// `NotFound` when the reservation is missing or held by someone else.
    pub async fn mark_purchased(
        &self,
        actor: &ReservationActor,
        id: ReservationId,
        date: NaiveDate,
    ) -> Result<ReservationView, ReservationError> {
        let mut reservation = self.owned_reservation(actor, id).await?;
        if !reservation.is_purchased() {
            let now = Utc::now();
            self.store
                .set_reservation_purchased(id, Some(now), Some(date))
                .await?;
            reservation.purchased_at = Some(now);
            reservation.purchased_date = Some(date);
        }
        Ok(ReservationView::from(&reservation))
    }

    /// Clear the purchase marking. Idempotent.
    ///
    /// # Errors
    ///
    /// `NotFound` when the reservation is missing or held by someone else.
    pub async fn unmark_purchased(
        &self,
        actor: &ReservationActor,
        id: ReservationId,
    ) -> Result<ReservationView, ReservationError> {
        let mut reservation = self.owned_reservation(actor, id).await?;
        if reservation.is_purchased() {
            self.store.set_reservation_purchased(id, None, None).await?;
            reservation.purchased_at = None;
            reservation.purchased_date = None;
        }
        Ok(ReservationView::from(&reservation))
    }

    /// Apply one action to many reservations, reporting per-id success.
    ///
    /// The store validates ownership and state for every id against one
    /// transactional snapshot and commits the passing subset; a failing id
    /// never rolls back its siblings.
    ///
    /// # Errors
    ///
    /// `Validation` on an empty or oversized batch, `RateLimited`, or store
    /// errors (a `Timeout` means nothing was applied).
    pub async fn bulk(
        &self,
        actor: &ReservationActor,
        action: BulkReservationAction,
        ids: &[ReservationId],
        rate_key: &str,
    ) -> Result<BulkOutcome, ReservationError> {
        if ids.is_empty() {
            return Err(ReservationError::Validation(
                "at least one reservation id is required".to_owned(),
            ));
        }
        if ids.len() > MAX_BULK_IDS {
            return Err(ReservationError::Validation(format!(
                "at most {MAX_BULK_IDS} reservation ids per request"
            )));
        }

        let decision = self
            .limiter
            .check(RateLimitAction::BulkReservation, rate_key)
            .await;
        if !decision.allowed {
            return Err(ReservationError::RateLimited {
                retry_after: decision.retry_after,
            });
        }

        let outcome = self
            .store
            .bulk_mutate_reservations(action, ids, self.owner_key(actor))
            .await?;
        tracing::info!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "bulk reservation mutation"
        );
        Ok(outcome)
    }

    /// The owner-safe reservation map for a list: wish id to "is reserved".
    ///
    /// Carries no claimant data by construction, so it is safe to serve to
    /// the list owner.
    ///
    /// # Errors
    ///
    /// `RateLimited`, `NotFound`/`Forbidden` from the view check, or store
    /// errors.
    pub async fn list_reservation_status(
        &self,
        actor: &Actor,
        list_id: ListId,
        rate_key: &str,
    ) -> Result<HashMap<WishId, bool>, ReservationError> {
        let decision = self
            .limiter
            .check(RateLimitAction::MetadataLookup, rate_key)
            .await;
        if !decision.allowed {
            return Err(ReservationError::RateLimited {
                retry_after: decision.retry_after,
            });
        }
        self.permissions
            .require(actor, Action::View, Resource::List(list_id))
            .await?;
        Ok(self.store.reserved_wish_flags(list_id).await?)
    }

    /// All reservations held by a user, for their own "my reservations"
    /// page.
    ///
    /// # Errors
    ///
    /// Store errors only.
    pub async fn my_reservations(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ReservationView>, ReservationError> {
        let reservations = self.store.reservations_for_user(user_id).await?;
        Ok(reservations.iter().map(ReservationView::from).collect())
    }

    /// Look up the reservation behind an anonymous management secret.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown secrets; never distinguishes "never existed"
    /// from "already released".
    pub async fn find_by_secret(
        &self,
        secret: &str,
    ) -> Result<ReservationView, ReservationError> {
        let digest = self.tokens.digest_reservation_secret(secret);
        let reservation = self
            .store
            .reservation_by_token_digest(&digest)
            .await?
            .ok_or(ReservationError::NotFound)?;
        Ok(ReservationView::from(&reservation))
    }

    /// Resolve a permission actor for the claim path: the claimant's user
    /// id plus any list unlocks proven by the access cookie or share token.
    async fn resolve_actor(
        &self,
        user_id: Option<UserId>,
        wish_id: WishId,
        access_cookie: Option<&str>,
        share_token: Option<&ShareToken>,
    ) -> Result<Actor, ReservationError> {
        let mut unlocked = HashSet::new();
        for list in self.store.lists_containing_wish(wish_id).await? {
            if share_token.is_some_and(|t| *t == list.share_token) {
                unlocked.insert(list.id);
                continue;
            }
            if let (Some(cookie), Some(hash)) = (access_cookie, &list.password_hash) {
                if self.tokens.has_valid_access(cookie, list.id, hash) {
                    unlocked.insert(list.id);
                }
            }
        }
        Ok(Actor {
            user_id,
            unlocked_lists: unlocked,
        })
    }

    async fn owned_reservation(
        &self,
        actor: &ReservationActor,
        id: ReservationId,
    ) -> Result<crate::models::Reservation, ReservationError> {
        let Some(reservation) = self.store.get_reservation(id).await? else {
            return Err(ReservationError::NotFound);
        };
        if !self.owner_key(actor).owns(&reservation) {
            return Err(ReservationError::NotFound);
        }
        Ok(reservation)
    }

    fn owner_key(&self, actor: &ReservationActor) -> ReservationOwnerKey {
        match actor {
            ReservationActor::User(user_id) => ReservationOwnerKey::User(*user_id),
            ReservationActor::AnonymousToken(secret) => {
                ReservationOwnerKey::TokenDigest(self.tokens.digest_reservation_secret(secret))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wishbox_core::{Email, ListVisibility};

    use crate::store::memory::MemoryStore;
    use crate::store::RateLimitBackend;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: ReservationService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let as_store: Arc<dyn Store> = Arc::clone(&store) as Arc<dyn Store>;
        let tokens = Arc::new(TokenService::new(
            Arc::clone(&as_store),
            SecretString::from("test-signing-key-with-enough-entropy"),
        ));
        let service = ReservationService::new(
            Arc::clone(&as_store),
            PermissionService::new(Arc::clone(&as_store)),
            RateLimiter::new(Arc::clone(&store) as Arc<dyn RateLimitBackend>),
            tokens,
        );
        Fixture { store, service }
    }

    fn anonymous(name: &str) -> Claimant {
        Claimant::Anonymous {
            name: name.to_owned(),
            email: Email::parse("giver@example.com").expect("valid email"),
        }
    }

    fn claim_request(wish_id: WishId, claimant: Claimant) -> ClaimRequest {
        ClaimRequest {
            wish_id,
            claimant,
            access_cookie: None,
            share_token: None,
            rate_key: "test-client".to_owned(),
        }
    }

    fn public_wish(store: &MemoryStore) -> (UserId, WishId) {
        let owner = store.seed_user("owner");
        let list = store.seed_list(owner, "gifts", ListVisibility::Public, None);
        let wish = store.seed_wish(owner, "socks");
        store.add_wish_to_list(list, wish);
        (owner, wish)
    }

    #[tokio::test]
    async fn anonymous_claim_mints_manage_secret() {
        let fx = fixture();
        let (_, wish) = public_wish(&fx.store);

        let outcome = fx
            .service
            .claim(claim_request(wish, anonymous("Aunt May")))
            .await
            .expect("claim");

        let secret = outcome.manage_secret.expect("anonymous claims get a secret");
        assert!(secret.starts_with("wbxr_"));

        let found = fx.service.find_by_secret(&secret).await.expect("lookup");
        assert_eq!(found.wish_id, wish);
    }

    #[tokio::test]
    async fn second_claim_reports_already_reserved() {
        let fx = fixture();
        let (_, wish) = public_wish(&fx.store);
        let giver = fx.store.seed_user("giver");

        fx.service
            .claim(claim_request(wish, Claimant::User { user_id: giver }))
            .await
            .expect("first claim");

        let second = fx
            .service
            .claim(claim_request(wish, anonymous("Aunt May")))
            .await;
        assert!(matches!(second, Err(ReservationError::AlreadyReserved)));
    }

    #[tokio::test]
    async fn owner_cannot_claim_own_wish() {
        let fx = fixture();
        let (owner, wish) = public_wish(&fx.store);

        let result = fx
            .service
            .claim(claim_request(wish, Claimant::User { user_id: owner }))
            .await;
        assert!(matches!(result, Err(ReservationError::Forbidden)));
    }

    #[tokio::test]
    async fn share_token_unlocks_private_list_for_claiming() {
        let fx = fixture();
        let owner = fx.store.seed_user("owner");
        let list = fx
            .store
            .seed_list(owner, "private", ListVisibility::Private, None);
        let wish = fx.store.seed_wish(owner, "scarf");
        fx.store.add_wish_to_list(list, wish);
        let token = fx.store.share_token(list).expect("seeded list");

        let blind = fx
            .service
            .claim(claim_request(wish, anonymous("Aunt May")))
            .await;
        assert!(matches!(blind, Err(ReservationError::NotFound)));

        let mut req = claim_request(wish, anonymous("Aunt May"));
        req.share_token = Some(token);
        fx.service.claim(req).await.expect("claim via share link");
    }

    #[tokio::test]
    async fn release_by_wrong_actor_is_not_found() {
        let fx = fixture();
        let (_, wish) = public_wish(&fx.store);
        let giver = fx.store.seed_user("giver");
        let stranger = fx.store.seed_user("stranger");

        let outcome = fx
            .service
            .claim(claim_request(wish, Claimant::User { user_id: giver }))
            .await
            .expect("claim");
        let id = outcome.reservation.id;

        let denied = fx
            .service
            .release(&ReservationActor::User(stranger), id)
            .await;
        assert!(matches!(denied, Err(ReservationError::NotFound)));

        fx.service
            .release(&ReservationActor::User(giver), id)
            .await
            .expect("owner releases");

        // Released wishes are claimable again.
        fx.service
            .claim(claim_request(wish, anonymous("Aunt May")))
            .await
            .expect("reclaim after release");
    }

    #[tokio::test]
    async fn mark_purchased_is_idempotent() {
        let fx = fixture();
        let (_, wish) = public_wish(&fx.store);
        let giver = fx.store.seed_user("giver");
        let actor = ReservationActor::User(giver);

        let outcome = fx
            .service
            .claim(claim_request(wish, Claimant::User { user_id: giver }))
            .await
            .expect("claim");
        let id = outcome.reservation.id;

        let date = NaiveDate::from_ymd_opt(2026, 8, 20).expect("valid date");
        let first = fx
            .service
            .mark_purchased(&actor, id, date)
            .await
            .expect("mark");
        let first_at = first.purchased_at.expect("purchased");

        let later = NaiveDate::from_ymd_opt(2026, 8, 21).expect("valid date");
        let second = fx
            .service
            .mark_purchased(&actor, id, later)
            .await
            .expect("mark again");
        assert_eq!(second.purchased_at, Some(first_at));
        assert_eq!(second.purchased_date, Some(date));

        let cleared = fx
            .service
            .unmark_purchased(&actor, id)
            .await
            .expect("unmark");
        assert!(cleared.purchased_at.is_none());
        assert!(cleared.purchased_date.is_none());
    }

    #[tokio::test]
    async fn status_map_hides_claimant_identity() {
        let fx = fixture();
        let owner = fx.store.seed_user("owner");
        let list = fx
            .store
            .seed_list(owner, "gifts", ListVisibility::Public, None);
        let reserved = fx.store.seed_wish(owner, "socks");
        let free = fx.store.seed_wish(owner, "scarf");
        fx.store.add_wish_to_list(list, reserved);
        fx.store.add_wish_to_list(list, free);

        fx.service
            .claim(claim_request(reserved, anonymous("Aunt May")))
            .await
            .expect("claim");

        let map = fx
            .service
            .list_reservation_status(&Actor::user(owner), list, "owner-key")
            .await
            .expect("status");
        assert_eq!(map.get(&reserved), Some(&true));
        assert_eq!(map.get(&free), Some(&false));
    }

    #[tokio::test]
    async fn bulk_rejects_empty_and_oversized_batches() {
        let fx = fixture();
        let giver = fx.store.seed_user("giver");
        let actor = ReservationActor::User(giver);

        let empty = fx
            .service
            .bulk(&actor, BulkReservationAction::Cancel, &[], "k")
            .await;
        assert!(matches!(empty, Err(ReservationError::Validation(_))));

        let too_many: Vec<ReservationId> =
            (0..=MAX_BULK_IDS as i64).map(ReservationId::new).collect();
        let oversized = fx
            .service
            .bulk(&actor, BulkReservationAction::Cancel, &too_many, "k")
            .await;
        assert!(matches!(oversized, Err(ReservationError::Validation(_))));
    }

    #[tokio::test]
    async fn bulk_cancel_reports_partial_success() {
        let fx = fixture();
        let (_, wish_a) = public_wish(&fx.store);
        let owner_b = fx.store.seed_user("owner-b");
        let list_b = fx
            .store
            .seed_list(owner_b, "more", ListVisibility::Public, None);
        let wish_b = fx.store.seed_wish(owner_b, "mug");
        fx.store.add_wish_to_list(list_b, wish_b);

        let giver = fx.store.seed_user("giver");
        let rival = fx.store.seed_user("rival");

        let mine = fx
            .service
            .claim(claim_request(wish_a, Claimant::User { user_id: giver }))
            .await
            .expect("claim a");
        let theirs = fx
            .service
            .claim(claim_request(wish_b, Claimant::User { user_id: rival }))
            .await
            .expect("claim b");

        let actor = ReservationActor::User(giver);
        let ids = [
            mine.reservation.id,
            theirs.reservation.id,
            ReservationId::new(999_999),
        ];
        let outcome = fx
            .service
            .bulk(&actor, BulkReservationAction::Cancel, &ids, "k")
            .await
            .expect("bulk");

        assert_eq!(outcome.succeeded, vec![mine.reservation.id]);
        assert_eq!(outcome.failed.len(), 2);
        assert_eq!(outcome.total_processed(), 3);

        // The rival's reservation survived the partial failure.
        fx.service
            .release(&ReservationActor::User(rival), theirs.reservation.id)
            .await
            .expect("rival still owns their reservation");
    }

    #[tokio::test]
    async fn claims_are_rate_limited_per_key() {
        let fx = fixture();
        let owner = fx.store.seed_user("owner");
        let list = fx
            .store
            .seed_list(owner, "gifts", ListVisibility::Public, None);
        // One wish per attempt so the limiter, not the uniqueness
        // constraint, is what stops us.
        let mut wishes = Vec::new();
        for i in 0..31 {
            let wish = fx.store.seed_wish(owner, &format!("wish-{i}"));
            fx.store.add_wish_to_list(list, wish);
            wishes.push(wish);
        }

        for wish in &wishes[..30] {
            fx.service
                .claim(claim_request(*wish, anonymous("Aunt May")))
                .await
                .expect("within limit");
        }
        let throttled = fx
            .service
            .claim(claim_request(wishes[30], anonymous("Aunt May")))
            .await;
        assert!(matches!(
            throttled,
            Err(ReservationError::RateLimited { retry_after: Some(_) })
        ));
    }
}
