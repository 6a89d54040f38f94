//! List management: vanity slugs, password protection, unlocking, and
//! wish ordering.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use wishbox_core::{sort_key, Action, ListId, Resource, Slug, SlugError, WishId};

use crate::services::permission::{Actor, PermissionError, PermissionService};
use crate::services::rate_limit::{RateLimitAction, RateLimiter};
use crate::services::token::{self, TokenError, TokenService};
use crate::store::{Store, StoreError};

/// Minimum list password length. Short passwords on a brute-forceable
/// endpoint are not worth storing.
const MIN_PASSWORD_LEN: usize = 6;

/// Errors from list operations.
#[derive(Debug, Error)]
pub enum ListError {
    /// The list does not exist, or the actor may not know whether it does.
    #[error("not found")]
    NotFound,

    /// The actor can see the list but may not perform the action.
    #[error("forbidden")]
    Forbidden,

    /// A concurrent edit won; the caller should refetch and retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request failed input validation.
    #[error("{0}")]
    Validation(String),

    /// The supplied list password did not match.
    #[error("wrong password")]
    WrongPassword,

    /// The actor exceeded a rate limit.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PermissionError> for ListError {
    fn from(err: PermissionError) -> Self {
        match err {
            PermissionError::NotFound => Self::NotFound,
            PermissionError::Forbidden => Self::Forbidden,
            PermissionError::Store(err) => Self::Store(err),
        }
    }
}

impl From<SlugError> for ListError {
    fn from(err: SlugError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// List mutations behind the permission engine.
#[derive(Clone)]
pub struct ListService {
    store: Arc<dyn Store>,
    permissions: PermissionService,
    limiter: RateLimiter,
    tokens: Arc<TokenService>,
}

impl ListService {
    /// Create the service over its collaborators.
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

    /// Claim a vanity slug for a list. One-time-settable.
    ///
    /// # Errors
    ///
    /// `Validation` for malformed or reserved slugs; `Conflict` when the
    /// slug is taken within the owner's namespace or the list already has
    /// one; the usual permission errors.
    pub async fn claim_slug(
        &self,
        actor: &Actor,
        list_id: ListId,
        raw_slug: &str,
    ) -> Result<Slug, ListError> {
        self.permissions
            .require(actor, Action::Edit, Resource::List(list_id))
            .await?;
        let slug = Slug::parse(raw_slug)?;
        self.store
            .claim_slug(list_id, &slug)
            .await
            .map_err(|err| match err {
                StoreError::Conflict(msg) => ListError::Conflict(msg),
                other => ListError::Store(other),
            })?;
        tracing::info!(list_id = %list_id, slug = %slug, "slug claimed");
        Ok(slug)
    }

    /// Password-protect a list, replacing any previous password.
    ///
    /// Changing the password invalidates every outstanding access cookie:
    /// cookies bind to the hash at grant time and are revalidated against
    /// the current hash.
    ///
    /// # Errors
    ///
    /// `Validation` for short passwords; only the owner may do this, so
    /// admins get `Forbidden`.
    pub async fn set_password(
        &self,
        actor: &Actor,
        list_id: ListId,
        password: &str,
    ) -> Result<(), ListError> {
        // Protection scope is an ownership decision, like visibility.
        self.permissions
            .require(actor, Action::TransferOwnership, Resource::List(list_id))
            .await?;
        if password.len() < MIN_PASSWORD_LEN {
            return Err(ListError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let hash = token::hash_password(password)
            .map_err(|err| ListError::Validation(err.to_string()))?;
        self.store.set_list_password(list_id, &hash).await?;
        tracing::info!(list_id = %list_id, "list password set");
        Ok(())
    }

    /// Attempt a list password; on success returns an updated access
    /// cookie value for the client to store.
    ///
    /// Fails closed when the rate-limit backend is down: this is the
    /// brute-forceable surface.
    ///
    /// # Errors
    ///
    /// `RateLimited`, `WrongPassword`, `NotFound` for unknown lists.
    /// Attempting to unlock a list that is not password-protected is
    /// `Validation` only when the actor can already view the list;
    /// otherwise it is `NotFound`, indistinguishable from a missing id.
    pub async fn unlock(
        &self,
        actor: &Actor,
        list_id: ListId,
        password: &str,
        existing_cookie: Option<&str>,
        rate_key: &str,
    ) -> Result<String, ListError> {
        let decision = self
            .limiter
            .check(RateLimitAction::ListPasswordAttempt, rate_key)
            .await;
        if !decision.allowed {
            return Err(ListError::RateLimited {
                retry_after: decision.retry_after,
            });
        }

        let Some(list) = self.store.get_list(list_id).await? else {
            return Err(ListError::NotFound);
        };
        match self.tokens.grant_list_access(&list, password, existing_cookie) {
            Ok(cookie) => Ok(cookie),
            Err(TokenError::WrongPassword) => Err(ListError::WrongPassword),
            Err(TokenError::NotPasswordProtected) => {
                if self
                    .permissions
                    .can(actor, Action::View, Resource::List(list_id))
                    .await?
                {
                    Err(ListError::Validation(
                        "list is not password-protected".to_owned(),
                    ))
                } else {
                    Err(ListError::NotFound)
                }
            }
            Err(err) => Err(ListError::Validation(err.to_string())),
        }
    }

    /// Move a wish between two neighbors in a list.
    ///
    /// The new position is a fractional sort key between the neighbors, so
    /// a reorder touches exactly one row. `expected_updated_at` is the
    /// association timestamp the client last saw; a mismatch means a
    /// concurrent reorder won and comes back as `Conflict` instead of a
    /// silent overwrite.
    ///
    /// # Errors
    ///
    /// `NotFound` when the wish is not in the list, `Validation` for
    /// out-of-order neighbors, `Conflict` on a stale timestamp.
    pub async fn move_wish(
        &self,
        actor: &Actor,
        list_id: ListId,
        wish_id: WishId,
        after: Option<WishId>,
        before: Option<WishId>,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<String, ListError> {
        self.permissions
            .require(actor, Action::Edit, Resource::List(list_id))
            .await?;

        let entries = self.store.list_wishes(list_id).await?;
        if !entries.iter().any(|e| e.wish_id == wish_id) {
            return Err(ListError::NotFound);
        }
        let key_of = |id: Option<WishId>| -> Result<Option<String>, ListError> {
            match id {
                None => Ok(None),
                Some(id) => entries
                    .iter()
                    .find(|e| e.wish_id == id)
                    .map(|e| Some(e.sort_key.clone()))
                    .ok_or(ListError::NotFound),
            }
        };
        let low = key_of(after)?;
        let high = key_of(before)?;
        let sort_key = sort_key::between(low.as_deref(), high.as_deref())
            .map_err(|err| ListError::Validation(err.to_string()))?;

        self.store
            .update_list_wish_sort(list_id, wish_id, &sort_key, expected_updated_at)
            .await
            .map_err(|err| match err {
                StoreError::Conflict(msg) => ListError::Conflict(msg),
                other => ListError::Store(other),
            })?;
        Ok(sort_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wishbox_core::{ListVisibility, UserId};

    use crate::store::memory::MemoryStore;
    use crate::store::RateLimitBackend;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: ListService,
        tokens: Arc<TokenService>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let as_store: Arc<dyn Store> = Arc::clone(&store) as Arc<dyn Store>;
        let tokens = Arc::new(TokenService::new(
            Arc::clone(&as_store),
            SecretString::from("test-signing-key-with-enough-entropy"),
        ));
        let service = ListService::new(
            Arc::clone(&as_store),
            PermissionService::new(Arc::clone(&as_store)),
            RateLimiter::new(Arc::clone(&store) as Arc<dyn RateLimitBackend>),
            Arc::clone(&tokens),
        );
        Fixture {
            store,
            service,
            tokens,
        }
    }

    fn seeded_list(store: &MemoryStore) -> (UserId, ListId) {
        let owner = store.seed_user("owner");
        let list = store.seed_list(owner, "gifts", ListVisibility::Private, None);
        (owner, list)
    }

    #[tokio::test]
    async fn slug_is_one_time_settable() {
        let fx = fixture();
        let (owner, list) = seeded_list(&fx.store);
        let actor = Actor::user(owner);

        let slug = fx
            .service
            .claim_slug(&actor, list, "birthday-2026")
            .await
            .expect("first claim");
        assert_eq!(slug.as_str(), "birthday-2026");

        let again = fx.service.claim_slug(&actor, list, "other-slug").await;
        assert!(matches!(again, Err(ListError::Conflict(_))));
    }

    #[tokio::test]
    async fn reserved_slug_is_rejected() {
        let fx = fixture();
        let (owner, list) = seeded_list(&fx.store);

        let result = fx
            .service
            .claim_slug(&Actor::user(owner), list, "admin")
            .await;
        assert!(matches!(result, Err(ListError::Validation(_))));
    }

    #[tokio::test]
    async fn admin_cannot_set_password() {
        let fx = fixture();
        let (owner, list) = seeded_list(&fx.store);
        let admin = fx.store.seed_user("admin");
        fx.store.add_list_admin(list, admin);

        let denied = fx
            .service
            .set_password(&Actor::user(admin), list, "hunter22")
            .await;
        assert!(matches!(denied, Err(ListError::Forbidden)));

        fx.service
            .set_password(&Actor::user(owner), list, "hunter22")
            .await
            .expect("owner sets password");
    }

    #[tokio::test]
    async fn unlock_grants_cookie_and_password_change_revokes_it() {
        let fx = fixture();
        let (owner, list) = seeded_list(&fx.store);
        fx.service
            .set_password(&Actor::user(owner), list, "hunter22")
            .await
            .expect("set password");

        let guest = Actor::anonymous();
        let wrong = fx.service.unlock(&guest, list, "wrong", None, "client").await;
        assert!(matches!(wrong, Err(ListError::WrongPassword)));

        let cookie = fx
            .service
            .unlock(&guest, list, "hunter22", None, "client")
            .await
            .expect("unlock");
        let hash = fx
            .store
            .get_list(list)
            .await
            .expect("store")
            .and_then(|l| l.password_hash)
            .expect("hash present");
        assert!(fx.tokens.has_valid_access(&cookie, list, &hash));

        fx.service
            .set_password(&Actor::user(owner), list, "newpassword")
            .await
            .expect("rotate password");
        let new_hash = fx
            .store
            .get_list(list)
            .await
            .expect("store")
            .and_then(|l| l.password_hash)
            .expect("hash present");
        assert!(!fx.tokens.has_valid_access(&cookie, list, &new_hash));
    }

    #[tokio::test]
    async fn password_attempts_are_rate_limited() {
        let fx = fixture();
        let (owner, list) = seeded_list(&fx.store);
        fx.service
            .set_password(&Actor::user(owner), list, "hunter22")
            .await
            .expect("set password");

        let guest = Actor::anonymous();
        for _ in 0..10 {
            let _ = fx
                .service
                .unlock(&guest, list, "wrong", None, "attacker")
                .await;
        }
        let throttled = fx
            .service
            .unlock(&guest, list, "hunter22", None, "attacker")
            .await;
        assert!(matches!(throttled, Err(ListError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn unlocking_an_unprotected_list_looks_missing_to_strangers() {
        let fx = fixture();
        let (owner, list) = seeded_list(&fx.store);

        let guest = Actor::anonymous();
        let on_existing = fx
            .service
            .unlock(&guest, list, "anything", None, "client")
            .await;
        let on_missing = fx
            .service
            .unlock(&guest, ListId::new(999_999), "anything", None, "client")
            .await;
        assert!(matches!(on_existing, Err(ListError::NotFound)));
        assert!(matches!(on_missing, Err(ListError::NotFound)));

        // The owner can see the list, so they get told what is actually
        // wrong with the request.
        let as_owner = fx
            .service
            .unlock(&Actor::user(owner), list, "anything", None, "client")
            .await;
        assert!(matches!(as_owner, Err(ListError::Validation(_))));
    }

    #[tokio::test]
    async fn move_wish_places_between_neighbors() {
        let fx = fixture();
        let (owner, list) = seeded_list(&fx.store);
        let actor = Actor::user(owner);
        let a = fx.store.seed_wish(owner, "a");
        let b = fx.store.seed_wish(owner, "b");
        let c = fx.store.seed_wish(owner, "c");
        for wish in [a, b, c] {
            fx.store.add_wish_to_list(list, wish);
        }

        let entry = fx.store.list_wish(list, c).expect("association");
        let new_key = fx
            .service
            .move_wish(&actor, list, c, None, Some(a), entry.updated_at)
            .await
            .expect("move c before a");

        let a_key = fx.store.list_wish(list, a).expect("entry").sort_key;
        assert!(new_key < a_key);
    }

    #[tokio::test]
    async fn stale_reorder_conflicts() {
        let fx = fixture();
        let (owner, list) = seeded_list(&fx.store);
        let actor = Actor::user(owner);
        let a = fx.store.seed_wish(owner, "a");
        let b = fx.store.seed_wish(owner, "b");
        fx.store.add_wish_to_list(list, a);
        fx.store.add_wish_to_list(list, b);

        let stale = fx.store.list_wish(list, b).expect("entry").updated_at;
        fx.service
            .move_wish(&actor, list, b, None, Some(a), stale)
            .await
            .expect("first move");

        // Second client still holds the old timestamp.
        let conflict = fx
            .service
            .move_wish(&actor, list, b, Some(a), None, stale)
            .await;
        assert!(matches!(conflict, Err(ListError::Conflict(_))));
    }
}
