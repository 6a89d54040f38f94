//! Application state shared across handlers.
//!
//! Every service is constructed exactly once here and handed its
//! collaborators explicitly. Handlers receive the whole graph through the
//! axum state extractor; nothing reaches for a global.

use std::sync::Arc;

use crate::config::WishboxConfig;
use crate::services::group::GroupService;
use crate::services::list::ListService;
use crate::services::permission::PermissionService;
use crate::services::rate_limit::RateLimiter;
use crate::services::reservation::ReservationService;
use crate::services::token::TokenService;
use crate::store::{RateLimitBackend, Store};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: WishboxConfig,
    store: Arc<dyn Store>,
    tokens: Arc<TokenService>,
    permissions: PermissionService,
    limiter: RateLimiter,
    reservations: ReservationService,
    lists: ListService,
    groups: GroupService,
}

impl AppState {
    /// Wire the full service graph over one store and one rate-limit
    /// backend.
    ///
    /// The store and the backend are usually the same object (the postgres
    /// store implements both traits); taking them separately keeps tests
    /// free to split them.
    #[must_use]
    pub fn new(
        config: WishboxConfig,
        store: Arc<dyn Store>,
        rate_backend: Arc<dyn RateLimitBackend>,
    ) -> Self {
        let tokens = Arc::new(TokenService::new(
            Arc::clone(&store),
            config.signing_key.clone(),
        ));
        let permissions = PermissionService::new(Arc::clone(&store));
        let limiter = RateLimiter::new(rate_backend);
        let reservations = ReservationService::new(
            Arc::clone(&store),
            permissions.clone(),
            limiter.clone(),
            Arc::clone(&tokens),
        );
        let lists = ListService::new(
            Arc::clone(&store),
            permissions.clone(),
            limiter.clone(),
            Arc::clone(&tokens),
        );
        let groups = GroupService::new(Arc::clone(&store), permissions.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                tokens,
                permissions,
                limiter,
                reservations,
                lists,
                groups,
            }),
        }
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &WishboxConfig {
        &self.inner.config
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    /// Get a reference to the token service.
    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.inner.tokens
    }

    /// Get a reference to the permission engine.
    #[must_use]
    pub fn permissions(&self) -> &PermissionService {
        &self.inner.permissions
    }

    /// Get a reference to the rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    /// Get a reference to the reservation engine.
    #[must_use]
    pub fn reservations(&self) -> &ReservationService {
        &self.inner.reservations
    }

    /// Get a reference to the list service.
    #[must_use]
    pub fn lists(&self) -> &ListService {
        &self.inner.lists
    }

    /// Get a reference to the group service.
    #[must_use]
    pub fn groups(&self) -> &GroupService {
        &self.inner.groups
    }
}
