//! Integration tests for Wishbox.
//!
//! The tests in `tests/` exercise the full service graph (permission
//! engine, reservation engine, token codec, rate limiter) over the in-memory
//! store, so they run hermetically without `PostgreSQL`. Store-level
//! guarantees the memory implementation shares with postgres - atomic
//! claim-if-unclaimed, transactional bulk validation - are what the
//! concurrency tests lean on.
//!
//! ```bash
//! cargo test -p wishbox-integration-tests
//! ```

use std::sync::Arc;

use secrecy::SecretString;

use wishbox_server::services::group::GroupService;
use wishbox_server::services::list::ListService;
use wishbox_server::services::permission::PermissionService;
use wishbox_server::services::rate_limit::RateLimiter;
use wishbox_server::services::reservation::ReservationService;
use wishbox_server::services::token::TokenService;
use wishbox_server::store::memory::MemoryStore;
use wishbox_server::store::{RateLimitBackend, Store};

/// The full service graph over one in-memory store.
pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub tokens: Arc<TokenService>,
    pub permissions: PermissionService,
    pub reservations: ReservationService,
    pub lists: ListService,
    pub groups: GroupService,
}

impl TestEnv {
    /// Wire the services the way the server binary does, minus HTTP.
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let as_store: Arc<dyn Store> = Arc::clone(&store) as Arc<dyn Store>;
        let tokens = Arc::new(TokenService::new(
            Arc::clone(&as_store),
            SecretString::from("integration-test-signing-key-0123456789"),
        ));
        let permissions = PermissionService::new(Arc::clone(&as_store));
        let limiter = RateLimiter::new(Arc::clone(&store) as Arc<dyn RateLimitBackend>);
        let reservations = ReservationService::new(
            Arc::clone(&as_store),
            permissions.clone(),
            limiter.clone(),
            Arc::clone(&tokens),
        );
        let lists = ListService::new(
            Arc::clone(&as_store),
            permissions.clone(),
            limiter,
            Arc::clone(&tokens),
        );
        let groups = GroupService::new(as_store, permissions.clone());

        Self {
            store,
            tokens,
            permissions,
            reservations,
            lists,
            groups,
        }
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
