//! Fixed-window rate limiting.
//!
//! Every public-facing mutation consults the limiter before any business
//! logic runs. Each action maps to an explicit [`RateLimitPolicy`] - window,
//! limit, and what to do when the backend itself is down. The fail mode is
//! part of the policy table, not an accident of error handling:
//! credential-adjacent actions (token minting, password attempts) fail
//! CLOSED, read-heavy lookups fail OPEN.

use std::sync::Arc;
use std::time::Duration;

use crate::store::RateLimitBackend;

/// Behavior when the rate-limit backend errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// Allow the action despite the backend error.
    Open,
    /// Deny the action until the backend recovers.
    Closed,
}

/// One action's window configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    /// Requests allowed per window.
    pub limit: u32,
    /// Window length.
    pub window: Duration,
    /// Backend-error behavior.
    pub fail_mode: FailMode,
}

/// Rate-limited action classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    /// Claiming a wish.
    ClaimWish,
    /// Bulk reservation mutations.
    BulkReservation,
    /// Minting a personal API token.
    CreateToken,
    /// Attempting a list password.
    ListPasswordAttempt,
    /// Metadata reads (reservation status maps and the like).
    MetadataLookup,
}

impl RateLimitAction {
    /// Stable key segment for the backend counter.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::ClaimWish => "claim",
            Self::BulkReservation => "bulk",
            Self::CreateToken => "token_create",
            Self::ListPasswordAttempt => "list_password",
            Self::MetadataLookup => "metadata",
        }
    }

    /// The policy table. Fail modes here are deliberate:
    /// token minting and password guessing are the brute-forceable surfaces
    /// and must not open up when the counter store is down; claims and reads
    /// prefer availability.
    #[must_use]
    pub const fn policy(self) -> RateLimitPolicy {
        const HOUR: Duration = Duration::from_secs(3600);
        match self {
            Self::ClaimWish => RateLimitPolicy {
                limit: 30,
                window: HOUR,
                fail_mode: FailMode::Open,
            },
            Self::BulkReservation => RateLimitPolicy {
                limit: 10,
                window: HOUR,
                fail_mode: FailMode::Open,
            },
            Self::CreateToken => RateLimitPolicy {
                limit: 5,
                window: HOUR,
                fail_mode: FailMode::Closed,
            },
            Self::ListPasswordAttempt => RateLimitPolicy {
                limit: 10,
                window: HOUR,
                fail_mode: FailMode::Closed,
            },
            Self::MetadataLookup => RateLimitPolicy {
                limit: 300,
                window: HOUR,
                fail_mode: FailMode::Open,
            },
        }
    }
}

/// The result of a rate-limit check.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// How long to wait before retrying, when denied.
    pub retry_after: Option<Duration>,
}

impl Decision {
    const ALLOW: Self = Self {
        allowed: true,
        retry_after: None,
    };

    const fn deny(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after: Some(retry_after),
        }
    }
}

/// Fixed-window rate limiter over an atomic counter backend.
#[derive(Clone)]
pub struct RateLimiter {
    backend: Arc<dyn RateLimitBackend>,
}

impl RateLimiter {
    /// Create a limiter over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn RateLimitBackend>) -> Self {
        Self { backend }
    }

    /// Check-and-increment the counter for `(action, identifier)`.
    ///
    /// The increment happens as a side effect of the check; the backend
    /// guarantees the two are one atomic step. Backend errors are absorbed
    /// here according to the action's fail mode and never propagate.
    pub async fn check(&self, action: RateLimitAction, identifier: &str) -> Decision {
        let policy = action.policy();
        let key = format!("{}:{identifier}", action.key());
        match self.backend.increment_and_check(&key, policy.window).await {
            Ok(window) => {
                if window.count <= policy.limit {
                    Decision::ALLOW
                } else {
                    Decision::deny(window.retry_after)
                }
            }
            Err(err) => {
                tracing::warn!(
                    action = action.key(),
                    error = %err,
                    fail_mode = ?policy.fail_mode,
                    "rate limit backend error"
                );
                match policy.fail_mode {
                    FailMode::Open => Decision::ALLOW,
                    FailMode::Closed => Decision::deny(policy.window),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn limiter(store: &Arc<MemoryStore>) -> RateLimiter {
        RateLimiter::new(Arc::clone(store) as Arc<dyn RateLimitBackend>)
    }

    #[tokio::test]
    async fn denies_after_limit_and_resets_with_window() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter(&store);

        for _ in 0..5 {
            let decision = limiter.check(RateLimitAction::CreateToken, "user-1").await;
            assert!(decision.allowed);
        }
        let denied = limiter.check(RateLimitAction::CreateToken, "user-1").await;
        assert!(!denied.allowed);
        assert!(denied.retry_after.is_some());

        // A different identifier has its own window.
        let other = limiter.check(RateLimitAction::CreateToken, "user-2").await;
        assert!(other.allowed);

        store.advance_time(Duration::from_secs(3601));
        let again = limiter.check(RateLimitAction::CreateToken, "user-1").await;
        assert!(again.allowed);
    }

    #[tokio::test]
    async fn backend_error_fails_closed_for_token_minting() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter(&store);
        store.set_rate_backend_failing(true);

        let decision = limiter.check(RateLimitAction::CreateToken, "user-1").await;
        assert!(!decision.allowed, "token minting must fail closed");
    }

    #[tokio::test]
    async fn backend_error_fails_open_for_metadata() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter(&store);
        store.set_rate_backend_failing(true);

        let decision = limiter
            .check(RateLimitAction::MetadataLookup, "203.0.113.9")
            .await;
        assert!(decision.allowed, "metadata lookups must fail open");
    }
}
