//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                                  - Health check
//!
//! # Reservations
//! POST   /api/wishes/{id}/reserve                 - Claim a wish
//! GET    /api/reservations/mine                   - My reservations (auth)
//! GET    /api/reservations/manage/{secret}        - Look up an anonymous claim
//! DELETE /api/reservations/{id}                   - Release a claim
//! POST   /api/reservations/{id}/purchased         - Mark purchased
//! DELETE /api/reservations/{id}/purchased         - Unmark purchased
//! POST   /api/reservations/bulk                   - Bulk mutation (partial success)
//!
//! # Lists
//! GET    /api/lists/{id}/reservation-status       - Owner-safe reserved map
//! POST   /api/lists/{id}/unlock                   - List password attempt
//! POST   /api/lists/{id}/slug                     - Claim vanity slug (one-time)
//! PUT    /api/lists/{id}/password                 - Set list password (owner)
//! POST   /api/lists/{id}/wishes/{wish_id}/position - Reorder a wish
//!
//! # Groups
//! PUT    /api/groups/{id}/members/{user_id}/role  - Change a member's role
//! DELETE /api/groups/{id}/members/{user_id}       - Remove a member
//! POST   /api/groups/{id}/members/bulk-remove     - Bulk removal (partial success)
//!
//! # Personal API tokens
//! GET    /api/tokens                              - List my tokens
//! POST   /api/tokens                              - Mint a token (session only)
//! DELETE /api/tokens/{id}                         - Revoke a token
//! ```
//!
//! Handlers stay thin: resolve identity, assemble the service request,
//! translate the result. Authorization lives in the services, never here.

pub mod groups;
pub mod lists;
pub mod reservations;
pub mod tokens;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::state::AppState;

/// Create the reservation routes router.
pub fn reservation_routes() -> Router<AppState> {
    Router::new()
        .route("/wishes/{id}/reserve", post(reservations::claim))
        .route("/reservations/mine", get(reservations::mine))
        .route(
            "/reservations/manage/{secret}",
            get(reservations::manage_lookup),
        )
        .route("/reservations/{id}", delete(reservations::release))
        .route(
            "/reservations/{id}/purchased",
            post(reservations::mark_purchased).delete(reservations::unmark_purchased),
        )
        .route("/reservations/bulk", post(reservations::bulk))
}

/// Create the list routes router.
pub fn list_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/lists/{id}/reservation-status",
            get(reservations::reservation_status),
        )
        .route("/lists/{id}/unlock", post(lists::unlock))
        .route("/lists/{id}/slug", post(lists::claim_slug))
        .route("/lists/{id}/password", put(lists::set_password))
        .route(
            "/lists/{id}/wishes/{wish_id}/position",
            post(lists::move_wish),
        )
}

/// Create the group routes router.
pub fn group_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/groups/{id}/members/{user_id}/role",
            put(groups::set_member_role),
        )
        .route(
            "/groups/{id}/members/{user_id}",
            delete(groups::remove_member),
        )
        .route(
            "/groups/{id}/members/bulk-remove",
            post(groups::bulk_remove_members),
        )
}

/// Create the personal API token routes router.
pub fn token_routes() -> Router<AppState> {
    Router::new()
        .route("/tokens", get(tokens::list).post(tokens::create))
        .route("/tokens/{id}", delete(tokens::revoke))
}

/// Create the full application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(reservation_routes())
        .merge(list_routes())
        .merge(group_routes())
        .merge(token_routes());

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}
