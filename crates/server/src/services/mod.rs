//! Service layer.
//!
//! Services are constructed once at process start (see
//! [`crate::state::AppState`]) and passed by reference; there is no
//! module-level singleton anywhere in the authorization or reservation
//! paths.

pub mod group;
pub mod list;
pub mod permission;
pub mod rate_limit;
pub mod reservation;
pub mod token;
