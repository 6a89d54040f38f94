//! Wishbox server library.
//!
//! This crate provides the wishlist service as a library, allowing it to be
//! tested and reused. The binary in `main.rs` is thin glue: configuration,
//! store construction, and router assembly.
//!
//! # Architecture
//!
//! Every guarded mutation flows through the same pipeline:
//!
//! 1. [`services::rate_limit::RateLimiter`] gate
//! 2. credential resolution ([`middleware::identity`], [`services::token`])
//! 3. [`services::permission::PermissionService`] authorization
//! 4. the engine itself, most importantly
//!    [`services::reservation::ReservationService`]
//!
//! The engines are the single enforcement point; route handlers never touch
//! the store directly for guarded mutations.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
