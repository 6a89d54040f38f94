//! Wishbox Core - Shared types library.
//!
//! This crate provides common types used across all Wishbox components:
//! - `server` - The wishlist API service
//! - `cli` - Command-line tools for migrations and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and small pure helpers - no I/O, no
//! database access, no HTTP clients. This keeps it lightweight and allows it
//! to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, slugs, prices,
//!   statuses, and the authorization resource/claimant unions
//! - [`sort_key`] - Fractional-indexing sort keys for list ordering

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod sort_key;
pub mod types;

pub use types::*;
