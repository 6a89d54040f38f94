//! Core types for Wishbox.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod claimant;
pub mod email;
pub mod id;
pub mod price;
pub mod resource;
pub mod slug;
pub mod status;
pub mod token;

pub use claimant::Claimant;
pub use email::{Email, EmailError};
pub use id::*;
pub use price::{Currency, Price};
pub use resource::{Action, Resource};
pub use slug::{Slug, SlugError};
pub use status::*;
pub use token::ShareToken;
