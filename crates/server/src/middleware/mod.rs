//! Request middleware and extractors.

pub mod identity;
pub mod request_id;

pub use identity::{client_fingerprint, cookie_value, Identity, RequireUser};
pub use request_id::request_id_middleware;
