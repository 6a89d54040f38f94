//! Domain types for the server.
//!
//! These are validated domain objects, separate from database row types.

pub mod group;
pub mod list;
pub mod reservation;
pub mod token;
pub mod user;
pub mod wish;

pub use group::{Group, GroupMember};
pub use list::{List, ListWish};
pub use reservation::{Reservation, ReservationView};
pub use token::{ApiToken, ApiTokenRecord, NewApiToken};
pub use user::{User, UserEmail};
pub use wish::Wish;
