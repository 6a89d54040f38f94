//! Wish domain type.

use chrono::{DateTime, Utc};

use wishbox_core::{Price, UserId, WishId};

/// An item somebody wants, owned by exactly one user.
///
/// Independent of any list; list membership lives in
/// [`super::list::ListWish`].
#[derive(Debug, Clone)]
pub struct Wish {
    /// Unique wish ID.
    pub id: WishId,
    /// Owning user.
    pub owner_id: UserId,
    /// Short description of the item.
    pub title: String,
    /// Link to the product page, if any.
    pub url: Option<String>,
    /// Approximate price, display metadata for gift pickers.
    pub price: Option<Price>,
    /// Image URL, if any.
    pub image_url: Option<String>,
    /// When the wish was created.
    pub created_at: DateTime<Utc>,
    /// When the wish was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Wish {
    /// Whether the given user owns this wish.
    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }
}
