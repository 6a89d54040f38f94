//! List domain types.

use chrono::{DateTime, Utc};

use wishbox_core::{DisplayLevel, ListId, ListVisibility, ShareToken, Slug, UserId, WishId};

/// A named collection of wishes owned by exactly one user.
#[derive(Debug, Clone)]
pub struct List {
    /// Unique list ID.
    pub id: ListId,
    /// Owning user.
    pub owner_id: UserId,
    /// Display name.
    pub name: String,
    /// Who can see this list.
    pub visibility: ListVisibility,
    /// Vanity URL segment, unique per owner, settable once.
    pub slug: Option<Slug>,
    /// Stable random token for the shared view URL.
    pub share_token: ShareToken,
    /// Argon2 hash, present exactly when `visibility` is `Password`.
    pub password_hash: Option<String>,
    /// When the list was created.
    pub created_at: DateTime<Utc>,
    /// When the list was last updated.
    pub updated_at: DateTime<Utc>,
}

impl List {
    /// Whether the given user owns this list.
    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }
}

/// Association of a wish with a list, carrying per-list metadata.
///
/// A wish exists independently of any list and may appear in several lists
/// with different display levels and positions.
#[derive(Debug, Clone)]
pub struct ListWish {
    /// The list.
    pub list_id: ListId,
    /// The wish.
    pub wish_id: WishId,
    /// When the wish was added to this list.
    pub added_at: DateTime<Utc>,
    /// How prominently the wish is shown in this list.
    pub display_level: DisplayLevel,
    /// Fractional-indexing sort key; ordered as a plain byte string.
    pub sort_key: String,
    /// Last modification of this association, used for optimistic
    /// concurrency on reorders.
    pub updated_at: DateTime<Utc>,
}
