//! The closed resource and action unions used by the permission engine.
//!
//! Resources are a closed enum rather than a string tag so that adding a new
//! resource kind forces every authorization match arm to be revisited at
//! compile time.

use serde::{Deserialize, Serialize};

use super::id::{GroupId, ListId, UserId, WishId};

/// A resource a permission check can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Resource {
    List(ListId),
    Group(GroupId),
    Wish(WishId),
}

impl Resource {
    /// Human-readable kind label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::List(_) => "list",
            Self::Group(_) => "group",
            Self::Wish(_) => "wish",
        }
    }
}

/// An action a permission check can be asked about.
///
/// Not every action applies to every resource kind; asking for an
/// inapplicable pair is a deny, never a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Read the resource.
    View,
    /// Mutate the resource's own fields.
    Edit,
    /// Delete the resource.
    Delete,
    /// Send invitations (list admins, group members per policy).
    Invite,
    /// Transfer list ownership. Owner only.
    TransferOwnership,
    /// Share a list into a group.
    Share,
    /// Add or remove group members, or change their roles. The target is
    /// carried so the engine can refuse self-directed privilege changes.
    ManageMembers {
        /// The member whose membership is being changed.
        target: UserId,
    },
    /// Attach or detach lists shared into a group.
    ManageLists,
    /// Reserve a wish.
    Reserve,
}

impl Action {
    /// Whether a denial of this action may reveal that the resource exists.
    ///
    /// `View` denials must be indistinguishable from the resource not
    /// existing; everything else is only reached once view access is settled.
    #[must_use]
    pub const fn is_view(&self) -> bool {
        matches!(self, Self::View)
    }
}
