//! Group domain types.
//!
//! Groups exist here only as a permission-scoping boundary: lists can be
//! shared into a group, and membership grants view access.

use chrono::{DateTime, Utc};

use wishbox_core::{GroupId, GroupInvitePolicy, GroupRole, UserId};

/// A named collection of users.
#[derive(Debug, Clone)]
pub struct Group {
    /// Unique group ID.
    pub id: GroupId,
    /// Display name.
    pub name: String,
    /// Who may send invitations.
    pub invite_policy: GroupInvitePolicy,
    /// When the group was created.
    pub created_at: DateTime<Utc>,
}

/// A user's membership in a group.
#[derive(Debug, Clone)]
pub struct GroupMember {
    /// The group.
    pub group_id: GroupId,
    /// The member.
    pub user_id: UserId,
    /// Admin or plain member.
    pub role: GroupRole,
    /// When the user joined.
    pub joined_at: DateTime<Utc>,
}
