//! Group membership management.
//!
//! Role changes and removals go through `Action::ManageMembers { target }`,
//! which carries the target user so the permission engine can refuse
//! self-directed privilege changes by admins.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use wishbox_core::{Action, GroupId, GroupRole, Resource, UserId};

use crate::services::permission::{Actor, PermissionError, PermissionService};
use crate::store::{Store, StoreError};

/// Errors from group operations.
#[derive(Debug, Error)]
pub enum GroupError {
    /// The group or member does not exist, or the actor may not know
    /// whether it does.
    #[error("not found")]
    NotFound,

    /// The actor can see the group but may not perform the action.
    #[error("forbidden")]
    Forbidden,

    /// The request failed input validation.
    #[error("{0}")]
    Validation(String),

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PermissionError> for GroupError {
    fn from(err: PermissionError) -> Self {
        match err {
            PermissionError::NotFound => Self::NotFound,
            PermissionError::Forbidden => Self::Forbidden,
            PermissionError::Store(err) => Self::Store(err),
        }
    }
}

/// Why a member failed within a bulk removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberFailureReason {
    /// Not a member of the group.
    NotAMember,
    /// The permission engine refused (self-removal by an admin included).
    Forbidden,
}

/// A single failed user within a bulk removal.
#[derive(Debug, Clone, Serialize)]
pub struct MemberFailure {
    pub user_id: UserId,
    pub reason: MemberFailureReason,
}

/// Partial-success report of a bulk member removal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemberRemovalOutcome {
    pub succeeded: Vec<UserId>,
    pub failed: Vec<MemberFailure>,
}

/// Group mutations behind the permission engine.
#[derive(Clone)]
pub struct GroupService {
    store: Arc<dyn Store>,
    permissions: PermissionService,
}

impl GroupService {
    /// Create the service over its collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, permissions: PermissionService) -> Self {
        Self { store, permissions }
    }

    /// Change a member's role.
    ///
    /// # Errors
    ///
    /// `Forbidden` includes an admin targeting themselves; `NotFound` for
    /// non-members.
    pub async fn set_member_role(
        &self,
        actor: &Actor,
        group_id: GroupId,
        target: UserId,
        role: GroupRole,
    ) -> Result<(), GroupError> {
        self.permissions
            .require(actor, Action::ManageMembers { target }, Resource::Group(group_id))
            .await?;
        if self.store.group_role(group_id, target).await?.is_none() {
            return Err(GroupError::NotFound);
        }
        self.store.set_group_role(group_id, target, role).await?;
        tracing::info!(group_id = %group_id, target = %target, role = role.as_str(), "group role changed");
        Ok(())
    }

    /// Remove a member from a group.
    ///
    /// # Errors
    ///
    /// Same shape as [`Self::set_member_role`].
    pub async fn remove_member(
        &self,
        actor: &Actor,
        group_id: GroupId,
        target: UserId,
    ) -> Result<(), GroupError> {
        self.permissions
            .require(actor, Action::ManageMembers { target }, Resource::Group(group_id))
            .await?;
        if self.store.group_role(group_id, target).await?.is_none() {
            return Err(GroupError::NotFound);
        }
        self.store.remove_group_member(group_id, target).await?;
        tracing::info!(group_id = %group_id, target = %target, "group member removed");
        Ok(())
    }

    /// Remove several members at once, reporting per-user success.
    ///
    /// Each target gets its own permission check, so a batch that includes
    /// the acting admin removes everyone else and reports the self-entry
    /// as failed.
    ///
    /// # Errors
    ///
    /// `Validation` on an empty batch; store errors abort the whole call.
    pub async fn remove_members(
        &self,
        actor: &Actor,
        group_id: GroupId,
        targets: &[UserId],
    ) -> Result<MemberRemovalOutcome, GroupError> {
        if targets.is_empty() {
            return Err(GroupError::Validation(
                "at least one member is required".to_owned(),
            ));
        }
        // The group itself must be visible to the actor before any per-target
        // work leaks partial results.
        self.permissions
            .require(actor, Action::View, Resource::Group(group_id))
            .await?;

        let mut outcome = MemberRemovalOutcome::default();
        for &target in targets {
            match self.remove_member(actor, group_id, target).await {
                Ok(()) => outcome.succeeded.push(target),
                Err(GroupError::NotFound) => outcome.failed.push(MemberFailure {
                    user_id: target,
                    reason: MemberFailureReason::NotAMember,
                }),
                Err(GroupError::Forbidden) => outcome.failed.push(MemberFailure {
                    user_id: target,
                    reason: MemberFailureReason::Forbidden,
                }),
                Err(err) => return Err(err),
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wishbox_core::GroupInvitePolicy;

    use crate::store::memory::MemoryStore;

    fn service(store: &Arc<MemoryStore>) -> GroupService {
        let as_store: Arc<dyn Store> = Arc::clone(store) as Arc<dyn Store>;
        GroupService::new(Arc::clone(&as_store), PermissionService::new(as_store))
    }

    #[tokio::test]
    async fn admin_manages_others_not_self() {
        let store = Arc::new(MemoryStore::new());
        let admin = store.seed_user("admin");
        let member = store.seed_user("member");
        let group = store.seed_group("family", GroupInvitePolicy::AdminsOnly);
        store.add_group_member(group, admin, GroupRole::Admin);
        store.add_group_member(group, member, GroupRole::Member);
        let groups = service(&store);

        let actor = Actor::user(admin);
        groups
            .set_member_role(&actor, group, member, GroupRole::Admin)
            .await
            .expect("promote member");

        let denied = groups
            .set_member_role(&actor, group, admin, GroupRole::Member)
            .await;
        assert!(matches!(denied, Err(GroupError::Forbidden)));

        let denied = groups.remove_member(&actor, group, admin).await;
        assert!(matches!(denied, Err(GroupError::Forbidden)));
    }

    #[tokio::test]
    async fn member_cannot_manage_members() {
        let store = Arc::new(MemoryStore::new());
        let admin = store.seed_user("admin");
        let member = store.seed_user("member");
        let group = store.seed_group("family", GroupInvitePolicy::AdminsOnly);
        store.add_group_member(group, admin, GroupRole::Admin);
        store.add_group_member(group, member, GroupRole::Member);
        let groups = service(&store);

        let denied = groups
            .remove_member(&Actor::user(member), group, admin)
            .await;
        assert!(matches!(denied, Err(GroupError::Forbidden)));
    }

    #[tokio::test]
    async fn bulk_removal_skips_self_and_reports_it() {
        let store = Arc::new(MemoryStore::new());
        let admin = store.seed_user("admin");
        let a = store.seed_user("a");
        let b = store.seed_user("b");
        let outsider = store.seed_user("outsider");
        let group = store.seed_group("family", GroupInvitePolicy::AdminsOnly);
        store.add_group_member(group, admin, GroupRole::Admin);
        store.add_group_member(group, a, GroupRole::Member);
        store.add_group_member(group, b, GroupRole::Member);
        let groups = service(&store);

        let outcome = groups
            .remove_members(&Actor::user(admin), group, &[a, admin, b, outsider])
            .await
            .expect("bulk removal");

        assert_eq!(outcome.succeeded, vec![a, b]);
        assert_eq!(outcome.failed.len(), 2);
        assert!(outcome
            .failed
            .iter()
            .any(|f| f.user_id == admin && f.reason == MemberFailureReason::Forbidden));
        assert!(outcome
            .failed
            .iter()
            .any(|f| f.user_id == outsider && f.reason == MemberFailureReason::NotAMember));

        // The acting admin is still in the group.
        assert_eq!(
            store.group_role(group, admin).await.expect("store"),
            Some(GroupRole::Admin)
        );
    }
}
