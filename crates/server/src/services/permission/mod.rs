//! The permission engine.
//!
//! Every mutation on a list, group, or wish passes through [`PermissionService::require`]
//! before any write happens. Resources are a closed enum
//! ([`wishbox_core::Resource`]) matched exhaustively, so a new resource kind
//! cannot silently skip authorization.
//!
//! Leak prevention is a hard contract here: a resource that does not exist
//! and a resource the actor may not view produce the same `NotFound`
//! error. A caller probing ids learns nothing from the error shape.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use wishbox_core::{Action, GroupInvitePolicy, GroupRole, ListId, Resource, UserId};

use crate::models::List;
use crate::store::{Store, StoreError};

/// Errors from permission checks.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// The resource does not exist, or the actor may not know whether it
    /// does. Indistinguishable by contract.
    #[error("not found")]
    NotFound,

    /// The actor can see the resource but may not perform the action.
    #[error("forbidden")]
    Forbidden,

    /// Store error during fact resolution.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The identity a permission check runs against.
///
/// `unlocked_lists` carries per-request capability grants resolved by the
/// token codec before the check: lists opened via a valid share token or a
/// valid password-access cookie.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    /// Authenticated user, if any.
    pub user_id: Option<UserId>,
    /// Lists unlocked for this request via share token or password cookie.
    pub unlocked_lists: HashSet<ListId>,
}

impl Actor {
    /// An authenticated actor.
    #[must_use]
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            unlocked_lists: HashSet::new(),
        }
    }

    /// An unauthenticated actor with no grants.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Add an unlocked list grant.
    #[must_use]
    pub fn with_unlocked(mut self, list_id: ListId) -> Self {
        self.unlocked_lists.insert(list_id);
        self
    }
}

/// What an evaluation concluded.
enum Decision {
    Allow,
    /// Denied; `can_view` decides whether the caller learns the resource
    /// exists (`Forbidden`) or not (`NotFound`).
    Deny { can_view: bool },
}

/// Capability checks over the closed resource union.
#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn Store>,
}

impl PermissionService {
    /// Create the engine over a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Require that `actor` may perform `action` on `resource`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the resource is missing or the actor may not view
    /// it; `Forbidden` when the actor can view it but the action is denied;
    /// store errors propagate.
    pub async fn require(
        &self,
        actor: &Actor,
        action: Action,
        resource: Resource,
    ) -> Result<(), PermissionError> {
        match self.evaluate(actor, action, resource).await? {
            Decision::Allow => Ok(()),
            Decision::Deny { can_view: true } => Err(PermissionError::Forbidden),
            Decision::Deny { can_view: false } => Err(PermissionError::NotFound),
        }
    }

    /// Non-throwing variant of [`Self::require`] for conditional logic.
    ///
    /// # Errors
    ///
    /// Only store errors propagate; denials come back as `false`.
    pub async fn can(
        &self,
        actor: &Actor,
        action: Action,
        resource: Resource,
    ) -> Result<bool, PermissionError> {
        match self.require(actor, action, resource).await {
            Ok(()) => Ok(true),
            Err(PermissionError::NotFound | PermissionError::Forbidden) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn evaluate(
        &self,
        actor: &Actor,
        action: Action,
        resource: Resource,
    ) -> Result<Decision, PermissionError> {
        // Closed union: adding a resource kind will not compile until it is
        // handled here.
        match resource {
            Resource::List(list_id) => self.evaluate_list(actor, action, list_id).await,
            Resource::Group(group_id) => {
                let Some(group) = self.store.get_group(group_id).await? else {
                    return Ok(Decision::Deny { can_view: false });
                };
                let role = match actor.user_id {
                    Some(user_id) => self.store.group_role(group_id, user_id).await?,
                    None => None,
                };
                Ok(evaluate_group(actor, action, group.invite_policy, role))
            }
            Resource::Wish(wish_id) => {
                let Some(wish) = self.store.get_wish(wish_id).await? else {
                    return Ok(Decision::Deny { can_view: false });
                };
                if actor.user_id == Some(wish.owner_id) {
                    return Ok(match action {
                        Action::View | Action::Edit | Action::Delete => Decision::Allow,
                        // Self-reservation is a business rule, not an
                        // authorization accident: the owner always gets an
                        // explicit Forbidden, never a reservation.
                        Action::Reserve => Decision::Deny { can_view: true },
                        Action::Invite
                        | Action::TransferOwnership
                        | Action::Share
                        | Action::ManageMembers { .. }
                        | Action::ManageLists => Decision::Deny { can_view: true },
                    });
                }
                // Non-owners reach a wish through a list they can view.
                let mut can_view = false;
                for list in self.store.lists_containing_wish(wish_id).await? {
                    if self.can_view_list(actor, &list).await? {
                        can_view = true;
                        break;
                    }
                }
                if !can_view {
                    return Ok(Decision::Deny { can_view: false });
                }
                Ok(match action {
                    Action::View | Action::Reserve => Decision::Allow,
                    _ => Decision::Deny { can_view: true },
                })
            }
        }
    }

    async fn evaluate_list(
        &self,
        actor: &Actor,
        action: Action,
        list_id: ListId,
    ) -> Result<Decision, PermissionError> {
        let Some(list) = self.store.get_list(list_id).await? else {
            return Ok(Decision::Deny { can_view: false });
        };

        if actor.user_id == Some(list.owner_id) {
            return Ok(Decision::Allow);
        }

        let is_admin = match actor.user_id {
            Some(user_id) => self.store.list_admin_ids(list_id).await?.contains(&user_id),
            None => false,
        };
        if is_admin {
            return Ok(match action {
                // Co-editors run the list but cannot destroy it, hand it
                // over, or widen its audience.
                Action::View | Action::Edit | Action::Invite => Decision::Allow,
                _ => Decision::Deny { can_view: true },
            });
        }

        if self.can_view_list(actor, &list).await? {
            return Ok(match action {
                Action::View => Decision::Allow,
                _ => Decision::Deny { can_view: true },
            });
        }
        Ok(Decision::Deny { can_view: false })
    }

    /// View access to a list: owner, admin, group member via share, public
    /// visibility, or a per-request unlock grant.
    async fn can_view_list(&self, actor: &Actor, list: &List) -> Result<bool, PermissionError> {
        if actor.user_id == Some(list.owner_id) {
            return Ok(true);
        }
        if matches!(list.visibility, wishbox_core::ListVisibility::Public) {
            return Ok(true);
        }
        if actor.unlocked_lists.contains(&list.id) {
            return Ok(true);
        }
        if let Some(user_id) = actor.user_id {
            if self.store.list_admin_ids(list.id).await?.contains(&user_id) {
                return Ok(true);
            }
            for group_id in self.store.list_group_ids(list.id).await? {
                if self.store.group_role(group_id, user_id).await?.is_some() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

fn evaluate_group(
    actor: &Actor,
    action: Action,
    invite_policy: GroupInvitePolicy,
    role: Option<GroupRole>,
) -> Decision {
    let Some(role) = role else {
        // Non-members cannot learn the group exists.
        return Decision::Deny { can_view: false };
    };
    match role {
        GroupRole::Admin => match action {
            Action::ManageMembers { target } => {
                // An admin may never operate on their own admin privileges;
                // demotion and removal of self go through another admin.
                if actor.user_id == Some(target) {
                    Decision::Deny { can_view: true }
                } else {
                    Decision::Allow
                }
            }
            Action::View
            | Action::Edit
            | Action::Invite
            | Action::ManageLists
            | Action::Delete => Decision::Allow,
            Action::TransferOwnership | Action::Share | Action::Reserve => {
                Decision::Deny { can_view: true }
            }
        },
        GroupRole::Member => match action {
            Action::View => Decision::Allow,
            Action::Invite if invite_policy == GroupInvitePolicy::AllMembers => Decision::Allow,
            _ => Decision::Deny { can_view: true },
        },
    }
}
