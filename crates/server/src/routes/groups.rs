//! Group membership handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use wishbox_core::{GroupId, GroupRole, UserId};

use crate::error::Result;
use crate::middleware::RequireUser;
use crate::services::group::MemberRemovalOutcome;
use crate::services::permission::Actor;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RoleBody {
    pub role: GroupRole,
}

/// PUT /api/groups/{id}/members/{user_id}/role
pub async fn set_member_role(
    State(state): State<AppState>,
    user: RequireUser,
    Path((group_id, target)): Path<(GroupId, UserId)>,
    Json(body): Json<RoleBody>,
) -> Result<StatusCode> {
    state
        .groups()
        .set_member_role(&Actor::user(user.user_id), group_id, target, body.role)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/groups/{id}/members/{user_id}
pub async fn remove_member(
    State(state): State<AppState>,
    user: RequireUser,
    Path((group_id, target)): Path<(GroupId, UserId)>,
) -> Result<StatusCode> {
    state
        .groups()
        .remove_member(&Actor::user(user.user_id), group_id, target)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct BulkRemoveBody {
    pub user_ids: Vec<UserId>,
}

/// POST /api/groups/{id}/members/bulk-remove
pub async fn bulk_remove_members(
    State(state): State<AppState>,
    user: RequireUser,
    Path(group_id): Path<GroupId>,
    Json(body): Json<BulkRemoveBody>,
) -> Result<Json<MemberRemovalOutcome>> {
    Ok(Json(
        state
            .groups()
            .remove_members(&Actor::user(user.user_id), group_id, &body.user_ids)
            .await?,
    ))
}
