//! List management handlers.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use wishbox_core::{ListId, WishId};

use crate::error::Result;
use crate::middleware::identity::ACCESS_COOKIE;
use crate::middleware::{client_fingerprint, cookie_value, Identity, RequireUser};
use crate::services::permission::Actor;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SlugBody {
    pub slug: String,
}

/// POST /api/lists/{id}/slug
pub async fn claim_slug(
    State(state): State<AppState>,
    user: RequireUser,
    Path(list_id): Path<ListId>,
    Json(body): Json<SlugBody>,
) -> Result<Json<serde_json::Value>> {
    let slug = state
        .lists()
        .claim_slug(&Actor::user(user.user_id), list_id, &body.slug)
        .await?;
    Ok(Json(json!({ "slug": slug })))
}

#[derive(Debug, Deserialize)]
pub struct PasswordBody {
    pub password: String,
}

/// PUT /api/lists/{id}/password
pub async fn set_password(
    State(state): State<AppState>,
    user: RequireUser,
    Path(list_id): Path<ListId>,
    Json(body): Json<PasswordBody>,
) -> Result<StatusCode> {
    state
        .lists()
        .set_password(&Actor::user(user.user_id), list_id, &body.password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/lists/{id}/unlock
///
/// On success the updated access cookie rides back on `Set-Cookie`; grants
/// for other lists the client already held are merged in, not replaced.
pub async fn unlock(
    State(state): State<AppState>,
    identity: Identity,
    Path(list_id): Path<ListId>,
    headers: HeaderMap,
    Json(body): Json<PasswordBody>,
) -> Result<Response> {
    let rate_key = client_fingerprint(&identity, &headers);
    let existing = cookie_value(&headers, ACCESS_COOKIE);
    let actor = match identity.user_id() {
        Some(user_id) => Actor::user(user_id),
        None => Actor::anonymous(),
    };
    let cookie = state
        .lists()
        .unlock(&actor, list_id, &body.password, existing.as_deref(), &rate_key)
        .await?;

    let set_cookie = format!(
        "{ACCESS_COOKIE}={cookie}; Path=/; HttpOnly; SameSite=Lax; Secure"
    );
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, set_cookie)],
        Json(json!({ "unlocked": true })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct MoveBody {
    /// The wish to land after (toward the top when absent).
    pub after: Option<WishId>,
    /// The wish to land before (toward the bottom when absent).
    pub before: Option<WishId>,
    /// The association timestamp the client last saw.
    pub expected_updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MoveResponse {
    pub sort_key: String,
}

/// POST /api/lists/{id}/wishes/{wish_id}/position
pub async fn move_wish(
    State(state): State<AppState>,
    user: RequireUser,
    Path((list_id, wish_id)): Path<(ListId, WishId)>,
    Json(body): Json<MoveBody>,
) -> Result<Json<MoveResponse>> {
    let sort_key = state
        .lists()
        .move_wish(
            &Actor::user(user.user_id),
            list_id,
            wish_id,
            body.after,
            body.before,
            body.expected_updated_at,
        )
        .await?;
    Ok(Json(MoveResponse { sort_key }))
}
