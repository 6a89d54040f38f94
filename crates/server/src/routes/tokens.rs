//! Personal API token handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wishbox_core::{TokenDeviceType, TokenId};

use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::ApiToken;
use crate::services::rate_limit::RateLimitAction;
use crate::state::AppState;

/// GET /api/tokens
pub async fn list(
    State(state): State<AppState>,
    user: RequireUser,
) -> Result<Json<Vec<ApiToken>>> {
    Ok(Json(state.tokens().list_api_tokens(user.user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
    pub name: String,
    #[serde(default)]
    pub device_type: TokenDeviceType,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    #[serde(flatten)]
    pub token: ApiToken,
    /// The full secret; shown exactly once.
    pub secret: String,
}

/// POST /api/tokens
///
/// Session-only: the service refuses API-token callers, and minting is
/// fail-closed rate limited on top.
pub async fn create(
    State(state): State<AppState>,
    user: RequireUser,
    Json(body): Json<CreateBody>,
) -> Result<(StatusCode, Json<CreateResponse>)> {
    let rate_key = format!("user:{}", user.user_id);
    let decision = state
        .limiter()
        .check(RateLimitAction::CreateToken, &rate_key)
        .await;
    if !decision.allowed {
        return Err(AppError::RateLimited {
            retry_after: decision.retry_after,
        });
    }

    let (token, secret) = state
        .tokens()
        .create_api_token(
            user.source,
            user.user_id,
            &body.name,
            body.device_type,
            body.expires_at,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateResponse { token, secret }),
    ))
}

/// DELETE /api/tokens/{id}
pub async fn revoke(
    State(state): State<AppState>,
    user: RequireUser,
    Path(id): Path<TokenId>,
) -> Result<StatusCode> {
    state.tokens().revoke_api_token(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
