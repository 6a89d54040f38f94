//! Reservation handlers.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use wishbox_core::{Claimant, Email, ListId, ReservationId, ShareToken, WishId};

use crate::error::{AppError, Result};
use crate::middleware::identity::ACCESS_COOKIE;
use crate::middleware::{client_fingerprint, cookie_value, Identity, RequireUser};
use crate::models::ReservationView;
use crate::services::permission::Actor;
use crate::services::reservation::{ClaimRequest, ReservationActor};
use crate::state::AppState;
use crate::store::{BulkOutcome, BulkReservationAction};

#[derive(Debug, Deserialize)]
pub struct ClaimBody {
    /// Display name, required for anonymous claims.
    pub name: Option<String>,
    /// Contact email, required for anonymous claims.
    pub email: Option<String>,
    /// Share token from the URL the giver arrived through.
    pub share_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub reservation: ReservationView,
    /// Present for anonymous claims only; shown once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manage_token: Option<String>,
}

/// POST /api/wishes/{id}/reserve
pub async fn claim(
    State(state): State<AppState>,
    identity: Identity,
    Path(wish_id): Path<WishId>,
    headers: HeaderMap,
    Json(body): Json<ClaimBody>,
) -> Result<(StatusCode, Json<ClaimResponse>)> {
    let claimant = match identity.user_id() {
        Some(user_id) => Claimant::User { user_id },
        None => {
            let name = body
                .name
                .ok_or_else(|| AppError::Validation("name is required".to_owned()))?;
            let email = body
                .email
                .ok_or_else(|| AppError::Validation("email is required".to_owned()))?;
            let email = Email::parse(&email)
                .map_err(|err| AppError::Validation(err.to_string()))?;
            Claimant::Anonymous { name, email }
        }
    };

    let outcome = state
        .reservations()
        .claim(ClaimRequest {
            wish_id,
            claimant,
            access_cookie: cookie_value(&headers, ACCESS_COOKIE),
            share_token: body.share_token.map(ShareToken::new),
            rate_key: client_fingerprint(&identity, &headers),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ClaimResponse {
            reservation: outcome.reservation,
            manage_token: outcome.manage_secret,
        }),
    ))
}

/// GET /api/reservations/mine
pub async fn mine(
    State(state): State<AppState>,
    user: RequireUser,
) -> Result<Json<Vec<ReservationView>>> {
    Ok(Json(state.reservations().my_reservations(user.user_id).await?))
}

/// GET /api/reservations/manage/{secret}
pub async fn manage_lookup(
    State(state): State<AppState>,
    Path(secret): Path<String>,
) -> Result<Json<ReservationView>> {
    Ok(Json(state.reservations().find_by_secret(&secret).await?))
}

#[derive(Debug, Deserialize, Default)]
pub struct ManageBody {
    /// Anonymous management token; ignored for authenticated requests.
    pub manage_token: Option<String>,
}

fn reservation_actor(identity: &Identity, manage_token: Option<String>) -> Result<ReservationActor> {
    if let Some(user_id) = identity.user_id() {
        return Ok(ReservationActor::User(user_id));
    }
    manage_token
        .map(ReservationActor::AnonymousToken)
        .ok_or(AppError::Unauthorized)
}

/// DELETE /api/reservations/{id}
pub async fn release(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<ReservationId>,
    body: Option<Json<ManageBody>>,
) -> Result<StatusCode> {
    let actor = reservation_actor(&identity, body.and_then(|b| b.0.manage_token))?;
    state.reservations().release(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PurchasedBody {
    /// The date the claimant actually bought the gift; defaults to today.
    pub date: Option<NaiveDate>,
    pub manage_token: Option<String>,
}

/// POST /api/reservations/{id}/purchased
pub async fn mark_purchased(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<ReservationId>,
    Json(body): Json<PurchasedBody>,
) -> Result<Json<ReservationView>> {
    let actor = reservation_actor(&identity, body.manage_token)?;
    let date = body.date.unwrap_or_else(|| Utc::now().date_naive());
    Ok(Json(
        state.reservations().mark_purchased(&actor, id, date).await?,
    ))
}

/// DELETE /api/reservations/{id}/purchased
pub async fn unmark_purchased(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<ReservationId>,
    body: Option<Json<ManageBody>>,
) -> Result<Json<ReservationView>> {
    let actor = reservation_actor(&identity, body.and_then(|b| b.0.manage_token))?;
    Ok(Json(state.reservations().unmark_purchased(&actor, id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum BulkActionBody {
    Cancel,
    MarkPurchased { date: NaiveDate },
    UnmarkPurchased,
}

#[derive(Debug, Deserialize)]
pub struct BulkBody {
    #[serde(flatten)]
    pub action: BulkActionBody,
    pub ids: Vec<ReservationId>,
    pub manage_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    #[serde(flatten)]
    pub outcome: BulkOutcome,
    pub total_processed: usize,
}

/// POST /api/reservations/bulk
pub async fn bulk(
    State(state): State<AppState>,
    identity: Identity,
    headers: HeaderMap,
    Json(body): Json<BulkBody>,
) -> Result<Json<BulkResponse>> {
    let rate_key = client_fingerprint(&identity, &headers);
    let actor = reservation_actor(&identity, body.manage_token)?;
    let action = match body.action {
        BulkActionBody::Cancel => BulkReservationAction::Cancel,
        BulkActionBody::MarkPurchased { date } => BulkReservationAction::MarkPurchased { date },
        BulkActionBody::UnmarkPurchased => BulkReservationAction::UnmarkPurchased,
    };
    let outcome = state
        .reservations()
        .bulk(&actor, action, &body.ids, &rate_key)
        .await?;
    let total_processed = outcome.total_processed();
    Ok(Json(BulkResponse {
        outcome,
        total_processed,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusEntry {
    pub wish_id: WishId,
    pub reserved: bool,
}

/// GET /api/lists/{id}/reservation-status
///
/// Lives with the reservation handlers because its contract is theirs: the
/// response carries booleans only, never claimant identity.
pub async fn reservation_status(
    State(state): State<AppState>,
    identity: Identity,
    Path(list_id): Path<ListId>,
    headers: HeaderMap,
) -> Result<Json<Vec<StatusEntry>>> {
    let rate_key = client_fingerprint(&identity, &headers);
    let mut actor = match identity.user_id() {
        Some(user_id) => Actor::user(user_id),
        None => Actor::anonymous(),
    };
    if let Some(cookie) = cookie_value(&headers, ACCESS_COOKIE) {
        if let Some(list) = state.store().get_list(list_id).await? {
            if let Some(hash) = &list.password_hash {
                if state.tokens().has_valid_access(&cookie, list_id, hash) {
                    actor = actor.with_unlocked(list_id);
                }
            }
        }
    }

    let map = state
        .reservations()
        .list_reservation_status(&actor, list_id, &rate_key)
        .await?;
    let mut entries: Vec<StatusEntry> = map
        .into_iter()
        .map(|(wish_id, reserved)| StatusEntry { wish_id, reserved })
        .collect();
    entries.sort_by_key(|e| e.wish_id);
    Ok(Json(entries))
}
