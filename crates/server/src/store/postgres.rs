//! `PostgreSQL` implementation of the store contracts.
//!
//! Uniqueness-backed operations map constraint violations to
//! [`StoreError::Conflict`]; bulk mutations run in one transaction with a
//! bounded `statement_timeout` so a stuck lock surfaces as the retryable
//! [`StoreError::Timeout`] instead of a hung request.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use wishbox_core::{
    Claimant, Currency, DisplayLevel, Email, GroupId, GroupInvitePolicy, GroupRole, ListId,
    ListVisibility, Price, ReservationId, ShareToken, Slug, TokenDeviceType, TokenId, UserId,
    WishId,
};

use crate::models::{
    ApiToken, ApiTokenRecord, Group, List, ListWish, NewApiToken, Reservation, User, Wish,
};

use super::{
    BulkFailure, BulkFailureReason, BulkOutcome, BulkReservationAction, NewReservation,
    RateLimitBackend, ReservationOwnerKey, Store, StoreError, WindowCount,
};

/// Statement timeout for claim and bulk transactions.
const TRANSACTION_TIMEOUT_MS: u32 = 5_000;

/// Postgres error code for `query_canceled` (raised by statement_timeout).
const QUERY_CANCELED: &str = "57014";

/// `PostgreSQL`-backed [`Store`] and [`RateLimitBackend`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_db_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some(QUERY_CANCELED) {
            return StoreError::Timeout;
        }
        if db_err.is_unique_violation() {
            return StoreError::Conflict("unique constraint violated".to_owned());
        }
    }
    StoreError::Database(e)
}

fn corrupt(what: impl std::fmt::Display) -> StoreError {
    StoreError::DataCorruption(what.to_string())
}

// ----- row types -----

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    display_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: UserId::new(r.id),
            display_name: r.display_name,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct WishRow {
    id: i64,
    owner_id: i64,
    title: String,
    url: Option<String>,
    price_amount: Option<Decimal>,
    price_currency: Option<String>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WishRow {
    fn into_domain(self) -> Result<Wish, StoreError> {
        let price = match (self.price_amount, self.price_currency) {
            (Some(amount), Some(code)) => {
                let currency = Currency::from_code(&code)
                    .ok_or_else(|| corrupt(format!("unknown currency in database: {code}")))?;
                Some(Price::new(amount, currency))
            }
            (None, None) => None,
            _ => return Err(corrupt("price amount and currency must be set together")),
        };
        Ok(Wish {
            id: WishId::new(self.id),
            owner_id: UserId::new(self.owner_id),
            title: self.title,
            url: self.url,
            price,
            image_url: self.image_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ListRow {
    id: i64,
    owner_id: i64,
    name: String,
    visibility: String,
    slug: Option<String>,
    share_token: String,
    password_hash: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ListRow {
    fn into_domain(self) -> Result<List, StoreError> {
        let visibility = ListVisibility::from_str(&self.visibility).map_err(corrupt)?;
        let slug = self
            .slug
            .as_deref()
            .map(Slug::parse)
            .transpose()
            .map_err(|e| corrupt(format!("invalid slug in database: {e}")))?;
        Ok(List {
            id: ListId::new(self.id),
            owner_id: UserId::new(self.owner_id),
            name: self.name,
            visibility,
            slug,
            share_token: ShareToken::new(self.share_token),
            password_hash: self.password_hash,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ListWishRow {
    list_id: i64,
    wish_id: i64,
    added_at: DateTime<Utc>,
    display_level: String,
    sort_key: String,
    updated_at: DateTime<Utc>,
}

impl ListWishRow {
    fn into_domain(self) -> Result<ListWish, StoreError> {
        Ok(ListWish {
            list_id: ListId::new(self.list_id),
            wish_id: WishId::new(self.wish_id),
            added_at: self.added_at,
            display_level: DisplayLevel::from_str(&self.display_level).map_err(corrupt)?,
            sort_key: self.sort_key,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: i64,
    name: String,
    invite_policy: String,
    created_at: DateTime<Utc>,
}

impl GroupRow {
    fn into_domain(self) -> Result<Group, StoreError> {
        Ok(Group {
            id: GroupId::new(self.id),
            name: self.name,
            invite_policy: GroupInvitePolicy::from_str(&self.invite_policy).map_err(corrupt)?,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: i64,
    wish_id: i64,
    claimant_user_id: Option<i64>,
    anonymous_name: Option<String>,
    anonymous_email: Option<String>,
    manage_token_digest: Option<String>,
    reserved_at: DateTime<Utc>,
    purchased_at: Option<DateTime<Utc>>,
    purchased_date: Option<NaiveDate>,
    reminder_sent_at: Option<DateTime<Utc>>,
}

impl ReservationRow {
    fn into_domain(self) -> Result<Reservation, StoreError> {
        let claimant = match (self.claimant_user_id, self.anonymous_name, self.anonymous_email)
        {
            (Some(user_id), None, None) => Claimant::User {
                user_id: UserId::new(user_id),
            },
            (None, Some(name), Some(email)) => Claimant::Anonymous {
                name,
                email: Email::parse(&email)
                    .map_err(|e| corrupt(format!("invalid email in database: {e}")))?,
            },
            _ => {
                return Err(corrupt(
                    "reservation claimant must be a user XOR an anonymous name/email pair",
                ));
            }
        };
        Ok(Reservation {
            id: ReservationId::new(self.id),
            wish_id: WishId::new(self.wish_id),
            claimant,
            manage_token_digest: self.manage_token_digest,
            reserved_at: self.reserved_at,
            purchased_at: self.purchased_at,
            purchased_date: self.purchased_date,
            reminder_sent_at: self.reminder_sent_at,
        })
    }
}

const RESERVATION_COLUMNS: &str = "id, wish_id, claimant_user_id, anonymous_name, \
     anonymous_email, manage_token_digest, reserved_at, purchased_at, purchased_date, \
     reminder_sent_at";

#[derive(sqlx::FromRow)]
struct ApiTokenRow {
    id: i64,
    user_id: i64,
    name: String,
    device_type: String,
    prefix: String,
    secret_digest: Option<String>,
    legacy_secret: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl ApiTokenRow {
    fn into_domain(self) -> Result<ApiTokenRecord, StoreError> {
        Ok(ApiTokenRecord {
            token: ApiToken {
                id: TokenId::new(self.id),
                user_id: UserId::new(self.user_id),
                name: self.name,
                device_type: TokenDeviceType::from_str(&self.device_type).map_err(corrupt)?,
                prefix: self.prefix,
                expires_at: self.expires_at,
                revoked_at: self.revoked_at,
                created_at: self.created_at,
                last_used_at: self.last_used_at,
            },
            digest: self.secret_digest,
            legacy_secret: self.legacy_secret,
        })
    }
}

const API_TOKEN_COLUMNS: &str = "id, user_id, name, device_type, prefix, secret_digest, \
     legacy_secret, expires_at, revoked_at, created_at, last_used_at";

fn claimant_columns(claimant: &Claimant) -> (Option<i64>, Option<String>, Option<String>) {
    match claimant {
        Claimant::User { user_id } => (Some(user_id.as_i64()), None, None),
        Claimant::Anonymous { name, email } => {
            (None, Some(name.clone()), Some(email.as_str().to_owned()))
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, display_name, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(row.map(User::from))
    }

    async fn get_wish(&self, id: WishId) -> Result<Option<Wish>, StoreError> {
        let row = sqlx::query_as::<_, WishRow>(
            "SELECT id, owner_id, title, url, price_amount, price_currency, image_url, \
             created_at, updated_at FROM wishes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        row.map(WishRow::into_domain).transpose()
    }

    async fn lists_containing_wish(&self, id: WishId) -> Result<Vec<List>, StoreError> {
        let rows = sqlx::query_as::<_, ListRow>(
            "SELECT l.id, l.owner_id, l.name, l.visibility, l.slug, l.share_token, \
             l.password_hash, l.created_at, l.updated_at \
             FROM lists l JOIN list_wishes lw ON lw.list_id = l.id \
             WHERE lw.wish_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        rows.into_iter().map(ListRow::into_domain).collect()
    }

    async fn get_list(&self, id: ListId) -> Result<Option<List>, StoreError> {
        let row = sqlx::query_as::<_, ListRow>(
            "SELECT id, owner_id, name, visibility, slug, share_token, password_hash, \
             created_at, updated_at FROM lists WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        row.map(ListRow::into_domain).transpose()
    }

    async fn list_admin_ids(&self, id: ListId) -> Result<Vec<UserId>, StoreError> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT user_id FROM list_admins WHERE list_id = $1")
                .bind(id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_db_err)?;
        Ok(ids.into_iter().map(UserId::new).collect())
    }

    async fn list_group_ids(&self, id: ListId) -> Result<Vec<GroupId>, StoreError> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT group_id FROM list_group_shares WHERE list_id = $1")
                .bind(id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_db_err)?;
        Ok(ids.into_iter().map(GroupId::new).collect())
    }

    async fn list_wishes(&self, id: ListId) -> Result<Vec<ListWish>, StoreError> {
        let rows = sqlx::query_as::<_, ListWishRow>(
            "SELECT list_id, wish_id, added_at, display_level, sort_key, updated_at \
             FROM list_wishes WHERE list_id = $1 ORDER BY sort_key",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        rows.into_iter().map(ListWishRow::into_domain).collect()
    }

    async fn claim_slug(&self, id: ListId, slug: &Slug) -> Result<(), StoreError> {
        // Slug is one-time-settable: the WHERE clause refuses a second set,
        // the (owner_id, slug) unique index refuses a taken slug.
        let result = sqlx::query(
            "UPDATE lists SET slug = $2, updated_at = now() WHERE id = $1 AND slug IS NULL",
        )
        .bind(id)
        .bind(slug.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| match map_db_err(e) {
            StoreError::Conflict(_) => StoreError::Conflict("slug taken".to_owned()),
            other => other,
        })?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict("slug already set".to_owned()));
        }
        Ok(())
    }

    async fn set_list_password(&self, id: ListId, password_hash: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE lists SET password_hash = $2, visibility = 'password', \
             updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn update_list_wish_sort(
        &self,
        list_id: ListId,
        wish_id: WishId,
        sort_key: &str,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE list_wishes SET sort_key = $3, updated_at = now() \
             WHERE list_id = $1 AND wish_id = $2 AND updated_at = $4",
        )
        .bind(list_id)
        .bind(wish_id)
        .bind(sort_key)
        .bind(expected_updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(
                "sort order changed concurrently".to_owned(),
            ));
        }
        Ok(())
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>, StoreError> {
        let row = sqlx::query_as::<_, GroupRow>(
            "SELECT id, name, invite_policy, created_at FROM gift_groups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        row.map(GroupRow::into_domain).transpose()
    }

    async fn group_role(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<Option<GroupRole>, StoreError> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM group_members WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        role.as_deref()
            .map(|r| GroupRole::from_str(r).map_err(corrupt))
            .transpose()
    }

    async fn set_group_role(
        &self,
        group_id: GroupId,
        user_id: UserId,
        role: GroupRole,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE group_members SET role = $3 WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict("not a member".to_owned()));
        }
        Ok(())
    }

    async fn remove_group_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn create_reservation_if_unclaimed(
        &self,
        new: NewReservation,
    ) -> Result<Reservation, StoreError> {
        let (user_id, anon_name, anon_email) = claimant_columns(&new.claimant);
        // ON CONFLICT (wish_id) DO NOTHING: concurrent claims resolve at the
        // unique index, never as two rows and never as an error 500.
        let sql = format!(
            "INSERT INTO reservations \
             (wish_id, claimant_user_id, anonymous_name, anonymous_email, manage_token_digest) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (wish_id) DO NOTHING \
             RETURNING {RESERVATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(new.wish_id)
            .bind(user_id)
            .bind(anon_name)
            .bind(anon_email)
            .bind(new.manage_token_digest)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
        match row {
            Some(row) => row.into_domain(),
            None => Err(StoreError::Conflict("wish already reserved".to_owned())),
        }
    }

    async fn get_reservation(
        &self,
        id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError> {
        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1");
        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
        row.map(ReservationRow::into_domain).transpose()
    }

    async fn delete_reservation(&self, id: ReservationId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn set_reservation_purchased(
        &self,
        id: ReservationId,
        purchased_at: Option<DateTime<Utc>>,
        purchased_date: Option<NaiveDate>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE reservations SET purchased_at = $2, purchased_date = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(purchased_at)
        .bind(purchased_date)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn reservations_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Reservation>, StoreError> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE claimant_user_id = $1 ORDER BY reserved_at DESC"
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
        rows.into_iter().map(ReservationRow::into_domain).collect()
    }

    async fn reservation_by_token_digest(
        &self,
        digest: &str,
    ) -> Result<Option<Reservation>, StoreError> {
        let sql =
            format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE manage_token_digest = $1");
        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(digest)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
        row.map(ReservationRow::into_domain).transpose()
    }

    async fn reserved_wish_flags(
        &self,
        list_id: ListId,
    ) -> Result<HashMap<WishId, bool>, StoreError> {
        let rows: Vec<(i64, bool)> = sqlx::query_as(
            "SELECT lw.wish_id, (r.id IS NOT NULL) AS reserved \
             FROM list_wishes lw \
             LEFT JOIN reservations r ON r.wish_id = lw.wish_id \
             WHERE lw.list_id = $1",
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(rows
            .into_iter()
            .map(|(wish_id, reserved)| (WishId::new(wish_id), reserved))
            .collect())
    }

    async fn bulk_mutate_reservations(
        &self,
        action: BulkReservationAction,
        ids: &[ReservationId],
        owner: ReservationOwnerKey,
    ) -> Result<BulkOutcome, StoreError> {
        let raw_ids: Vec<i64> = ids.iter().map(|id| id.as_i64()).collect();

        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {TRANSACTION_TIMEOUT_MS}"
        ))
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        // Lock every named row so validation and mutation see one snapshot.
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = ANY($1) FOR UPDATE"
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(&raw_ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_db_err)?;
        let mut by_id: HashMap<ReservationId, Reservation> = HashMap::new();
        for row in rows {
            let reservation = row.into_domain()?;
            by_id.insert(reservation.id, reservation);
        }

        let mut outcome = BulkOutcome::default();
        for &id in ids {
            let Some(reservation) = by_id.get(&id) else {
                outcome.failed.push(BulkFailure {
                    id,
                    reason: BulkFailureReason::NotFound,
                });
                continue;
            };
            if !owner.owns(reservation) {
                outcome.failed.push(BulkFailure {
                    id,
                    reason: BulkFailureReason::NotOwned,
                });
                continue;
            }
            match action {
                BulkReservationAction::Cancel => {
                    sqlx::query("DELETE FROM reservations WHERE id = $1")
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .map_err(map_db_err)?;
                    outcome.succeeded.push(id);
                }
                BulkReservationAction::MarkPurchased { date } => {
                    // Idempotent: rows already purchased keep their stamp.
                    sqlx::query(
                        "UPDATE reservations SET purchased_at = now(), purchased_date = $2 \
                         WHERE id = $1 AND purchased_at IS NULL",
                    )
                    .bind(id)
                    .bind(date)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_db_err)?;
                    outcome.succeeded.push(id);
                }
                BulkReservationAction::UnmarkPurchased => {
                    if reservation.purchased_at.is_none() {
                        outcome.failed.push(BulkFailure {
                            id,
                            reason: BulkFailureReason::InvalidState,
                        });
                        continue;
                    }
                    sqlx::query(
                        "UPDATE reservations SET purchased_at = NULL, purchased_date = NULL \
                         WHERE id = $1",
                    )
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_db_err)?;
                    outcome.succeeded.push(id);
                }
            }
        }

        tx.commit().await.map_err(map_db_err)?;
        Ok(outcome)
    }

    async fn insert_api_token(&self, new: NewApiToken) -> Result<ApiToken, StoreError> {
        let sql = format!(
            "INSERT INTO api_tokens (user_id, name, device_type, prefix, secret_digest, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {API_TOKEN_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ApiTokenRow>(&sql)
            .bind(new.user_id)
            .bind(&new.name)
            .bind(new.device_type.as_str())
            .bind(&new.prefix)
            .bind(&new.digest)
            .bind(new.expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(row.into_domain()?.token)
    }

    async fn api_token_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<ApiTokenRecord>, StoreError> {
        let sql = format!("SELECT {API_TOKEN_COLUMNS} FROM api_tokens WHERE prefix = $1");
        let row = sqlx::query_as::<_, ApiTokenRow>(&sql)
            .bind(prefix)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
        row.map(ApiTokenRow::into_domain).transpose()
    }

    async fn upgrade_api_token_digest(
        &self,
        id: TokenId,
        digest: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE api_tokens SET secret_digest = $2, legacy_secret = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(digest)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn revoke_api_token(&self, id: TokenId) -> Result<(), StoreError> {
        sqlx::query("UPDATE api_tokens SET revoked_at = now() WHERE id = $1 AND revoked_at IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn api_tokens_for_user(&self, user_id: UserId) -> Result<Vec<ApiToken>, StoreError> {
        let sql = format!(
            "SELECT {API_TOKEN_COLUMNS} FROM api_tokens WHERE user_id = $1 ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, ApiTokenRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
        rows.into_iter()
            .map(|row| row.into_domain().map(|record| record.token))
            .collect()
    }

    async fn touch_api_token(
        &self,
        id: TokenId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE api_tokens SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }
}

#[async_trait]
impl RateLimitBackend for PgStore {
    async fn increment_and_check(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<WindowCount, StoreError> {
        // Single upsert = atomic check-and-increment; an expired window is
        // restarted in the same statement.
        let row: (i64, i64) = sqlx::query_as(
            "INSERT INTO rate_limit_windows (key, window_started, count) \
             VALUES ($1, now(), 1) \
             ON CONFLICT (key) DO UPDATE SET \
               count = CASE WHEN rate_limit_windows.window_started \
                                 <= now() - make_interval(secs => $2) \
                            THEN 1 ELSE rate_limit_windows.count + 1 END, \
               window_started = CASE WHEN rate_limit_windows.window_started \
                                          <= now() - make_interval(secs => $2) \
                                     THEN now() ELSE rate_limit_windows.window_started END \
             RETURNING count, \
               GREATEST(CEIL(EXTRACT(EPOCH FROM \
                 (window_started + make_interval(secs => $2) - now()))), 0)::bigint",
        )
        .bind(key)
        .bind(window.as_secs_f64())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match map_db_err(e) {
            StoreError::Database(inner) => StoreError::Unavailable(inner.to_string()),
            other => other,
        })?;
        let (count, retry_secs) = row;
        Ok(WindowCount {
            count: u32::try_from(count).unwrap_or(u32::MAX),
            retry_after: Duration::from_secs(u64::try_from(retry_secs).unwrap_or(0)),
        })
    }
}
