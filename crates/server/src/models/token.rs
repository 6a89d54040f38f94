//! Personal API token domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use wishbox_core::{TokenDeviceType, TokenId, UserId};

/// A personal API token, as shown to its owner.
///
/// Only the prefix is kept in plaintext for display; the full secret exists
/// client-side only after minting.
#[derive(Debug, Clone, Serialize)]
pub struct ApiToken {
    /// Unique token ID.
    pub id: TokenId,
    /// Owning user.
    pub user_id: UserId,
    /// User-assigned name (e.g. "laptop script").
    pub name: String,
    /// What kind of client this token was minted for.
    pub device_type: TokenDeviceType,
    /// Plaintext prefix for display ("wbx_ab12cd34...").
    pub prefix: String,
    /// Expiry; `None` means the token never expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the token was revoked, if it has been.
    pub revoked_at: Option<DateTime<Utc>>,
    /// When the token was minted.
    pub created_at: DateTime<Utc>,
    /// When the token last authenticated a request.
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiToken {
    /// Whether the token has passed its expiry.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Whether the token has been revoked.
    #[must_use]
    pub const fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// A token row including its secret material, as read by the validator.
///
/// `digest` is the SHA-256 of the full secret. `legacy_secret` is the
/// plaintext column from before digests were introduced; the validator
/// upgrades any legacy hit in place and new writes never populate it.
#[derive(Debug, Clone)]
pub struct ApiTokenRecord {
    /// The displayable token.
    pub token: ApiToken,
    /// Hex SHA-256 digest of the full secret.
    pub digest: Option<String>,
    /// Legacy plaintext secret, present only on rows minted before the
    /// digest migration.
    pub legacy_secret: Option<String>,
}

/// Fields needed to insert a new API token.
#[derive(Debug, Clone)]
pub struct NewApiToken {
    pub user_id: UserId,
    pub name: String,
    pub device_type: TokenDeviceType,
    pub prefix: String,
    /// Hex SHA-256 digest of the full secret. New tokens are digest-only.
    pub digest: String,
    pub expires_at: Option<DateTime<Utc>>,
}
