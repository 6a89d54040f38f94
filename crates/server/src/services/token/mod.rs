//! Access token codec.
//!
//! Three credential families share this service:
//!
//! - **Personal API tokens** (`wbx_<prefix>_<body>`): prefix stored in
//!   plaintext for display, full secret stored as a SHA-256 digest. Rows
//!   minted before the digest migration still carry a plaintext column;
//!   reads check the digest first, fall back to the legacy plaintext, and
//!   upgrade any legacy hit in place. New writes are digest-only.
//! - **List-access cookies**: an HMAC-signed map of list id to the password
//!   hash at grant time. Validation re-checks against the *current* hash, so
//!   changing a list's password invalidates that list's grants instantly
//!   without touching grants for other lists in the same cookie.
//! - **Anonymous reservation-management tokens** (`wbxr_<body>`):
//!   256 bits of randomness, digested into the reservation row; the secret
//!   is the sole credential for that one reservation.
//!
//! Session cookies (signed user id + expiry) also live here so the identity
//! middleware has one place to resolve credentials.

mod error;

pub use error::TokenError;

use std::collections::BTreeMap;
use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use moka::future::Cache;
use rand::distr::{Alphanumeric, SampleString};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use wishbox_core::{ListId, TokenDeviceType, TokenId, UserId};

use crate::models::{ApiToken, ApiTokenRecord, List, NewApiToken};
use crate::store::Store;

type HmacSha256 = Hmac<Sha256>;

/// Prefix length of a personal API token, stored in plaintext for display.
const API_TOKEN_PREFIX_LEN: usize = 8;
/// Random body length of a personal API token.
const API_TOKEN_BODY_LEN: usize = 32;
/// Random body length of a reservation management token (~256 bits of
/// alphanumeric entropy, comfortably past the 128-bit floor).
const RESERVATION_TOKEN_LEN: usize = 43;
/// Maximum token name length.
const MAX_TOKEN_NAME_LEN: usize = 64;
/// How long a prefix lookup may be served from cache.
const LOOKUP_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(60);

/// How the acting credential was presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Interactive session cookie.
    Session,
    /// Personal API token.
    ApiToken,
}

/// Outcome of validating a personal API token secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValidation {
    Valid(UserId),
    Invalid,
    Expired,
    Revoked,
}

/// Signed payload of a list-access cookie: list id -> password hash at
/// grant time.
#[derive(Debug, Default, Serialize, Deserialize)]
struct AccessGrants {
    grants: BTreeMap<i64, String>,
}

/// Stateless credential codec plus the token lookup path.
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn Store>,
    signing_key: SecretString,
    prefix_cache: Cache<String, ApiTokenRecord>,
}

impl TokenService {
    /// Create the service. `signing_key` signs session and list-access
    /// cookies.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, signing_key: SecretString) -> Self {
        Self {
            store,
            signing_key,
            prefix_cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(LOOKUP_CACHE_TTL)
                .build(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(self.signing_key.expose_secret().as_bytes())
            .expect("HMAC-SHA256 accepts keys of any length")
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn verify_signature(&self, payload: &str, signature: &str) -> bool {
        let Ok(sig_bytes) = hex::decode(signature) else {
            return false;
        };
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&sig_bytes).is_ok()
    }

    // =========================================================================
    // Personal API tokens
    // =========================================================================

    /// Mint a personal API token.
    ///
    /// Returns the stored token row and the full secret; the secret is
    /// shown once and never persisted.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::SessionRequired` unless the caller authenticated
    /// with an interactive session, and `TokenError::InvalidName` for
    /// unusable names.
    pub async fn create_api_token(
        &self,
        source: CredentialSource,
        user_id: UserId,
        name: &str,
        device_type: TokenDeviceType,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(ApiToken, String), TokenError> {
        if source != CredentialSource::Session {
            return Err(TokenError::SessionRequired);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(TokenError::InvalidName("name cannot be empty".to_owned()));
        }
        if name.len() > MAX_TOKEN_NAME_LEN {
            return Err(TokenError::InvalidName(format!(
                "name must be at most {MAX_TOKEN_NAME_LEN} characters"
            )));
        }

        let prefix = Alphanumeric
            .sample_string(&mut rand::rng(), API_TOKEN_PREFIX_LEN)
            .to_lowercase();
        let body = Alphanumeric.sample_string(&mut rand::rng(), API_TOKEN_BODY_LEN);
        let secret = format!("wbx_{prefix}_{body}");

        let token = self
            .store
            .insert_api_token(NewApiToken {
                user_id,
                name: name.to_owned(),
                device_type,
                prefix,
                digest: sha256_hex(&secret),
                expires_at,
            })
            .await?;

        Ok((token, secret))
    }

    /// Validate a personal API token secret.
    ///
    /// # Errors
    ///
    /// Store errors propagate; all credential problems are reported through
    /// [`TokenValidation`], not errors.
    pub async fn validate_api_token(&self, secret: &str) -> Result<TokenValidation, TokenError> {
        let Some(prefix) = parse_api_token_prefix(secret) else {
            return Ok(TokenValidation::Invalid);
        };

        let Some(record) = self.lookup_by_prefix(prefix).await? else {
            return Ok(TokenValidation::Invalid);
        };

        let record = if self.secret_matches(&record, secret) {
            record
        } else {
            // The cached row may predate a just-minted digest upgrade; retry
            // once against the source of truth before failing.
            self.prefix_cache.invalidate(prefix).await;
            match self.store.api_token_by_prefix(prefix).await? {
                Some(fresh) if self.secret_matches(&fresh, secret) => fresh,
                _ => return Ok(TokenValidation::Invalid),
            }
        };

        if record.token.is_revoked() {
            return Ok(TokenValidation::Revoked);
        }
        let now = Utc::now();
        if record.token.is_expired_at(now) {
            return Ok(TokenValidation::Expired);
        }

        // Upgrade legacy plaintext rows on their first successful use.
        if record.digest.is_none() {
            self.store
                .upgrade_api_token_digest(record.token.id, &sha256_hex(secret))
                .await?;
            self.prefix_cache.invalidate(prefix).await;
            tracing::info!(token_id = %record.token.id, "upgraded legacy token to digest storage");
        }

        self.store.touch_api_token(record.token.id, now).await?;
        Ok(TokenValidation::Valid(record.token.user_id))
    }

    fn secret_matches(&self, record: &ApiTokenRecord, secret: &str) -> bool {
        if let Some(digest) = &record.digest {
            return constant_time_eq(digest.as_bytes(), sha256_hex(secret).as_bytes());
        }
        record
            .legacy_secret
            .as_ref()
            .is_some_and(|legacy| constant_time_eq(legacy.as_bytes(), secret.as_bytes()))
    }

    async fn lookup_by_prefix(&self, prefix: &str) -> Result<Option<ApiTokenRecord>, TokenError> {
        if let Some(record) = self.prefix_cache.get(prefix).await {
            return Ok(Some(record));
        }
        let record = self.store.api_token_by_prefix(prefix).await?;
        if let Some(record) = &record {
            self.prefix_cache
                .insert(prefix.to_owned(), record.clone())
                .await;
        }
        Ok(record)
    }

    /// Revoke one of the user's tokens.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::NotFound` when the token does not exist or
    /// belongs to a different user (the caller cannot tell which).
    pub async fn revoke_api_token(&self, user_id: UserId, token_id: TokenId) -> Result<(), TokenError> {
        let tokens = self.store.api_tokens_for_user(user_id).await?;
        let Some(token) = tokens.iter().find(|t| t.id == token_id) else {
            return Err(TokenError::NotFound);
        };
        self.store.revoke_api_token(token_id).await?;
        self.prefix_cache.invalidate(&token.prefix).await;
        Ok(())
    }

    /// List the user's tokens (prefix only, never secret material).
    ///
    /// # Errors
    ///
    /// Store errors propagate.
    pub async fn list_api_tokens(&self, user_id: UserId) -> Result<Vec<ApiToken>, TokenError> {
        Ok(self.store.api_tokens_for_user(user_id).await?)
    }

    // =========================================================================
    // List-access cookies
    // =========================================================================

    /// Verify a list password and return an updated access cookie.
    ///
    /// The returned cookie keeps any valid grants from `existing_cookie`,
    /// so a browser can hold access to several password-protected lists at
    /// once.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::NotPasswordProtected` or
    /// `TokenError::WrongPassword`.
    pub fn grant_list_access(
        &self,
        list: &List,
        password: &str,
        existing_cookie: Option<&str>,
    ) -> Result<String, TokenError> {
        let Some(hash) = &list.password_hash else {
            return Err(TokenError::NotPasswordProtected);
        };
        if !verify_password(password, hash) {
            return Err(TokenError::WrongPassword);
        }

        let mut grants = existing_cookie
            .and_then(|cookie| self.decode_grants(cookie))
            .unwrap_or_default();
        grants.grants.insert(list.id.as_i64(), hash.clone());
        Ok(self.encode_grants(&grants))
    }

    /// Whether the cookie grants access to the list under its *current*
    /// password hash.
    #[must_use]
    pub fn has_valid_access(&self, cookie: &str, list_id: ListId, current_hash: &str) -> bool {
        self.decode_grants(cookie).is_some_and(|grants| {
            grants
                .grants
                .get(&list_id.as_i64())
                .is_some_and(|granted| constant_time_eq(granted.as_bytes(), current_hash.as_bytes()))
        })
    }

    fn encode_grants(&self, grants: &AccessGrants) -> String {
        // BTreeMap keeps serialization stable, so equal grants sign equally.
        let json = serde_json::to_vec(grants).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = self.sign(&payload);
        format!("{payload}.{signature}")
    }

    fn decode_grants(&self, cookie: &str) -> Option<AccessGrants> {
        let (payload, signature) = cookie.split_once('.')?;
        if !self.verify_signature(payload, signature) {
            return None;
        }
        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }

    // =========================================================================
    // Anonymous reservation tokens
    // =========================================================================

    /// Mint a reservation management secret and its storable digest.
    #[must_use]
    pub fn mint_reservation_secret(&self) -> (String, String) {
        let body = Alphanumeric.sample_string(&mut rand::rng(), RESERVATION_TOKEN_LEN);
        let secret = format!("wbxr_{body}");
        let digest = sha256_hex(&secret);
        (secret, digest)
    }

    /// Digest a presented reservation secret for lookup.
    #[must_use]
    pub fn digest_reservation_secret(&self, secret: &str) -> String {
        sha256_hex(secret)
    }

    // =========================================================================
    // Session cookies
    // =========================================================================

    /// Issue a signed session cookie for a user.
    #[must_use]
    pub fn issue_session(&self, user_id: UserId, ttl: chrono::Duration) -> String {
        let expires = (Utc::now() + ttl).timestamp();
        let payload = format!("{}.{expires}", user_id.as_i64());
        let signature = self.sign(&payload);
        format!("{payload}.{signature}")
    }

    /// Resolve a session cookie to a user id, if valid and unexpired.
    #[must_use]
    pub fn verify_session(&self, cookie: &str) -> Option<UserId> {
        let mut parts = cookie.splitn(3, '.');
        let user_part = parts.next()?;
        let expires_part = parts.next()?;
        let signature = parts.next()?;
        let payload = format!("{user_part}.{expires_part}");
        if !self.verify_signature(&payload, signature) {
            return None;
        }
        let expires: i64 = expires_part.parse().ok()?;
        if expires <= Utc::now().timestamp() {
            return None;
        }
        let user_id: i64 = user_part.parse().ok()?;
        Some(UserId::new(user_id))
    }
}

/// Extract the prefix from a `wbx_<prefix>_<body>` secret.
fn parse_api_token_prefix(secret: &str) -> Option<&str> {
    let rest = secret.strip_prefix("wbx_")?;
    let (prefix, body) = rest.split_once('_')?;
    if prefix.len() != API_TOKEN_PREFIX_LEN || body.is_empty() {
        return None;
    }
    Some(prefix)
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0_u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Hash a list password with argon2id.
///
/// # Errors
///
/// Returns `TokenError::Hash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, TokenError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TokenError::Hash(e.to_string()))
}

/// Verify a list password against its argon2 hash.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn service(store: &Arc<MemoryStore>) -> TokenService {
        TokenService::new(
            Arc::clone(store) as Arc<dyn Store>,
            SecretString::from("test-signing-key-with-enough-length"),
        )
    }

    #[test]
    fn parses_api_token_prefixes() {
        assert_eq!(parse_api_token_prefix("wbx_abcd1234_body"), Some("abcd1234"));
        assert_eq!(parse_api_token_prefix("wbx_short_body"), None);
        assert_eq!(parse_api_token_prefix("pat_abcd1234_body"), None);
        assert_eq!(parse_api_token_prefix("wbx_abcd1234_"), None);
    }

    #[tokio::test]
    async fn bearer_credentials_cannot_mint_tokens() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("alice");
        let tokens = service(&store);

        let denied = tokens
            .create_api_token(
                CredentialSource::ApiToken,
                user,
                "cli",
                TokenDeviceType::Script,
                None,
            )
            .await;
        assert!(matches!(denied, Err(TokenError::SessionRequired)));
    }

    #[tokio::test]
    async fn mint_and_validate_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("alice");
        let tokens = service(&store);

        let (token, secret) = tokens
            .create_api_token(
                CredentialSource::Session,
                user,
                "laptop",
                TokenDeviceType::Script,
                None,
            )
            .await
            .expect("mint");
        assert!(secret.starts_with(&format!("wbx_{}_", token.prefix)));

        assert_eq!(
            tokens.validate_api_token(&secret).await.expect("validate"),
            TokenValidation::Valid(user)
        );
        assert_eq!(
            tokens
                .validate_api_token("wbx_nosuchpp_bodybodybody")
                .await
                .expect("validate"),
            TokenValidation::Invalid
        );

        tokens.revoke_api_token(user, token.id).await.expect("revoke");
        assert_eq!(
            tokens.validate_api_token(&secret).await.expect("validate"),
            TokenValidation::Revoked
        );
    }

    #[tokio::test]
    async fn expired_tokens_report_expired() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("alice");
        let tokens = service(&store);

        let (_, secret) = tokens
            .create_api_token(
                CredentialSource::Session,
                user,
                "old",
                TokenDeviceType::Other,
                Some(Utc::now() - chrono::Duration::hours(1)),
            )
            .await
            .expect("mint");
        assert_eq!(
            tokens.validate_api_token(&secret).await.expect("validate"),
            TokenValidation::Expired
        );
    }

    #[tokio::test]
    async fn legacy_plaintext_rows_upgrade_on_first_use() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("alice");
        let tokens = service(&store);

        let secret = "wbx_legacy12_oldplaintextsecretbody";
        let id = store.seed_legacy_api_token(user, "legacy12", secret);

        assert_eq!(
            tokens.validate_api_token(secret).await.expect("validate"),
            TokenValidation::Valid(user)
        );

        let record = store.api_token_record(id).expect("record");
        assert_eq!(record.digest.as_deref(), Some(sha256_hex(secret).as_str()));
        assert!(record.legacy_secret.is_none(), "plaintext must be cleared");
    }

    #[test]
    fn session_cookie_roundtrip_and_tamper_rejection() {
        let store = Arc::new(MemoryStore::new());
        let tokens = service(&store);
        let user = UserId::new(5);

        let cookie = tokens.issue_session(user, chrono::Duration::hours(1));
        assert_eq!(tokens.verify_session(&cookie), Some(user));

        let tampered = cookie.replacen('5', "6", 1);
        assert_eq!(tokens.verify_session(&tampered), None);

        let expired = tokens.issue_session(user, chrono::Duration::hours(-1));
        assert_eq!(tokens.verify_session(&expired), None);
    }

    #[test]
    fn access_cookie_is_scoped_per_list_and_per_hash() {
        let store = Arc::new(MemoryStore::new());
        let tokens = service(&store);

        let hash_a = hash_password("open-sesame").expect("hash");
        let list_a = List {
            id: ListId::new(1),
            owner_id: UserId::new(9),
            name: "a".to_owned(),
            visibility: wishbox_core::ListVisibility::Password,
            slug: None,
            share_token: wishbox_core::ShareToken::new("t".to_owned()),
            password_hash: Some(hash_a.clone()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let cookie = tokens
            .grant_list_access(&list_a, "open-sesame", None)
            .expect("grant");
        assert!(tokens.has_valid_access(&cookie, ListId::new(1), &hash_a));
        // No grant for another list.
        assert!(!tokens.has_valid_access(&cookie, ListId::new(2), &hash_a));
        // A password change rotates the hash and kills old grants for that
        // list only.
        let new_hash = hash_password("different").expect("hash");
        assert!(!tokens.has_valid_access(&cookie, ListId::new(1), &new_hash));

        assert!(matches!(
            tokens.grant_list_access(&list_a, "wrong", Some(&cookie)),
            Err(TokenError::WrongPassword)
        ));
    }
}
