//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `WISHBOX_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`)
//! - `WISHBOX_SIGNING_KEY` - Cookie signing key (min 32 chars, high entropy)
//!
//! ## Optional
//! - `WISHBOX_HOST` - Bind address (default: 127.0.0.1)
//! - `WISHBOX_PORT` - Listen port (default: 3000)
//! - `WISHBOX_BASE_URL` - Public URL used in share links (default derived
//!   from host/port)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;

const MIN_SIGNING_KEY_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Substrings that mark a signing key as a placeholder rather than a real
/// secret (matched case-insensitively).
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct WishboxConfig {
    /// `PostgreSQL` connection URL (contains credentials)
    pub database_url: SecretString,
    /// Bind address
    pub host: IpAddr,
    /// Listen port
    pub port: u16,
    /// Public base URL used when rendering share links
    pub base_url: String,
    /// Signing key for session and list-access cookies
    pub signing_key: SecretString,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl WishboxConfig {
    /// Load configuration from the environment, reading `.env` first when
    /// one is present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a required variable is missing or
    /// malformed, or when the signing key looks like a placeholder or has
    /// too little entropy.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        // Managed postgres attach sets the generic name, so accept both.
        let database_url = std::env::var("WISHBOX_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .map(SecretString::from)
            .map_err(|_| ConfigError::MissingEnvVar("WISHBOX_DATABASE_URL".to_owned()))?;

        let host: IpAddr = parse_env("WISHBOX_HOST", "127.0.0.1")?;
        let port: u16 = parse_env("WISHBOX_PORT", "3000")?;
        let base_url =
            env_opt("WISHBOX_BASE_URL").unwrap_or_else(|| format!("http://{host}:{port}"));
        let signing_key = signing_key_from_env("WISHBOX_SIGNING_KEY")?;
        let sentry_dsn = env_opt("SENTRY_DSN");

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            signing_key,
            sentry_dsn,
        })
    }

    /// The socket address the server binds to.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .unwrap_or_else(|_| default.to_owned())
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_owned(), e.to_string()))
}

/// Shannon entropy in bits per character.
#[allow(clippy::cast_precision_loss)] // key lengths are far below f64 precision
fn shannon_entropy(s: &str) -> f64 {
    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }
    let len = s.chars().count() as f64;
    freq.values().fold(0.0, |acc, &count| {
        let p = count as f64 / len;
        acc - p * p.log2()
    })
}

/// Load the signing key, rejecting short, placeholder, and low-entropy
/// values. A key that fails here would undermine every cookie the server
/// signs.
fn signing_key_from_env(key: &str) -> Result<SecretString, ConfigError> {
    let value = std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_owned()))?;

    if value.len() < MIN_SIGNING_KEY_LENGTH {
        return Err(ConfigError::InsecureSecret(
            key.to_owned(),
            format!(
                "must be at least {MIN_SIGNING_KEY_LENGTH} characters (got {})",
                value.len()
            ),
        ));
    }
    reject_weak_secret(&value, key)?;
    Ok(SecretString::from(value))
}

fn reject_weak_secret(value: &str, key: &str) -> Result<(), ConfigError> {
    let lower = value.to_lowercase();
    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(**p)) {
        return Err(ConfigError::InsecureSecret(
            key.to_owned(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    // Randomly generated keys land well above this floor.
    let entropy = shannon_entropy(value);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            key.to_owned(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= \
                 {MIN_ENTROPY_BITS_PER_CHAR:.1}); generate the key randomly"
            ),
        ));
    }
    Ok(())
}
