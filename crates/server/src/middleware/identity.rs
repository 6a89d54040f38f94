//! Identity resolution and extractors.
//!
//! Requests authenticate one of two ways: a `Bearer wbx_...` personal API
//! token in `Authorization`, or the signed `wishbox_session` cookie.
//! Everything else is anonymous, which is a first-class identity here -
//! anonymous gift-givers claim wishes too.

use std::net::IpAddr;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use wishbox_core::UserId;

use crate::error::AppError;
use crate::services::token::{CredentialSource, TokenValidation};
use crate::state::AppState;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "wishbox_session";

/// List-access cookie name (signed grants for password-protected lists).
pub const ACCESS_COOKIE: &str = "wishbox_list_access";

/// The resolved identity of a request.
#[derive(Debug, Clone)]
pub enum Identity {
    /// An authenticated user and how they authenticated. The source matters
    /// downstream: some operations are session-only.
    User {
        user_id: UserId,
        source: CredentialSource,
    },
    /// No credentials, or credentials that failed validation.
    Anonymous,
}

impl Identity {
    /// The user id, when authenticated.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User { user_id, .. } => Some(*user_id),
            Self::Anonymous => None,
        }
    }
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Bearer token first: API clients send both headers and cookies,
        // and the explicit credential wins.
        if let Some(secret) = bearer_token(&parts.headers) {
            return match state.tokens().validate_api_token(secret).await? {
                TokenValidation::Valid(user_id) => Ok(Self::User {
                    user_id,
                    source: CredentialSource::ApiToken,
                }),
                // An invalid credential is a hard failure, not a fallthrough
                // to anonymous; silently downgrading would mask expired
                // tokens as permission errors.
                TokenValidation::Invalid | TokenValidation::Expired | TokenValidation::Revoked => {
                    Err(AppError::Unauthorized)
                }
            };
        }

        if let Some(cookie) = cookie_value(&parts.headers, SESSION_COOKIE) {
            if let Some(user_id) = state.tokens().verify_session(&cookie) {
                return Ok(Self::User {
                    user_id,
                    source: CredentialSource::Session,
                });
            }
        }

        Ok(Self::Anonymous)
    }
}

/// Extractor that rejects unauthenticated requests with 401.
pub struct RequireUser {
    pub user_id: UserId,
    pub source: CredentialSource,
}

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match Identity::from_request_parts(parts, state).await? {
            Identity::User { user_id, source } => Ok(Self { user_id, source }),
            Identity::Anonymous => Err(AppError::Unauthorized),
        }
    }
}

/// The rate-limit identifier for a request: the user id when
/// authenticated, otherwise the client IP resolved from proxy headers.
#[must_use]
pub fn client_fingerprint(identity: &Identity, headers: &HeaderMap) -> String {
    match identity.user_id() {
        Some(user_id) => format!("user:{user_id}"),
        None => match client_ip(headers) {
            Some(ip) => format!("ip:{ip}"),
            None => "anon".to_owned(),
        },
    }
}

/// Real client IP behind Cloudflare and Fly.io proxies.
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    // CF-Connecting-IP is the Cloudflare-verified client address.
    if let Some(ip) = header_ip(headers, "cf-connecting-ip") {
        return Some(ip);
    }
    // X-Forwarded-For: first IP in the chain.
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
    {
        return Some(ip);
    }
    if let Some(ip) = header_ip(headers, "x-real-ip") {
        return Some(ip);
    }
    header_ip(headers, "fly-client-ip")
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|v| v.starts_with("wbx_"))
}

/// Extract a named cookie from the `Cookie` header.
#[must_use]
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_parsing_handles_multiple_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=1; wishbox_session=42.99.sig; bar=2"),
        );
        assert_eq!(
            cookie_value(&headers, SESSION_COOKIE).as_deref(),
            Some("42.99.sig")
        );
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn bearer_extraction_requires_token_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer wbx_abcd1234_body"),
        );
        assert_eq!(bearer_token(&headers), Some("wbx_abcd1234_body"));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer something-else"),
        );
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn client_ip_prefers_cloudflare_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.7, 10.0.0.1"),
        );
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(
            client_ip(&headers),
            Some("203.0.113.9".parse().expect("ip"))
        );

        headers.remove("cf-connecting-ip");
        assert_eq!(
            client_ip(&headers),
            Some("198.51.100.7".parse().expect("ip"))
        );
    }
}
