//! Share token type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A stable, random, opaque identifier granting access to a list's shared
/// view.
///
/// Share tokens are generated once at list creation and never rotate; they
/// are capability-style URLs, not secrets tied to an account. Password-gated
/// lists still require the password on top of the share token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareToken(String);

impl ShareToken {
    /// Wrap an existing token value (e.g. read back from the database).
    #[must_use]
    pub const fn new(value: String) -> Self {
        Self(value)
    }

    /// The token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ShareToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ShareToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
