//! Status enums for lists, groups, and tokens.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Who can see a list.
///
/// `Password` lists additionally carry an argon2 password hash; the store
/// guarantees the hash is present exactly when this is `Password`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListVisibility {
    #[default]
    Private,
    Public,
    Password,
}

impl ListVisibility {
    /// Stable string form used in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
            Self::Password => "password",
        }
    }
}

impl fmt::Display for ListVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListVisibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            "password" => Ok(Self::Password),
            other => Err(format!("unknown list visibility: {other}")),
        }
    }
}

/// Membership role within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    Admin,
    #[default]
    Member,
}

impl GroupRole {
    /// Stable string form used in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }
}

impl FromStr for GroupRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            other => Err(format!("unknown group role: {other}")),
        }
    }
}

/// Who may send invitations for a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupInvitePolicy {
    /// Only group admins may invite.
    #[default]
    AdminsOnly,
    /// Any member may invite.
    AllMembers,
}

impl FromStr for GroupInvitePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admins_only" => Ok(Self::AdminsOnly),
            "all_members" => Ok(Self::AllMembers),
            other => Err(format!("unknown invite policy: {other}")),
        }
    }
}

impl GroupInvitePolicy {
    /// Stable string form used in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AdminsOnly => "admins_only",
            Self::AllMembers => "all_members",
        }
    }
}

/// How prominently a wish is shown within a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayLevel {
    #[default]
    Normal,
    Highlighted,
    Hidden,
}

impl FromStr for DisplayLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "highlighted" => Ok(Self::Highlighted),
            "hidden" => Ok(Self::Hidden),
            other => Err(format!("unknown display level: {other}")),
        }
    }
}

impl DisplayLevel {
    /// Stable string form used in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Highlighted => "highlighted",
            Self::Hidden => "hidden",
        }
    }
}

/// The kind of client a personal API token was minted for.
///
/// Display metadata only; no behavior hangs off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenDeviceType {
    #[default]
    Other,
    Browser,
    Mobile,
    Script,
}

impl FromStr for TokenDeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "other" => Ok(Self::Other),
            "browser" => Ok(Self::Browser),
            "mobile" => Ok(Self::Mobile),
            "script" => Ok(Self::Script),
            other => Err(format!("unknown device type: {other}")),
        }
    }
}

impl TokenDeviceType {
    /// Stable string form used in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Other => "other",
            Self::Browser => "browser",
            Self::Mobile => "mobile",
            Self::Script => "script",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_string_roundtrip() {
        for v in [
            ListVisibility::Private,
            ListVisibility::Public,
            ListVisibility::Password,
        ] {
            assert_eq!(v.as_str().parse::<ListVisibility>(), Ok(v));
        }
        assert!("secret".parse::<ListVisibility>().is_err());
    }

    #[test]
    fn role_string_roundtrip() {
        assert_eq!("admin".parse::<GroupRole>(), Ok(GroupRole::Admin));
        assert_eq!("member".parse::<GroupRole>(), Ok(GroupRole::Member));
        assert!("owner".parse::<GroupRole>().is_err());
    }
}
