//! # Domain Models
//!
//! These structs represent the mirrored entities of statuslog.
//! Identifiers come from the remote instance and are kept as opaque strings.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Remote status id.
///
/// Mastodon ids are decimal snowflakes serialised as strings, so plain string
/// comparison would put "99" above "100". Ordering compares length first and
/// then bytes, which matches numeric order for digit strings and is still a
/// total order for anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Ord for PostId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.as_bytes().cmp(other.0.as_bytes()))
    }
}

impl PartialOrd for PostId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PostId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PostId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Who can see a post on the remote instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
}

impl Visibility {
    pub const ALL: [Visibility; 4] = [
        Visibility::Public,
        Visibility::Unlisted,
        Visibility::Private,
        Visibility::Direct,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
            Visibility::Direct => "direct",
        }
    }

    /// Visibilities shown on a public profile. Public posts are always shown.
    pub fn exposed_by(exposure: &VisibilityExposure) -> Vec<Visibility> {
        let mut allowed = vec![Visibility::Public];
        if exposure.show_unlisted {
            allowed.push(Visibility::Unlisted);
        }
        if exposure.show_private {
            allowed.push(Visibility::Private);
        }
        if exposure.show_direct {
            allowed.push(Visibility::Direct);
        }
        allowed
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "unlisted" => Ok(Visibility::Unlisted),
            "private" => Ok(Visibility::Private),
            "direct" => Ok(Visibility::Direct),
            other => Err(DomainError::Validation(format!(
                "unknown visibility '{other}'"
            ))),
        }
    }
}

/// Identity of a mirrored account: the same numeric id can exist on
/// different instances, so the host is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountKey {
    pub id: String,
    pub host: String,
}

impl AccountKey {
    pub fn new(id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
        }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.host)
    }
}

/// A single remote status mirrored locally. Never updated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub account_id: String,
    pub host: String,
    /// Body as delivered by the remote (HTML for Mastodon)
    pub text: String,
    pub url: String,
    /// Always UTC; display zones are applied by the presentation layer.
    pub created_at: DateTime<Utc>,
    pub visibility: Visibility,
}

/// Which non-public visibilities the public profile page exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityExposure {
    pub show_unlisted: bool,
    pub show_private: bool,
    pub show_direct: bool,
}

/// A remote account being mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub host: String,
    pub user_name: String,
    /// Whether the local mirror page is publicly browsable
    pub public: bool,
    /// Set once a tail-sync observes the end of the remote history
    pub all_fetched: bool,
    pub exposure: VisibilityExposure,
}

impl Account {
    pub fn key(&self) -> AccountKey {
        AccountKey::new(self.id.clone(), self.host.clone())
    }
}

/// OAuth client registration for a remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub host: String,
    pub client_id: String,
    pub client_secret: String,
}

/// What the remote reports for the owner of a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAccount {
    pub id: String,
    pub user_name: String,
}

/// Bearer token for the remote instance.
#[derive(Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// Backfill progress of an account, derived from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchState {
    /// No posts stored yet
    Empty,
    /// Some posts stored, history not exhausted
    Partial,
    /// Backfill reached the end of the remote history
    Complete,
}
