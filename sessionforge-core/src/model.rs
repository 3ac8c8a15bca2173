//! Domain model types for Sessionforge.
//!
//! This module defines the core credential types:
//! - [`CredentialPair`] - A session token plus its companion session cookie
//! - [`CredentialSource`] - Where a pair was resolved from
//! - [`CredentialRecord`] - The persisted (file / secure store) representation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::Secret;

/// Prefix every browser session token carries.
pub const TOKEN_PREFIX: &str = "xoxc-";

/// Prefix every session cookie value carries.
pub const COOKIE_PREFIX: &str = "xoxd-";

/// Where a credential pair was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialSource {
    /// Process environment variables.
    Environment,
    /// The persisted credential file.
    File,
    /// The platform secure secret store.
    SecureStore,
    /// Freshly extracted by the credential probe.
    Extracted,
}

impl CredentialSource {
    /// Stable lowercase name, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::File => "file",
            Self::SecureStore => "secure-store",
            Self::Extracted => "extracted",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A usable session credential pair.
///
/// Both halves are guaranteed non-blank; use [`CredentialPair::new`] to
/// construct one. Pairs are never mutated after creation: a renewal yields a
/// new pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    token: Secret,
    secret: Secret,
    source: CredentialSource,
    updated_at: Option<DateTime<Utc>>,
}

impl CredentialPair {
    /// Build a pair, returning `None` if either half is blank.
    pub fn new(
        token: impl Into<String>,
        secret: impl Into<String>,
        source: CredentialSource,
        updated_at: Option<DateTime<Utc>>,
    ) -> Option<Self> {
        let token = Secret::new(token.into().trim());
        let secret = Secret::new(secret.into().trim());
        if token.is_blank() || secret.is_blank() {
            return None;
        }
        Some(Self {
            token,
            secret,
            source,
            updated_at,
        })
    }

    /// The session token.
    pub fn token(&self) -> &Secret {
        &self.token
    }

    /// The companion session cookie.
    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    /// Where this pair came from.
    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// When this pair was last written, if known.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Age of the pair relative to `now`, if its write time is known.
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.updated_at.map(|at| now - at)
    }

    /// Same credentials, re-labelled with a new source and timestamp.
    pub fn with_origin(&self, source: CredentialSource, updated_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: self.token.clone(),
            secret: self.secret.clone(),
            source,
            updated_at,
        }
    }

    /// Whether both halves carry the prefixes the platform issues.
    pub fn has_expected_shape(&self) -> bool {
        is_well_formed(self.token.expose(), TOKEN_PREFIX)
            && is_well_formed(self.secret.expose(), COOKIE_PREFIX)
    }

    /// Convert into the persisted representation.
    pub fn to_record(&self) -> CredentialRecord {
        CredentialRecord {
            token: self.token.clone(),
            cookie: self.secret.clone(),
            updated_at: self.updated_at,
        }
    }
}

fn is_well_formed(value: &str, prefix: &str) -> bool {
    value.len() > prefix.len() && value.starts_with(prefix)
}

/// Strip the `d=` cookie-name prefix browsers sometimes hand back.
pub fn normalize_cookie(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix("d=").unwrap_or(trimmed)
}

/// On-disk representation of a credential pair.
///
/// ```json
/// { "token": "xoxc-…", "cookie": "xoxd-…", "updated_at": "2024-05-01T10:00:00Z" }
/// ```
///
/// `secret` is accepted as an alias of `cookie` when reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(default = "empty_secret")]
    pub token: Secret,

    #[serde(default = "empty_secret", alias = "secret")]
    pub cookie: Secret,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn empty_secret() -> Secret {
    Secret::new("")
}

impl CredentialRecord {
    /// Convert into a usable pair, or `None` if either half is missing.
    pub fn into_pair(self, source: CredentialSource) -> Option<CredentialPair> {
        CredentialPair::new(
            self.token.expose(),
            self.cookie.expose(),
            source,
            self.updated_at,
        )
    }
}
