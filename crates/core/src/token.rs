//! Users, roles, token scopes and authorization.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for a token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(Uuid);

impl TokenId {
    /// Generate a new random token ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidToken(format!("invalid token ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TokenId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({})", self.0)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a user known to the external auth provider.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a new random user ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User role. Quotas are configured per role.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(crate::Error::InvalidToken(format!("unknown role: {s}"))),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Token scopes for authorization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenScope {
    /// Read access to the caller's own files.
    #[serde(rename = "files:read")]
    Read,
    /// Upload access (chunked and single-request uploads).
    #[serde(rename = "upload")]
    Upload,
    /// Administrative access (sweeps, diagnostics).
    #[serde(rename = "admin")]
    Admin,
}

impl TokenScope {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "files:read" => Ok(Self::Read),
            "upload" => Ok(Self::Upload),
            "admin" => Ok(Self::Admin),
            _ => Err(crate::Error::InvalidToken(format!("unknown scope: {s}"))),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "files:read",
            Self::Upload => "upload",
            Self::Admin => "admin",
        }
    }

    /// Check if this scope implies another scope.
    pub fn implies(&self, other: &Self) -> bool {
        match self {
            Self::Admin => true,
            Self::Upload => matches!(other, Self::Upload),
            Self::Read => matches!(other, Self::Read),
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated token with its metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Token {
    /// Token identifier.
    pub id: TokenId,
    /// User the token acts on behalf of.
    pub user_id: UserId,
    /// Granted scopes.
    pub scopes: HashSet<TokenScope>,
    /// When the token expires.
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    /// When the token was revoked (if revoked).
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
    /// When the token was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Description for the token.
    pub description: Option<String>,
}

impl Token {
    /// Check if the token is valid (not expired or revoked).
    pub fn is_valid(&self) -> bool {
        let now = OffsetDateTime::now_utc();

        if self.revoked_at.is_some() {
            return false;
        }

        if let Some(expires_at) = self.expires_at
            && now > expires_at
        {
            return false;
        }

        true
    }

    /// Check if the token has a specific scope.
    pub fn has_scope(&self, scope: TokenScope) -> bool {
        self.scopes.iter().any(|s| s.implies(&scope))
    }

    /// Check if the token can upload.
    pub fn can_upload(&self) -> bool {
        self.is_valid() && self.has_scope(TokenScope::Upload)
    }

    /// Check if the token has admin access.
    pub fn is_admin(&self) -> bool {
        self.is_valid() && self.has_scope(TokenScope::Admin)
    }
}

/// Parse a JSON array of scope names. Unknown scopes are errors.
pub fn parse_scopes(json: &str) -> crate::Result<HashSet<TokenScope>> {
    let names: Vec<String> =
        serde_json::from_str(json).map_err(|e| crate::Error::Serialization(e.to_string()))?;
    names.iter().map(|s| TokenScope::parse(s)).collect()
}
