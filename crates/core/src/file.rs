//! Finalized file records and naming conventions.

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use time::macros::format_description;
use uuid::Uuid;

/// Unique identifier for a stored file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    /// Generate a new random file ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for FileId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage key of a finalized file.
pub fn file_key(id: FileId) -> String {
    format!("files/{id}")
}

/// What happens once a file reaches its view limit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxViewsAction {
    #[default]
    Hide,
    Delete,
}

impl MaxViewsAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hide => "hide",
            Self::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "hide" => Ok(Self::Hide),
            "delete" => Ok(Self::Delete),
            _ => Err(crate::Error::Serialization(format!(
                "unknown max views action: {s}"
            ))),
        }
    }
}

/// How the display name is derived when the client gives none.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameConvention {
    /// Keep the uploaded file name.
    #[default]
    Original,
    /// Random alphanumeric stem, original extension.
    Random,
    /// UUID stem, original extension.
    Uuid,
    /// Upload timestamp stem, original extension.
    Date,
}

/// Length of generated random names and slugs.
pub const RANDOM_LEN: usize = 8;

impl NameConvention {
    /// Derive a display name from the original file name.
    pub fn apply(&self, original: &str, now: OffsetDateTime) -> String {
        let ext = extension(original);
        let stem = match self {
            Self::Original => return original.to_string(),
            Self::Random => random_string(RANDOM_LEN),
            Self::Uuid => Uuid::new_v4().to_string(),
            Self::Date => now
                .format(format_description!(
                    "[year]-[month]-[day]_[hour]-[minute]-[second]"
                ))
                .unwrap_or_else(|_| now.unix_timestamp().to_string()),
        };
        match ext {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem,
        }
    }
}

/// How the public slug is generated when no vanity slug is given.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlugConvention {
    #[default]
    Random,
    Uuid,
    /// Slugified file stem. Collisions get a random suffix.
    Original,
}

impl SlugConvention {
    /// Generate a candidate slug. `attempt > 0` signals a previous collision.
    pub fn generate(&self, original: &str, attempt: u32) -> String {
        match self {
            Self::Random => random_string(RANDOM_LEN),
            Self::Uuid => Uuid::new_v4().simple().to_string(),
            Self::Original => {
                let base = slugify(stem(original));
                let base = if base.is_empty() {
                    random_string(RANDOM_LEN)
                } else {
                    base
                };
                if attempt == 0 {
                    base
                } else {
                    format!("{base}-{}", random_string(4))
                }
            }
        }
    }
}

/// Maximum slug length.
pub const MAX_SLUG_LEN: usize = 64;

/// Validate a vanity slug: 1-64 characters from `[A-Za-z0-9_-]`.
pub fn validate_slug(slug: &str) -> crate::Result<()> {
    if slug.is_empty() || slug.len() > MAX_SLUG_LEN {
        return Err(crate::Error::InvalidSlug(format!(
            "slug must be 1-{MAX_SLUG_LEN} characters"
        )));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(crate::Error::InvalidSlug(format!(
            "slug contains invalid characters: {slug}"
        )));
    }
    Ok(())
}

/// Strip directory components and unsafe characters from a client file name.
///
/// Returns an error when nothing usable remains.
pub fn sanitize_file_name(name: &str) -> crate::Result<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*'))
        .take(255)
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        return Err(crate::Error::InvalidFileName(format!(
            "unusable file name: {name:?}"
        )));
    }
    Ok(cleaned)
}

/// Check a MIME type has the `type/subtype` shape.
pub fn validate_mime_type(mime: &str) -> crate::Result<()> {
    let valid = mime.len() <= 255
        && mime.split_once('/').is_some_and(|(t, s)| {
            !t.is_empty()
                && !s.is_empty()
                && mime
                    .chars()
                    .all(|c| c.is_ascii_graphic() && c != '\\' && c != '"')
        });
    if valid {
        Ok(())
    } else {
        Err(crate::Error::InvalidMimeType(mime.to_string()))
    }
}

fn extension(name: &str) -> Option<&str> {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

fn stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').chars().take(MAX_SLUG_LEN - 5).collect()
}

fn random_string(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// The finalized file, as returned by both upload paths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: FileId,
    pub slug: String,
    pub name: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub url: String,
    pub is_public: bool,
    pub description: Option<String>,
    pub max_views: Option<u32>,
    pub max_views_action: MaxViewsAction,
    pub views: u64,
    pub folder_id: Option<Uuid>,
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
