//! Row models and the public record types built from them.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use lockbox_crypto::AuthFailure;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Unix microseconds, the canonical timestamp column type.
pub(crate) fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

pub(crate) fn from_micros(us: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_micros(us)
        .single()
        .ok_or_else(|| StoreError::Validation(format!("timestamp {us} out of range")))
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct RecordRow {
    pub id: String,
    pub title: String,
    pub username: String,
    /// Versioned ciphertext token.
    pub secret_enc: String,
    pub website: Option<String>,
    pub notes: Option<String>,
    pub category_id: String,
    pub is_favorite: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

pub(crate) const RECORD_COLUMNS: &str = "id, title, username, secret_enc, website, notes, \
     category_id, is_favorite, created_at, updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct CategoryRow {
    pub id: String,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub is_default: bool,
}

/// Decrypted state of a record's secret.
///
/// `Unreadable` replaces the plaintext when the stored token fails
/// authentication; the ciphertext itself is never handed out.
#[derive(Clone, PartialEq, Eq)]
pub enum RecordSecret {
    Plain(String),
    Unreadable(AuthFailure),
}

impl RecordSecret {
    pub fn as_plain(&self) -> Option<&str> {
        match self {
            RecordSecret::Plain(s) => Some(s),
            RecordSecret::Unreadable(_) => None,
        }
    }

    pub fn is_readable(&self) -> bool {
        matches!(self, RecordSecret::Plain(_))
    }
}

impl fmt::Debug for RecordSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordSecret::Plain(_) => f.write_str("Plain(<redacted>)"),
            RecordSecret::Unreadable(reason) => write!(f, "Unreadable({reason:?})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRecord {
    pub id: String,
    pub title: String,
    pub username: String,
    pub secret: RecordSecret,
    pub website: Option<String>,
    pub notes: Option<String>,
    pub category_id: String,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for `RecordStore::create`.
#[derive(Clone, Default)]
pub struct NewRecord {
    pub title: String,
    pub username: String,
    pub secret: String,
    pub website: Option<String>,
    pub notes: Option<String>,
    pub category_id: String,
    pub is_favorite: bool,
}

impl NewRecord {
    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        require("title", &self.title)?;
        require("username", &self.username)?;
        if self.secret.is_empty() {
            return Err(StoreError::empty_field("secret"));
        }
        require("category_id", &self.category_id)
    }
}

impl fmt::Debug for NewRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewRecord")
            .field("title", &self.title)
            .field("username", &self.username)
            .field("category_id", &self.category_id)
            .finish_non_exhaustive()
    }
}

/// Partial update. `None` leaves a field untouched; for `website` and `notes`
/// `Some(None)` clears the value.
#[derive(Clone, Default)]
pub struct RecordUpdate {
    pub title: Option<String>,
    pub username: Option<String>,
    pub secret: Option<String>,
    pub website: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub category_id: Option<String>,
    pub is_favorite: Option<bool>,
}

impl RecordUpdate {
    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        if let Some(title) = &self.title {
            require("title", title)?;
        }
        if let Some(username) = &self.username {
            require("username", username)?;
        }
        if matches!(&self.secret, Some(s) if s.is_empty()) {
            return Err(StoreError::empty_field("secret"));
        }
        if let Some(category_id) = &self.category_id {
            require("category_id", category_id)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RecordUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordUpdate")
            .field("title", &self.title)
            .field("username", &self.username)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("category_id", &self.category_id)
            .field("is_favorite", &self.is_favorite)
            .finish_non_exhaustive()
    }
}

fn require(field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        Err(StoreError::empty_field(field))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub is_default: bool,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            color: row.color,
            icon: row.icon,
            is_default: row.is_default,
        }
    }
}

/// What a record's `category_id` points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryRef {
    Known(Category),
    /// The referenced category no longer exists.
    Uncategorized,
}

impl CategoryRef {
    pub fn display_name(&self) -> &str {
        match self {
            CategoryRef::Known(c) => &c.name,
            CategoryRef::Uncategorized => "Uncategorized",
        }
    }
}
