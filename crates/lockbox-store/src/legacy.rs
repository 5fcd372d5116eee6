//! Legacy key-value store left behind by the source application.
//!
//! The file is a flat JSON object of string keys, the on-disk shape of the
//! app's key-value storage. Entries live under [`ENTRIES_KEY`], whose value
//! is itself a JSON-encoded array (a bare array is accepted too).

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::StoreError;
use crate::paths::write_atomic;

pub const ENTRIES_KEY: &str = "password_entries";

/// One entry as the source application wrote it.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyEntry {
    pub id: String,
    pub title: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub is_favorite: bool,
    pub created_at: LegacyTimestamp,
    #[serde(default)]
    pub updated_at: Option<LegacyTimestamp>,
}

/// ISO-8601 string or epoch milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LegacyTimestamp {
    Millis(i64),
    Text(String),
}

impl LegacyTimestamp {
    pub fn to_utc(&self) -> Result<DateTime<Utc>, StoreError> {
        let parsed = match self {
            LegacyTimestamp::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            LegacyTimestamp::Text(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    s.parse::<i64>()
                        .ok()
                        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                }),
        };
        parsed.ok_or_else(|| StoreError::Legacy(format!("unreadable timestamp {self:?}")))
    }
}

pub struct LegacyStore {
    path: PathBuf,
}

impl LegacyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw entries, unparsed so one bad entry does not hide the rest.
    /// A missing file or key yields an empty list.
    pub async fn read_entries(&self) -> Result<Vec<Value>, StoreError> {
        let map = self.load_map().await?;
        let Some(value) = map.get(ENTRIES_KEY) else {
            return Ok(Vec::new());
        };
        let array = match value {
            Value::String(encoded) => serde_json::from_str::<Value>(encoded)
                .map_err(|e| StoreError::Legacy(format!("{ENTRIES_KEY} is not valid JSON: {e}")))?,
            other => other.clone(),
        };
        match array {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            _ => Err(StoreError::Legacy(format!("{ENTRIES_KEY} is not an array"))),
        }
    }

    /// Drop the entries key, leaving every other key in place. The file is
    /// replaced atomically.
    pub async fn erase_entries(&self) -> Result<(), StoreError> {
        let mut map = self.load_map().await?;
        if map.remove(ENTRIES_KEY).is_none() {
            return Ok(());
        }
        let path = self.path.clone();
        let body = serde_json::to_vec_pretty(&Value::Object(map))?;
        tokio::task::spawn_blocking(move || write_atomic(&path, &body))
            .await
            .map_err(|e| StoreError::Legacy(format!("erase task: {e}")))??;
        info!(path = %self.path.display(), "legacy entries erased");
        Ok(())
    }

    async fn load_map(&self) -> Result<Map<String, Value>, StoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        let parsed = serde_json::from_slice::<Value>(&raw)
            .map_err(|e| StoreError::Legacy(format!("legacy file is not valid JSON: {e}")))?;
        match parsed {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::Legacy("legacy file is not a JSON object".into())),
        }
    }
}
