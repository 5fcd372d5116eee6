//! MigrationCoordinator: one-time import of the legacy store.
//!
//! State machine, persisted in `migration_state`:
//!
//! ```text
//! NotStarted ──run──▶ InProgress ──verified──▶ Completed
//!                         │
//!                         └──count short / fatal error──▶ Failed ──run──▶ InProgress
//! ```
//!
//! Records keep their legacy id, so a re-run skips what is already present.
//! The legacy store is erased only after every distinct legacy id is found
//! in the record table.

use std::collections::HashSet;
use std::fmt;

use lockbox_crypto::CryptoError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::db::Store;
use crate::error::StoreError;
use crate::legacy::{LegacyEntry, LegacyStore};
use crate::models::now_micros;
use crate::records::{MigratedRecord, RecordStore};

/// Category assigned to legacy entries that carry none ("Other").
const FALLBACK_CATEGORY_ID: &str = "6";

/// How secrets are encoded in the legacy store. Configured, never sniffed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacySecretFormat {
    /// `base64 "." truncated-sha256` values written by the source app.
    #[default]
    HashTagged,
    /// Secrets stored in the clear.
    Plaintext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl MigrationStatus {
    fn as_str(self) -> &'static str {
        match self {
            MigrationStatus::NotStarted => "not_started",
            MigrationStatus::InProgress => "in_progress",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Result<Self, StoreError> {
        Ok(match s {
            "not_started" => MigrationStatus::NotStarted,
            "in_progress" => MigrationStatus::InProgress,
            "completed" => MigrationStatus::Completed,
            "failed" => MigrationStatus::Failed,
            other => {
                return Err(StoreError::Schema(format!("unknown migration status {other:?}")))
            }
        })
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationState {
    pub status: MigrationStatus,
    pub legacy_count: u64,
    pub migrated_count: u64,
    pub failed_count: u64,
    pub last_error: Option<String>,
}

/// Outcome of one `run`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Distinct legacy records expected in the store.
    pub expected: u64,
    /// Rows written by this run.
    pub inserted: u64,
    /// Entries whose id was already present.
    pub already_present: u64,
    /// Entries that could not be converted or written.
    pub failed: u64,
    /// Legacy ids found in the store at verification.
    pub found: u64,
}

#[derive(sqlx::FromRow)]
struct StateRow {
    status: String,
    legacy_count: i64,
    migrated_count: i64,
    failed_count: i64,
    last_error: Option<String>,
}

pub struct MigrationCoordinator {
    store: Store,
    records: RecordStore,
    legacy: LegacyStore,
    format: LegacySecretFormat,
}

impl MigrationCoordinator {
    pub fn new(
        store: Store,
        records: RecordStore,
        legacy: LegacyStore,
        format: LegacySecretFormat,
    ) -> Self {
        Self {
            store,
            records,
            legacy,
            format,
        }
    }

    pub async fn state(&self) -> Result<MigrationState, StoreError> {
        let row: StateRow = sqlx::query_as(
            "SELECT status, legacy_count, migrated_count, failed_count, last_error \
             FROM migration_state WHERE id = 1",
        )
        .fetch_one(self.store.pool())
        .await?;
        Ok(MigrationState {
            status: MigrationStatus::parse(&row.status)?,
            legacy_count: row.legacy_count.max(0) as u64,
            migrated_count: row.migrated_count.max(0) as u64,
            failed_count: row.failed_count.max(0) as u64,
            last_error: row.last_error,
        })
    }

    /// Startup hook: migrate only when the legacy store holds entries.
    /// An unreadable legacy store is recorded as `Failed` so the next start
    /// retries.
    pub async fn run_if_needed(&self) -> Result<Option<MigrationReport>, StoreError> {
        match self.legacy.read_entries().await {
            Ok(entries) if entries.is_empty() => Ok(None),
            Ok(_) => self.run().await.map(Some),
            Err(e) => {
                warn!(error = %e, path = %self.legacy.path().display(), "legacy store unreadable");
                self.record_failure(0, 0, 0, &e).await?;
                Err(e)
            }
        }
    }

    /// Import every legacy entry, verify, then erase the legacy store.
    ///
    /// Safe to call repeatedly. On `MigrationIncomplete` or any other error
    /// the legacy data is left untouched and the state is `Failed`.
    pub async fn run(&self) -> Result<MigrationReport, StoreError> {
        let entries = match self.legacy.read_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                self.record_failure(0, 0, 0, &e).await?;
                return Err(e);
            }
        };

        let expected_ids = expected_ids(&entries);
        let expected = expected_ids.len() as u64 + unidentified(&entries);
        let mut report = MigrationReport {
            expected,
            ..MigrationReport::default()
        };
        info!(expected, path = %self.legacy.path().display(), "legacy migration started");
        self.save_state(MigrationStatus::InProgress, expected, 0, 0, None)
            .await?;

        for raw in entries {
            match self.migrate_one(raw).await {
                Ok(true) => report.inserted += 1,
                Ok(false) => report.already_present += 1,
                Err(StoreError::Crypto(e @ CryptoError::KeyUnavailable(_))) => {
                    let err = StoreError::Crypto(e);
                    self.record_failure(expected, report.inserted, report.failed, &err)
                        .await?;
                    return Err(err);
                }
                Err(e @ StoreError::StorageUnavailable(_)) => return Err(e),
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %e, "legacy record not migrated");
                }
            }
        }

        let mut found = 0u64;
        for id in &expected_ids {
            if self.records.contains(id).await? {
                found += 1;
            }
        }
        report.found = found;

        if found >= expected {
            // Completed is recorded before the erase: if the erase is lost, the
            // next start re-runs and finds everything already present.
            self.save_state(
                MigrationStatus::Completed,
                expected,
                found,
                report.failed,
                None,
            )
            .await?;
            self.legacy.erase_entries().await?;
            info!(
                inserted = report.inserted,
                already_present = report.already_present,
                "legacy migration completed"
            );
            Ok(report)
        } else {
            let err = StoreError::MigrationIncomplete { expected, found };
            warn!(
                expected,
                found,
                failed = report.failed,
                "legacy migration incomplete, keeping legacy data"
            );
            self.record_failure(expected, found, report.failed, &err)
                .await?;
            Err(err)
        }
    }

    /// Returns whether a new row was written.
    async fn migrate_one(&self, raw: Value) -> Result<bool, StoreError> {
        let entry: LegacyEntry = serde_json::from_value(raw)
            .map_err(|e| StoreError::Legacy(format!("unreadable entry: {e}")))?;
        if entry.id.trim().is_empty() {
            return Err(StoreError::empty_field("id"));
        }
        if self.records.contains(&entry.id).await? {
            return Ok(false);
        }
        for (field, value) in [("title", &entry.title), ("username", &entry.username)] {
            if value.trim().is_empty() {
                return Err(StoreError::empty_field(field));
            }
        }

        let created_at = entry.created_at.to_utc()?.timestamp_micros();
        let updated_at = match &entry.updated_at {
            Some(ts) => ts.to_utc()?.timestamp_micros(),
            None => created_at,
        };

        let engine = self.records.engine();
        let plaintext = match self.format {
            LegacySecretFormat::HashTagged => engine.open_legacy(&entry.password)?,
            LegacySecretFormat::Plaintext => entry.password.clone(),
        };
        if plaintext.is_empty() {
            return Err(StoreError::empty_field("secret"));
        }
        let secret = engine.encrypt_field(&plaintext).await?;

        let category_id = if entry.category.trim().is_empty() {
            FALLBACK_CATEGORY_ID.to_owned()
        } else {
            entry.category
        };

        self.records
            .insert_migrated(MigratedRecord {
                id: entry.id,
                title: entry.title,
                username: entry.username,
                secret,
                website: entry.website.filter(|w| !w.is_empty()),
                notes: entry.notes.filter(|n| !n.is_empty()),
                category_id,
                is_favorite: entry.is_favorite,
                created_at,
                updated_at,
            })
            .await
    }

    async fn record_failure(
        &self,
        expected: u64,
        migrated: u64,
        failed: u64,
        err: &StoreError,
    ) -> Result<(), StoreError> {
        self.save_state(
            MigrationStatus::Failed,
            expected,
            migrated,
            failed,
            Some(err.to_string()),
        )
        .await
    }

    async fn save_state(
        &self,
        status: MigrationStatus,
        legacy_count: u64,
        migrated_count: u64,
        failed_count: u64,
        last_error: Option<String>,
    ) -> Result<(), StoreError> {
        let _w = self.store.write_guard().await;
        sqlx::query(
            "UPDATE migration_state SET status = ?, legacy_count = ?, migrated_count = ?, \
             failed_count = ?, last_error = ?, updated_at = ? WHERE id = 1",
        )
        .bind(status.as_str())
        .bind(legacy_count as i64)
        .bind(migrated_count as i64)
        .bind(failed_count as i64)
        .bind(last_error)
        .bind(now_micros())
        .execute(self.store.pool())
        .await?;
        Ok(())
    }
}

fn entry_id(raw: &Value) -> Option<&str> {
    raw.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
}

fn expected_ids(entries: &[Value]) -> HashSet<String> {
    entries
        .iter()
        .filter_map(entry_id)
        .map(str::to_owned)
        .collect()
}

/// Entries without a usable id can never be found by id, so each counts
/// against the gate on its own.
fn unidentified(entries: &[Value]) -> u64 {
    entries.iter().filter(|e| entry_id(e).is_none()).count() as u64
}
