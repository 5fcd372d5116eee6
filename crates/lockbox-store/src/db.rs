//! SQLite handle shared by the record, category and migration layers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use tokio::io::AsyncWriteExt;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::info;

use crate::error::StoreError;

const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

/// Central store handle. Cheap to clone.
///
/// Every write holds the shared side of `write_gate`; `export_snapshot` takes
/// the exclusive side so no write lands while the copy is taken.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    path: PathBuf,
    write_gate: Arc<RwLock<()>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub records: i64,
    pub categories: i64,
}

impl Store {
    /// Open (or create) the database at `db_path` and apply pending schema
    /// migrations.
    ///
    /// WAL mode is set on the connection, not inside a migration: SQLite
    /// refuses to change `journal_mode` within a transaction.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Schema(e.to_string()))?;

        info!(path = %db_path.display(), "store opened");
        Ok(Self {
            pool,
            path: db_path.to_path_buf(),
            write_gate: Arc::new(RwLock::new(())),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn write_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.write_gate.read().await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Self-contained copy of the database, taken with writes quiesced.
    ///
    /// The copy holds ciphertext only; restoring it is useful only together
    /// with the same master key.
    pub async fn export_snapshot(&self) -> Result<Vec<u8>, StoreError> {
        let _quiesced = self.write_gate.write().await;
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("snapshot.db");
        let target_str = target
            .to_str()
            .ok_or_else(|| StoreError::Snapshot("temporary path is not UTF-8".into()))?;

        sqlx::query("VACUUM INTO ?")
            .bind(target_str)
            .execute(&self.pool)
            .await?;

        let bytes = tokio::fs::read(&target).await?;
        info!(bytes = bytes.len(), "snapshot exported");
        Ok(bytes)
    }

    /// Write an exported snapshot to `dest` and open it. Never overwrites.
    pub async fn restore_snapshot(bytes: &[u8], dest: &Path) -> Result<Self, StoreError> {
        if !bytes.starts_with(SQLITE_HEADER) {
            return Err(StoreError::Snapshot("not a database snapshot".into()));
        }
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)
            .await
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::Snapshot(format!(
                    "refusing to overwrite {}",
                    dest.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        info!(path = %dest.display(), "snapshot restored");
        Self::open(dest).await
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        let categories: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
            .fetch_one(&self.pool)
            .await?;
        Ok(StoreStats {
            records,
            categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reopen_keeps_schema_and_seeds_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lockbox.db");
        let first = Store::open(&path).await.unwrap();
        assert_eq!(first.stats().await.unwrap().categories, 6);
        first.close().await;

        let second = Store::open(&path).await.unwrap();
        assert_eq!(
            second.stats().await.unwrap(),
            StoreStats {
                records: 0,
                categories: 6
            }
        );
    }

    #[tokio::test]
    async fn restore_refuses_existing_file_and_garbage() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("lockbox.db")).await.unwrap();
        let bytes = store.export_snapshot().await.unwrap();
        assert!(bytes.starts_with(SQLITE_HEADER));

        let occupied = dir.path().join("occupied.db");
        std::fs::write(&occupied, b"keep me").unwrap();
        assert!(matches!(
            Store::restore_snapshot(&bytes, &occupied).await,
            Err(StoreError::Snapshot(_))
        ));
        assert_eq!(std::fs::read(&occupied).unwrap(), b"keep me");

        assert!(matches!(
            Store::restore_snapshot(b"not sqlite", &dir.path().join("x.db")).await,
            Err(StoreError::Snapshot(_))
        ));
    }
}
