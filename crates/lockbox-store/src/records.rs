//! RecordStore: CRUD and queries over secret records.
//!
//! Secrets pass through [`CipherEngine`] on the way in and out; the table
//! only ever holds tokens. Mutations of one id are serialized by a per-id
//! async lock, so a read-merge-write in `update` cannot interleave with a
//! second update or a delete of the same record.

use std::collections::HashMap;
use std::sync::Arc;

use lockbox_crypto::{CipherEngine, CryptoError, EncryptedField};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::Store;
use crate::error::StoreError;
use crate::models::{
    from_micros, now_micros, NewRecord, RecordRow, RecordSecret, RecordUpdate, SecretRecord,
    RECORD_COLUMNS,
};

/// Proof that the caller typed the wipe confirmation phrase.
#[derive(Debug)]
pub struct ConfirmWipe(());

impl ConfirmWipe {
    pub const PHRASE: &'static str = "wipe all records";

    pub fn from_phrase(phrase: &str) -> Result<Self, StoreError> {
        if phrase == Self::PHRASE {
            Ok(Self(()))
        } else {
            Err(StoreError::Validation(format!(
                "confirmation must be exactly \"{}\"",
                Self::PHRASE
            )))
        }
    }
}

/// A record carried over from the legacy store with its original identity.
#[derive(Clone)]
pub(crate) struct MigratedRecord {
    pub id: String,
    pub title: String,
    pub username: String,
    pub secret: EncryptedField,
    pub website: Option<String>,
    pub notes: Option<String>,
    pub category_id: String,
    pub is_favorite: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Default)]
struct IdLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl IdLocks {
    async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock();
            // Entries only the map references are idle.
            map.retain(|_, m| Arc::strong_count(m) > 1);
            Arc::clone(map.entry(id.to_owned()).or_default())
        };
        slot.lock_owned().await
    }
}

#[derive(Clone)]
pub struct RecordStore {
    store: Store,
    engine: CipherEngine,
    locks: Arc<IdLocks>,
}

impl RecordStore {
    pub fn new(store: Store, engine: CipherEngine) -> Self {
        Self {
            store,
            engine,
            locks: Arc::new(IdLocks::default()),
        }
    }

    pub fn engine(&self) -> &CipherEngine {
        &self.engine
    }

    pub async fn create(&self, new: NewRecord) -> Result<SecretRecord, StoreError> {
        new.validate()?;
        let id = Uuid::now_v7().to_string();
        let token = self.engine.encrypt_field(&new.secret).await?;
        let now = now_micros();

        {
            let _w = self.store.write_guard().await;
            sqlx::query(
                "INSERT INTO records (id, title, username, secret_enc, website, notes, \
                 category_id, is_favorite, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&new.title)
            .bind(&new.username)
            .bind(token.as_str())
            .bind(&new.website)
            .bind(&new.notes)
            .bind(&new.category_id)
            .bind(new.is_favorite)
            .bind(now)
            .bind(now)
            .execute(self.store.pool())
            .await?;
        }

        debug!(id = %id, "record created");
        let at = from_micros(now)?;
        Ok(SecretRecord {
            id,
            title: new.title,
            username: new.username,
            secret: RecordSecret::Plain(new.secret),
            website: new.website,
            notes: new.notes,
            category_id: new.category_id,
            is_favorite: new.is_favorite,
            created_at: at,
            updated_at: at,
        })
    }

    /// Merge `changes` into the stored record. The secret is re-encrypted
    /// only when it is part of the update.
    pub async fn update(&self, id: &str, changes: RecordUpdate) -> Result<SecretRecord, StoreError> {
        changes.validate()?;
        let _guard = self.locks.lock(id).await;

        let current = self
            .fetch_row(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;

        let secret_enc = match &changes.secret {
            Some(plain) => self.engine.encrypt_field(plain).await?.into_inner(),
            None => current.secret_enc.clone(),
        };
        // Strictly later than the previous value even if the clock stalls.
        let updated_at = now_micros().max(current.updated_at + 1);

        let merged = RecordRow {
            id: current.id,
            title: changes.title.unwrap_or(current.title),
            username: changes.username.unwrap_or(current.username),
            secret_enc,
            website: changes.website.unwrap_or(current.website),
            notes: changes.notes.unwrap_or(current.notes),
            category_id: changes.category_id.unwrap_or(current.category_id),
            is_favorite: changes.is_favorite.unwrap_or(current.is_favorite),
            created_at: current.created_at,
            updated_at,
        };

        {
            let _w = self.store.write_guard().await;
            let result = sqlx::query(
                "UPDATE records SET title = ?, username = ?, secret_enc = ?, website = ?, \
                 notes = ?, category_id = ?, is_favorite = ?, updated_at = ? WHERE id = ?",
            )
            .bind(&merged.title)
            .bind(&merged.username)
            .bind(&merged.secret_enc)
            .bind(&merged.website)
            .bind(&merged.notes)
            .bind(&merged.category_id)
            .bind(merged.is_favorite)
            .bind(merged.updated_at)
            .bind(&merged.id)
            .execute(self.store.pool())
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(id.to_owned()));
            }
        }

        debug!(id = %id, "record updated");
        match changes.secret {
            Some(plain) => hydrate_with(merged, RecordSecret::Plain(plain)),
            None => self.hydrate(merged).await,
        }
    }

    pub async fn set_favorite(&self, id: &str, favorite: bool) -> Result<SecretRecord, StoreError> {
        self.update(
            id,
            RecordUpdate {
                is_favorite: Some(favorite),
                ..RecordUpdate::default()
            },
        )
        .await
    }

    /// Remove a record. Absent ids are a no-op; returns whether a row went away.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.locks.lock(id).await;
        let _w = self.store.write_guard().await;
        let result = sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(self.store.pool())
            .await?;
        let removed = result.rows_affected() > 0;
        debug!(id = %id, removed, "record delete");
        Ok(removed)
    }

    pub async fn get(&self, id: &str) -> Result<SecretRecord, StoreError> {
        let row = self
            .fetch_row(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        self.hydrate(row).await
    }

    /// All records, most recently updated first.
    pub async fn list(&self) -> Result<Vec<SecretRecord>, StoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records ORDER BY updated_at DESC, id DESC");
        let rows: Vec<RecordRow> = sqlx::query_as(&sql).fetch_all(self.store.pool()).await?;
        self.hydrate_all(rows).await
    }

    pub async fn list_favorites(&self) -> Result<Vec<SecretRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE is_favorite = 1 \
             ORDER BY updated_at DESC, id DESC"
        );
        let rows: Vec<RecordRow> = sqlx::query_as(&sql).fetch_all(self.store.pool()).await?;
        self.hydrate_all(rows).await
    }

    pub async fn list_by_category(&self, category_id: &str) -> Result<Vec<SecretRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE category_id = ? \
             ORDER BY updated_at DESC, id DESC"
        );
        let rows: Vec<RecordRow> = sqlx::query_as(&sql)
            .bind(category_id)
            .fetch_all(self.store.pool())
            .await?;
        self.hydrate_all(rows).await
    }

    /// Case-insensitive substring match on title, username and website.
    pub async fn search(&self, query: &str) -> Result<Vec<SecretRecord>, StoreError> {
        let pattern = format!("%{}%", escape_like(query.trim()));
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records \
             WHERE title LIKE ?1 ESCAPE '\\' OR username LIKE ?1 ESCAPE '\\' \
             OR website LIKE ?1 ESCAPE '\\' \
             ORDER BY updated_at DESC, id DESC"
        );
        let rows: Vec<RecordRow> = sqlx::query_as(&sql)
            .bind(&pattern)
            .fetch_all(self.store.pool())
            .await?;
        self.hydrate_all(rows).await
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(self.store.pool())
            .await?)
    }

    /// Delete every record. Returns the number removed.
    pub async fn clear_all(&self, _confirm: ConfirmWipe) -> Result<u64, StoreError> {
        let _w = self.store.write_guard().await;
        let result = sqlx::query("DELETE FROM records")
            .execute(self.store.pool())
            .await?;
        info!(removed = result.rows_affected(), "all records wiped");
        Ok(result.rows_affected())
    }

    /// Insert a record keeping its id and timestamps. An existing row with the
    /// same id wins; returns whether a row was written.
    pub(crate) async fn insert_migrated(&self, record: MigratedRecord) -> Result<bool, StoreError> {
        let _guard = self.locks.lock(&record.id).await;
        let _w = self.store.write_guard().await;
        let result = sqlx::query(
            "INSERT INTO records (id, title, username, secret_enc, website, notes, \
             category_id, is_favorite, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.username)
        .bind(record.secret.as_str())
        .bind(&record.website)
        .bind(&record.notes)
        .bind(&record.category_id)
        .bind(record.is_favorite)
        .bind(record.created_at)
        .bind(record.updated_at.max(record.created_at))
        .execute(self.store.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub(crate) async fn contains(&self, id: &str) -> Result<bool, StoreError> {
        Ok(
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM records WHERE id = ?)")
                .bind(id)
                .fetch_one(self.store.pool())
                .await?,
        )
    }

    async fn fetch_row(&self, id: &str) -> Result<Option<RecordRow>, StoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?");
        Ok(sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.store.pool())
            .await?)
    }

    async fn hydrate_all(&self, rows: Vec<RecordRow>) -> Result<Vec<SecretRecord>, StoreError> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.hydrate(row).await?);
        }
        Ok(out)
    }

    /// Decrypt one row. A token that fails authentication degrades only this
    /// record; an unavailable key fails the whole call.
    async fn hydrate(&self, row: RecordRow) -> Result<SecretRecord, StoreError> {
        let token = EncryptedField::from_stored(row.secret_enc.clone());
        let secret = match self.engine.decrypt_field(&token).await {
            Ok(plain) => RecordSecret::Plain(plain),
            Err(CryptoError::AuthenticationFailed(reason)) => {
                warn!(id = %row.id, %reason, "record secret failed authentication");
                RecordSecret::Unreadable(reason)
            }
            Err(e) => return Err(e.into()),
        };
        hydrate_with(row, secret)
    }
}

fn hydrate_with(row: RecordRow, secret: RecordSecret) -> Result<SecretRecord, StoreError> {
    Ok(SecretRecord {
        created_at: from_micros(row.created_at)?,
        updated_at: from_micros(row.updated_at)?,
        id: row.id,
        title: row.title,
        username: row.username,
        secret,
        website: row.website,
        notes: row.notes,
        category_id: row.category_id,
        is_favorite: row.is_favorite,
    })
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
