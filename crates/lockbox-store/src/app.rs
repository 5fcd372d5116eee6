//! Wiring of one install's components. Constructed explicitly by the host
//! process and passed around; nothing here is global.

use std::path::{Path, PathBuf};

use lockbox_crypto::{CipherEngine, KeyManager};
use tracing::info;

use crate::access::AccessGate;
use crate::categories::CategoryStore;
use crate::db::Store;
use crate::error::StoreError;
use crate::legacy::LegacyStore;
use crate::migration::{MigrationCoordinator, MigrationReport};
use crate::paths;
use crate::records::RecordStore;
use crate::settings::Settings;

pub struct Lockbox {
    pub store: Store,
    pub records: RecordStore,
    pub categories: CategoryStore,
    pub gate: AccessGate,
    pub migration: MigrationCoordinator,
    data_dir: PathBuf,
}

impl Lockbox {
    /// Open the database and build the component graph. Does not touch the
    /// master key; that happens on the first secret-bearing call.
    pub async fn open(data_dir: &Path, settings: &Settings) -> Result<Self, StoreError> {
        paths::ensure_dir(data_dir)?;
        let store = Store::open(&settings.database_path(data_dir)).await?;
        let keys = KeyManager::from_shared(settings.key_slot(data_dir));
        info!(slot = %keys.describe_slot(), "key slot configured");

        let records = RecordStore::new(store.clone(), CipherEngine::new(keys));
        let migration = MigrationCoordinator::new(
            store.clone(),
            records.clone(),
            LegacyStore::new(settings.legacy_path(data_dir)),
            settings.legacy.secret_format,
        );
        Ok(Self {
            categories: CategoryStore::new(store.clone()),
            gate: AccessGate::new(settings.auto_lock_minutes),
            store,
            records,
            migration,
            data_dir: data_dir.to_path_buf(),
        })
    }

    /// `open` followed by the startup legacy import.
    pub async fn start(
        data_dir: &Path,
        settings: &Settings,
    ) -> Result<(Self, Option<MigrationReport>), StoreError> {
        let lockbox = Self::open(data_dir, settings).await?;
        let report = lockbox.migration.run_if_needed().await?;
        Ok((lockbox, report))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
