//! lockbox-store: encrypted record storage.
//!
//! # Storage model
//! - SQLite via sqlx, WAL journal, schema migrations in `migrations/`.
//! - One `records` table keyed by id. The secret column only ever holds a
//!   versioned ciphertext token from `lockbox-crypto`; titles, usernames and
//!   other metadata stay plaintext so they can be searched.
//! - One `categories` table, seeded with the defaults on first open.
//! - The master key lives outside the database, in a key slot.
//!
//! # Legacy import
//! [`MigrationCoordinator`] moves entries from the old flat key-value file
//! into the record table once, verifies the count and only then erases the
//! old data.

pub mod access;
pub mod app;
pub mod categories;
pub mod db;
pub mod error;
pub mod legacy;
pub mod migration;
pub mod models;
pub mod paths;
pub mod records;
pub mod settings;

pub use access::AccessGate;
pub use app::Lockbox;
pub use categories::{CategoryStore, CategoryUpdate, NewCategory};
pub use db::{Store, StoreStats};
pub use error::StoreError;
pub use legacy::LegacyStore;
pub use migration::{
    LegacySecretFormat, MigrationCoordinator, MigrationReport, MigrationState, MigrationStatus,
};
pub use models::{Category, CategoryRef, NewRecord, RecordSecret, RecordUpdate, SecretRecord};
pub use records::{ConfirmWipe, RecordStore};
pub use settings::{KeyBackend, Settings};
