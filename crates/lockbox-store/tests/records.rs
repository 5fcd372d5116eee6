use std::path::Path;

use lockbox_crypto::error::AuthFailure;
use lockbox_crypto::{
    legacy, CipherEngine, CryptoError, FileKeySlot, KeyManager, KeySlot, MasterKey,
};
use lockbox_store::{
    ConfirmWipe, Lockbox, NewRecord, RecordSecret, RecordStore, RecordUpdate, Settings, Store,
    StoreError,
};
use tempfile::tempdir;

fn mail() -> NewRecord {
    NewRecord {
        title: "Mail".into(),
        username: "a@b.com".into(),
        secret: "Tr0ub4dor&3".into(),
        category_id: "1".into(),
        ..NewRecord::default()
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn raw_database_bytes(db: &Path) -> Vec<u8> {
    let mut bytes = Vec::new();
    for suffix in ["", "-wal", "-shm"] {
        let mut name = db.as_os_str().to_owned();
        name.push(suffix);
        if let Ok(b) = std::fs::read(&name) {
            bytes.extend(b);
        }
    }
    bytes
}

#[tokio::test]
async fn created_secret_lists_back_and_never_hits_disk_in_clear() {
    let dir = tempdir().unwrap();
    let settings = Settings::default();
    let lockbox = Lockbox::open(dir.path(), &settings).await.unwrap();

    lockbox.records.create(mail()).await.unwrap();

    let listed = lockbox.records.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Mail");
    assert_eq!(listed[0].username, "a@b.com");
    assert_eq!(listed[0].secret.as_plain(), Some("Tr0ub4dor&3"));

    let on_disk = raw_database_bytes(&settings.database_path(dir.path()));
    assert!(!on_disk.is_empty());
    assert!(!contains(&on_disk, b"Tr0ub4dor&3"));
    assert!(contains(&on_disk, b"a@b.com"));

    let snapshot = lockbox.store.export_snapshot().await.unwrap();
    assert!(!contains(&snapshot, b"Tr0ub4dor&3"));
}

#[tokio::test]
async fn record_lifecycle() {
    let dir = tempdir().unwrap();
    let lockbox = Lockbox::open(dir.path(), &Settings::default()).await.unwrap();
    let records = &lockbox.records;

    let created = records.create(mail()).await.unwrap();
    assert_eq!(created.created_at, created.updated_at);
    assert!(!created.is_favorite);

    let fetched = records.get(&created.id).await.unwrap();
    assert_eq!(fetched, created);

    let changed = records
        .update(
            &created.id,
            RecordUpdate {
                secret: Some("correct horse battery staple".into()),
                website: Some(Some("https://mail.example".into())),
                ..RecordUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(changed.username, "a@b.com");
    assert!(changed.updated_at > created.updated_at);
    assert_eq!(
        records.get(&created.id).await.unwrap().secret.as_plain(),
        Some("correct horse battery staple")
    );

    let cleared = records
        .update(
            &created.id,
            RecordUpdate {
                website: Some(None),
                ..RecordUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.website, None);

    assert!(records.delete(&created.id).await.unwrap());
    assert!(matches!(
        records.get(&created.id).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let dir = tempdir().unwrap();
    let lockbox = Lockbox::open(dir.path(), &Settings::default()).await.unwrap();
    let created = lockbox.records.create(mail()).await.unwrap();

    assert!(lockbox.records.delete(&created.id).await.unwrap());
    assert!(!lockbox.records.delete(&created.id).await.unwrap());
    assert!(!lockbox.records.delete("never-existed").await.unwrap());
    assert_eq!(lockbox.records.count().await.unwrap(), 0);
}

#[tokio::test]
async fn list_is_most_recently_updated_first() {
    let dir = tempdir().unwrap();
    let lockbox = Lockbox::open(dir.path(), &Settings::default()).await.unwrap();
    let records = &lockbox.records;

    let first = records.create(mail()).await.unwrap();
    let second = records
        .create(NewRecord {
            title: "Bank".into(),
            ..mail()
        })
        .await
        .unwrap();
    records.set_favorite(&first.id, true).await.unwrap();

    let ids: Vec<String> = records
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_storage() {
    let dir = tempdir().unwrap();
    let lockbox = Lockbox::open(dir.path(), &Settings::default()).await.unwrap();
    let err = lockbox
        .records
        .create(NewRecord {
            username: String::new(),
            ..mail()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(lockbox.records.count().await.unwrap(), 0);

    let created = lockbox.records.create(mail()).await.unwrap();
    let err = lockbox
        .records
        .update(
            &created.id,
            RecordUpdate {
                title: Some(String::new()),
                ..RecordUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(lockbox.records.get(&created.id).await.unwrap().title, "Mail");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_to_one_record_do_not_clobber() {
    let dir = tempdir().unwrap();
    let lockbox = Lockbox::open(dir.path(), &Settings::default()).await.unwrap();
    let created = lockbox.records.create(mail()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let records = lockbox.records.clone();
        let id = created.id.clone();
        handles.push(tokio::spawn(async move {
            let change = if i % 2 == 0 {
                RecordUpdate {
                    notes: Some(Some(format!("note {i}"))),
                    ..RecordUpdate::default()
                }
            } else {
                RecordUpdate {
                    secret: Some(format!("secret {i}")),
                    ..RecordUpdate::default()
                }
            };
            records.update(&id, change).await.unwrap().updated_at
        }));
    }
    let mut stamps = Vec::new();
    for h in handles {
        stamps.push(h.await.unwrap());
    }
    stamps.sort();
    stamps.dedup();
    assert_eq!(stamps.len(), 16, "every update got its own updated_at");

    let last = lockbox.records.get(&created.id).await.unwrap();
    assert_eq!(last.updated_at, *stamps.last().unwrap());
    assert!(last.notes.unwrap().starts_with("note "));
    assert!(last.secret.as_plain().unwrap().starts_with("secret "));
    assert_eq!(last.title, "Mail");
}

#[tokio::test]
async fn wipe_removes_everything() {
    let dir = tempdir().unwrap();
    let lockbox = Lockbox::open(dir.path(), &Settings::default()).await.unwrap();
    for _ in 0..3 {
        lockbox.records.create(mail()).await.unwrap();
    }
    let confirm = ConfirmWipe::from_phrase(ConfirmWipe::PHRASE).unwrap();
    assert_eq!(lockbox.records.clear_all(confirm).await.unwrap(), 3);
    assert!(lockbox.records.list().await.unwrap().is_empty());
    assert_eq!(lockbox.store.stats().await.unwrap().categories, 6);
}

#[tokio::test]
async fn snapshot_restores_into_a_readable_store() {
    let dir = tempdir().unwrap();
    let lockbox = Lockbox::open(dir.path(), &Settings::default()).await.unwrap();
    lockbox.records.create(mail()).await.unwrap();
    lockbox
        .records
        .create(NewRecord {
            title: "Bank".into(),
            secret: "pin 0000".into(),
            ..mail()
        })
        .await
        .unwrap();
    let bytes = lockbox.store.export_snapshot().await.unwrap();

    let restored_path = dir.path().join("restored.db");
    let restored = Store::restore_snapshot(&bytes, &restored_path).await.unwrap();
    let keys = KeyManager::new(FileKeySlot::new(dir.path().join("master.key")));
    let records = RecordStore::new(restored, CipherEngine::new(keys));

    assert_eq!(records.list().await.unwrap(), lockbox.records.list().await.unwrap());
    assert!(Store::restore_snapshot(&bytes, &restored_path).await.is_err());
}

#[tokio::test]
async fn orphaned_category_resolves_to_uncategorized() {
    let dir = tempdir().unwrap();
    let lockbox = Lockbox::open(dir.path(), &Settings::default()).await.unwrap();
    let travel = lockbox
        .categories
        .add(lockbox_store::NewCategory::named("Travel"))
        .await
        .unwrap();
    let record = lockbox
        .records
        .create(NewRecord {
            category_id: travel.id.clone(),
            ..mail()
        })
        .await
        .unwrap();

    lockbox.categories.delete(&travel.id).await.unwrap();

    let kept = lockbox.records.get(&record.id).await.unwrap();
    assert_eq!(kept.category_id, travel.id);
    let resolved = lockbox.categories.resolve(&kept.category_id).await.unwrap();
    assert_eq!(resolved.display_name(), "Uncategorized");
}

#[tokio::test]
async fn planted_legacy_token_is_unreadable_not_trusted() {
    let dir = tempdir().unwrap();
    let lockbox = Lockbox::open(dir.path(), &Settings::default()).await.unwrap();
    let record = lockbox.records.create(mail()).await.unwrap();

    sqlx::query("UPDATE records SET secret_enc = ? WHERE id = ?")
        .bind(format!("lockbox0:{}", legacy::encode("chosen-by-writer")))
        .bind(&record.id)
        .execute(lockbox.store.pool())
        .await
        .unwrap();

    let fetched = lockbox.records.get(&record.id).await.unwrap();
    assert_eq!(
        fetched.secret,
        RecordSecret::Unreadable(AuthFailure::UnsupportedVersion)
    );
    let listed = lockbox.records.list().await.unwrap();
    assert_eq!(listed[0].secret.as_plain(), None);
}

struct OfflineSlot;

impl KeySlot for OfflineSlot {
    fn load(&self) -> Result<Option<MasterKey>, CryptoError> {
        Err(CryptoError::KeyUnavailable("token removed".into()))
    }

    fn store_if_absent(&self, _key: &MasterKey) -> Result<MasterKey, CryptoError> {
        Err(CryptoError::KeyUnavailable("token removed".into()))
    }

    fn describe(&self) -> String {
        "offline".into()
    }
}

fn is_key_unavailable<T>(result: &Result<T, StoreError>) -> bool {
    matches!(result, Err(StoreError::Crypto(CryptoError::KeyUnavailable(_))))
}

#[tokio::test]
async fn unavailable_key_reaches_callers_instead_of_unreadable_markers() {
    let dir = tempdir().unwrap();
    let lockbox = Lockbox::open(dir.path(), &Settings::default()).await.unwrap();
    let existing = lockbox.records.create(mail()).await.unwrap();

    let offline = RecordStore::new(
        lockbox.store.clone(),
        CipherEngine::new(KeyManager::new(OfflineSlot)),
    );

    assert!(is_key_unavailable(&offline.create(mail()).await));
    assert!(is_key_unavailable(&offline.get(&existing.id).await));
    assert!(is_key_unavailable(&offline.list().await));
    assert_eq!(lockbox.records.count().await.unwrap(), 1);
}
