//! KeyManager: single-flight access to the persisted master key.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use crate::error::CryptoError;
use crate::key::MasterKey;
use crate::keyslot::KeySlot;

/// Cheap to clone; clones share the slot and the cached key.
#[derive(Clone)]
pub struct KeyManager {
    slot: Arc<dyn KeySlot>,
    cached: Arc<OnceCell<MasterKey>>,
}

impl KeyManager {
    pub fn new(slot: impl KeySlot) -> Self {
        Self::from_shared(Arc::new(slot))
    }

    pub fn from_shared(slot: Arc<dyn KeySlot>) -> Self {
        Self {
            slot,
            cached: Arc::new(OnceCell::new()),
        }
    }

    /// Return the persisted key, generating and persisting one on first use.
    ///
    /// Concurrent first callers share one initialization. A failed attempt
    /// leaves the cell empty so a later call retries against the slot.
    pub async fn get_or_create_key(&self) -> Result<&MasterKey, CryptoError> {
        self.cached
            .get_or_try_init(|| {
                let slot = Arc::clone(&self.slot);
                async move {
                    tokio::task::spawn_blocking(move || load_or_create(slot.as_ref()))
                        .await
                        .map_err(|e| CryptoError::key_unavailable(format!("key task: {e}")))?
                }
            })
            .await
    }

    pub fn describe_slot(&self) -> String {
        self.slot.describe()
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("slot", &self.slot.describe())
            .field("loaded", &self.cached.initialized())
            .finish()
    }
}

fn load_or_create(slot: &dyn KeySlot) -> Result<MasterKey, CryptoError> {
    if let Some(key) = slot.load()? {
        return Ok(key);
    }
    let fresh = MasterKey::generate()?;
    let persisted = slot.store_if_absent(&fresh)?;
    info!(slot = %slot.describe(), "created master key");
    Ok(persisted)
}
