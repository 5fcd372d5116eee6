//! AccessGate: lock state with inactivity auto-lock.
//!
//! Callers consult the gate before touching [`crate::RecordStore`]; the store
//! itself does not check it. While locked, no RecordStore method should be
//! called.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_AUTO_LOCK_MINUTES: u64 = 5;

struct GateState {
    /// `None` while locked.
    last_activity: Option<Instant>,
    /// `None` disables auto-lock.
    auto_lock: Option<Duration>,
}

impl GateState {
    fn expired(&self, now: Instant) -> bool {
        match (self.last_activity, self.auto_lock) {
            (Some(at), Some(limit)) => now.duration_since(at) >= limit,
            _ => false,
        }
    }
}

/// Thread-safe gate handle. Clones share state. Starts locked.
#[derive(Clone)]
pub struct AccessGate {
    inner: Arc<RwLock<GateState>>,
}

impl AccessGate {
    /// `auto_lock_minutes == 0` disables auto-lock.
    pub fn new(auto_lock_minutes: u64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(GateState {
                last_activity: None,
                auto_lock: minutes(auto_lock_minutes),
            })),
        }
    }

    /// Called once the user has passed whatever unlock check the host uses.
    pub async fn unlock(&self) {
        let mut state = self.inner.write().await;
        state.last_activity = Some(Instant::now());
        debug!("access gate unlocked");
    }

    pub async fn lock(&self) {
        let mut state = self.inner.write().await;
        state.last_activity = None;
        debug!("access gate locked");
    }

    /// True when locked or when the inactivity limit has passed. An expired
    /// gate transitions to locked.
    pub async fn is_locked(&self) -> bool {
        {
            let state = self.inner.read().await;
            match state.last_activity {
                None => return true,
                Some(_) if !state.expired(Instant::now()) => return false,
                Some(_) => {}
            }
        }
        let mut state = self.inner.write().await;
        if state.expired(Instant::now()) {
            state.last_activity = None;
            debug!("access gate auto-locked");
        }
        state.last_activity.is_none()
    }

    /// Reset the inactivity timer. No effect while locked.
    pub async fn touch(&self) {
        let mut state = self.inner.write().await;
        if state.last_activity.is_some() && !state.expired(Instant::now()) {
            state.last_activity = Some(Instant::now());
        }
    }

    /// Time left before auto-lock. `None` when locked or auto-lock is off.
    pub async fn time_until_lock(&self) -> Option<Duration> {
        let state = self.inner.read().await;
        let at = state.last_activity?;
        let limit = state.auto_lock?;
        Some(limit.saturating_sub(Instant::now().duration_since(at)))
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(DEFAULT_AUTO_LOCK_MINUTES)
    }
}

fn minutes(m: u64) -> Option<Duration> {
    (m > 0).then(|| Duration::from_secs(m.saturating_mul(60)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_locked_and_unlocks() {
        let gate = AccessGate::default();
        assert!(gate.is_locked().await);
        gate.unlock().await;
        assert!(!gate.is_locked().await);
        gate.lock().await;
        assert!(gate.is_locked().await);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_locks_after_inactivity() {
        let gate = AccessGate::new(5);
        gate.unlock().await;

        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        gate.touch().await;
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        assert!(!gate.is_locked().await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(gate.is_locked().await);
        gate.touch().await;
        assert!(gate.is_locked().await);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_time_left_before_auto_lock() {
        let gate = AccessGate::new(5);
        assert_eq!(gate.time_until_lock().await, None);
        gate.unlock().await;
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(gate.time_until_lock().await, Some(Duration::from_secs(210)));
    }

    #[tokio::test]
    async fn huge_auto_lock_setting_does_not_overflow() {
        let gate = AccessGate::new(u64::MAX);
        gate.unlock().await;
        assert!(!gate.is_locked().await);
        assert_eq!(
            gate.time_until_lock().await.map(|d| d > Duration::from_secs(u64::MAX / 2)),
            Some(true)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_minutes_disables_auto_lock() {
        let gate = AccessGate::new(0);
        gate.unlock().await;
        tokio::time::advance(Duration::from_secs(24 * 3600)).await;
        assert!(!gate.is_locked().await);
        assert_eq!(gate.time_until_lock().await, None);
    }
}
