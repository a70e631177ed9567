//! Per-asset mutual exclusion.
//!
//! SQLite has no row-level `SELECT ... FOR UPDATE`, so rotation steps for the
//! same asset are serialized in-process by an async mutex per asset id. The
//! write transaction that follows starts with an `UPDATE` on the asset row,
//! which also serializes writers from other processes sharing the file.
//!
//! Waiting is bounded: a caller that cannot take the lock within the
//! configured wait gets [`DbError::LockTimeout`] and nothing is written.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::{DbError, Result};
use crate::metrics::METRICS;

/// Dead entries are swept once the table grows past this many ids.
const SWEEP_THRESHOLD: usize = 1024;

/// Registry of per-asset locks, shared by every clone of the database handle.
#[derive(Debug, Default)]
pub struct AssetLocks {
    slots: Mutex<HashMap<i64, Weak<AsyncMutex<()>>>>,
}

/// Holds the lock for one asset until dropped.
#[derive(Debug)]
pub struct AssetLockGuard {
    asset_id: i64,
    _guard: OwnedMutexGuard<()>,
}

impl AssetLockGuard {
    pub fn asset_id(&self) -> i64 {
        self.asset_id
    }
}

impl AssetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, asset_id: i64) -> Arc<AsyncMutex<()>> {
        // The std mutex is only held for the map lookup, never across an await.
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(existing) = slots.get(&asset_id).and_then(Weak::upgrade) {
            return existing;
        }

        if slots.len() >= SWEEP_THRESHOLD {
            slots.retain(|_, slot| slot.strong_count() > 0);
        }

        let fresh = Arc::new(AsyncMutex::new(()));
        slots.insert(asset_id, Arc::downgrade(&fresh));
        fresh
    }

    /// Take the lock for `asset_id`.
    ///
    /// `wait = None` blocks until the lock is free.
    pub async fn acquire(&self, asset_id: i64, wait: Option<Duration>) -> Result<AssetLockGuard> {
        let slot = self.slot(asset_id);
        let started = Instant::now();

        let guard = match wait {
            None => slot.lock_owned().await,
            Some(limit) => match tokio::time::timeout(limit, slot.lock_owned()).await {
                Ok(guard) => guard,
                Err(_) => {
                    METRICS.inc_lock_timeouts();
                    warn!(asset_id, waited_ms = limit.as_millis() as u64, "Asset lock wait timed out");
                    return Err(DbError::LockTimeout {
                        asset_id,
                        waited: limit,
                    });
                }
            },
        };

        let waited = started.elapsed();
        if waited > Duration::from_millis(50) {
            debug!(asset_id, waited_ms = waited.as_millis() as u64, "Asset lock acquired after contention");
        }

        Ok(AssetLockGuard {
            asset_id,
            _guard: guard,
        })
    }

    /// Number of ids with a live lock (held or awaited).
    pub fn active(&self) -> usize {
        match self.slots.lock() {
            Ok(slots) => slots.values().filter(|s| s.strong_count() > 0).count(),
            Err(poisoned) => poisoned
                .into_inner()
                .values()
                .filter(|s| s.strong_count() > 0)
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_asset_is_exclusive() {
        let locks = AssetLocks::new();
        let first = locks.acquire(1, None).await.unwrap();

        let err = locks
            .acquire(1, Some(Duration::from_millis(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::LockTimeout { asset_id: 1, .. }));

        drop(first);
        let again = locks.acquire(1, Some(Duration::from_millis(30))).await.unwrap();
        assert_eq!(again.asset_id(), 1);
    }

    #[tokio::test]
    async fn test_different_assets_do_not_contend() {
        let locks = AssetLocks::new();
        let _a = locks.acquire(1, None).await.unwrap();
        let b = locks.acquire(2, Some(Duration::from_millis(30))).await;
        assert!(b.is_ok());
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn test_released_slots_are_dropped() {
        let locks = AssetLocks::new();
        {
            let _guard = locks.acquire(9, None).await.unwrap();
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiters_are_serialized() {
        let locks = Arc::new(AssetLocks::new());
        let counter = Arc::new(Mutex::new(0u32));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(5, None).await.unwrap();
                let seen = *counter.lock().unwrap();
                tokio::task::yield_now().await;
                *counter.lock().unwrap() = seen + 1;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*counter.lock().unwrap(), 16);
    }
}
