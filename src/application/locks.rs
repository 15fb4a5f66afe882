//! Per-key mutual exclusion. Records with different keys never contend.

use crate::error::{Result, ShiftpayError};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Clone + Debug> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: &K) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Drop entries nobody holds or waits on.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Waits until the key is free.
    pub async fn acquire(&self, key: &K) -> OwnedMutexGuard<()> {
        self.lock_for(key).lock_owned().await
    }

    /// Waits at most `timeout`, then reports a conflict.
    pub async fn acquire_within(&self, key: &K, timeout: Duration) -> Result<OwnedMutexGuard<()>> {
        tokio::time::timeout(timeout, self.lock_for(key).lock_owned())
            .await
            .map_err(|_| {
                ShiftpayError::ConcurrencyConflict(format!(
                    "{key:?} is busy with another transition"
                ))
            })
    }

    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl<K: Eq + Hash + Clone + Debug> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = KeyedLocks::new();
        let guard = locks.acquire(&1u32).await;

        let result = locks.acquire_within(&1u32, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ShiftpayError::ConcurrencyConflict(_))));

        drop(guard);
        assert!(locks.acquire_within(&1u32, Duration::from_millis(20)).await.is_ok());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_contend() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire(&1u32).await;
        let b = locks.acquire_within(&2u32, Duration::from_millis(20)).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_released_keys_are_forgotten() {
        let locks = KeyedLocks::new();
        for key in 0..50u32 {
            let _guard = locks.acquire(&key).await;
        }
        let _last = locks.acquire(&99u32).await;
        assert_eq!(locks.tracked(), 1);
    }
}
