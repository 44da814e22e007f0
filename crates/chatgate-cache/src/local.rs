//! In-process expiring store.
//!
//! The fallback tier used when no networked cache is configured. Entries live
//! in a [`DashMap`] keyed by physical key, each carrying its own deadline.
//!
//! ## Expiry
//!
//! - **Lazy**: every read checks the deadline and treats an expired entry as
//!   missing (removing it on the way out), so correctness never depends on
//!   the sweep having run.
//! - **Sweep**: a background task owned by the store removes expired entries
//!   every `sweep_interval`, bounding memory under write-heavy workloads.
//!   It is started on construction and stopped by [`CacheStore::shutdown`]
//!   or when the store is dropped.
//!
//! This store is process-local. Two server instances running on it do not
//! share rate-limit windows, sessions or blacklists: single-instance only.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::{CacheError, CacheResult};
use crate::store::{BackendKind, CacheStore};

/// A stored value with its deadline.
#[derive(Clone, Debug)]
struct StoredEntry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl StoredEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process key/value map with per-entry TTL and a periodic sweep.
pub struct ExpiringStore {
    entries: Arc<DashMap<String, StoredEntry>>,
    sweep_interval: Duration,
    cancel: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ExpiringStore {
    /// Creates the store and starts its sweep task on the current Tokio
    /// runtime. Outside a runtime the store still works, relying on lazy
    /// expiry alone.
    pub fn new(sweep_interval: Duration) -> Self {
        let store = Self {
            entries: Arc::new(DashMap::new()),
            sweep_interval,
            cancel: CancellationToken::new(),
            sweeper: Mutex::new(None),
        };
        store.start_sweeper();
        store
    }

    fn start_sweeper(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no Tokio runtime; expiring store sweep disabled, lazy expiry only");
            return;
        };

        let entries = Arc::clone(&self.entries);
        let cancel = self.cancel.clone();
        let period = self.sweep_interval;

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = sweep(&entries);
                        if removed > 0 {
                            tracing::debug!(removed, remaining = entries.len(), "swept expired cache entries");
                        }
                    }
                }
            }
            tracing::debug!("expiring store sweep stopped");
        });

        *self.sweeper.lock() = Some(task);
    }

    /// Removes every expired entry now. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        sweep(&self.entries)
    }

    /// Number of entries held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the background sweep is still running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

fn sweep(entries: &DashMap<String, StoredEntry>) -> usize {
    let now = Instant::now();
    let mut removed = 0;
    entries.retain(|_, entry| {
        if entry.is_expired_at(now) {
            removed += 1;
            false
        } else {
            true
        }
    });
    removed
}

fn parse_integer(data: &[u8]) -> Option<i64> {
    std::str::from_utf8(data).ok()?.trim().parse().ok()
}

impl Drop for ExpiringStore {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl CacheStore for ExpiringStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        if ttl.is_zero() {
            return Err(CacheError::ZeroTtl);
        }
        self.entries
            .insert(key.to_string(), StoredEntry::new(value, ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => return Ok(Some(entry.data.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired_at(now));
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired_at(now)))
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => return Ok(true),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired_at(now));
        }
        Ok(false)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        if ttl.is_zero() {
            return Err(CacheError::ZeroTtl);
        }
        let now = Instant::now();

        // The entry guard holds the shard lock, so the read-modify-write is
        // atomic with respect to other callers on this instance.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired_at(now) {
                    *entry = StoredEntry::new(b"1".to_vec(), ttl);
                    return Ok(1);
                }

                let next = parse_integer(&entry.data)
                    .ok_or_else(|| CacheError::NotAnInteger {
                        key: key.to_string(),
                    })?
                    .checked_add(1)
                    .ok_or_else(|| CacheError::backend("increment would overflow"))?;

                entry.data = next.to_string().into_bytes();
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry::new(b"1".to_vec(), ttl));
                Ok(1)
            }
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> CacheResult<Vec<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.is_expired_at(now))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let now = Instant::now();
        let mut removed = 0u64;
        self.entries.retain(|key, entry| {
            if key.starts_with(prefix) {
                if !entry.is_expired_at(now) {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }

    fn local_entries(&self) -> Option<usize> {
        Some(self.entries.len())
    }

    async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.sweeper.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "expiring store sweep task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ExpiringStore {
        ExpiringStore::new(Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = store();
        store
            .set("k", b"value".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(b"value".to_vec()));
        assert!(store.exists("k").await.unwrap());
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let store = store();
        let err = store.set("k", b"v".to_vec(), Duration::ZERO).await;
        assert!(matches!(err, Err(CacheError::ZeroTtl)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_lazy_expiry_without_sweep() {
        let store = store();
        store
            .set("k", b"v".to_vec(), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;

        // Sweep runs every 5 minutes, so only lazy expiry can hide this entry.
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_increment_creates_and_counts() {
        let store = store();
        let ttl = Duration::from_secs(60);
        assert_eq!(store.increment("c", ttl).await.unwrap(), 1);
        assert_eq!(store.increment("c", ttl).await.unwrap(), 2);
        assert_eq!(store.increment("c", ttl).await.unwrap(), 3);
        assert_eq!(store.get("c").await.unwrap(), Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn test_increment_keeps_existing_expiry() {
        let store = store();
        store
            .set("c", b"10".to_vec(), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(
            store.increment("c", Duration::from_secs(60)).await.unwrap(),
            11
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.get("c").await.unwrap(), None);
        // An expired counter restarts from zero.
        assert_eq!(
            store.increment("c", Duration::from_secs(60)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_increment_rejects_non_integer() {
        let store = store();
        store
            .set("c", b"\"text\"".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        let err = store.increment("c", Duration::from_secs(60)).await;
        assert!(matches!(err, Err(CacheError::NotAnInteger { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_exact() {
        let store = Arc::new(store());
        let mut tasks = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store.increment("c", Duration::from_secs(60)).await.unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.get("c").await.unwrap(), Some(b"50".to_vec()));
    }

    #[tokio::test]
    async fn test_prefix_operations() {
        let store = store();
        let ttl = Duration::from_secs(60);
        store.set("p:a:1", b"1".to_vec(), ttl).await.unwrap();
        store.set("p:a:2", b"2".to_vec(), ttl).await.unwrap();
        store.set("p:b:1", b"3".to_vec(), ttl).await.unwrap();

        let mut keys = store.keys_with_prefix("p:a:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["p:a:1".to_string(), "p:a:2".to_string()]);

        assert_eq!(store.delete_prefix("p:a:").await.unwrap(), 2);
        assert!(store.get("p:a:1").await.unwrap().is_none());
        assert!(store.get("p:b:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_reports_live_entries_only() {
        let store = store();
        store
            .set("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let store = store();
        for i in 0..3 {
            store
                .set(&format!("k{i}"), b"v".to_vec(), Duration::from_millis(10))
                .await
                .unwrap();
        }
        store
            .set("keep", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.sweep_expired(), 3);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_background_sweep_runs_and_stops() {
        let store = ExpiringStore::new(Duration::from_millis(20));
        assert!(store.is_sweeping());
        store
            .set("k", b"v".to_vec(), Duration::from_millis(5))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.len(), 0);

        store.shutdown().await;
        assert!(!store.is_sweeping());
        // Idempotent.
        store.shutdown().await;
    }

    #[test]
    fn test_works_outside_runtime() {
        let store = ExpiringStore::new(Duration::from_secs(1));
        assert!(!store.is_sweeping());
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            store
                .set("k", b"v".to_vec(), Duration::from_secs(60))
                .await
                .unwrap();
            assert!(store.exists("k").await.unwrap());
        });
    }
}
