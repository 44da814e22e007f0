//! Periodic housekeeping.
//!
//! Cache entries expire on their own. What does not is the per-user session
//! index, which keeps ids of sessions that have since expired or been
//! revoked until something prunes it.

use std::time::Duration;

use chatgate_auth::SessionStore;
use chatgate_cache::CacheManager;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Runs one maintenance pass. Returns how many index entries were pruned.
pub async fn run_maintenance(sessions: &SessionStore, cache: &CacheManager) -> Option<usize> {
    let health = cache.health().await;
    if !health.healthy {
        tracing::warn!(backend = %health.backend, "cache unhealthy, skipping maintenance pass");
        return None;
    }

    let pruned = sessions.prune_all_indexes().await;
    match pruned {
        Some(0) => tracing::debug!("maintenance pass completed, nothing to prune"),
        Some(n) => tracing::info!(pruned = n, local_entries = ?health.local_entries, "session indexes pruned"),
        None => tracing::warn!("session index pruning failed"),
    }
    pruned
}

/// Spawns the maintenance loop. Stops when `cancel` fires.
pub fn start_maintenance_task(
    sessions: SessionStore,
    cache: CacheManager,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("maintenance task stopped");
                    break;
                }
                _ = ticker.tick() => {
                    run_maintenance(&sessions, &cache).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatgate_auth::{SessionConfig, TokenIdentifier};
    use chatgate_cache::CacheConfig;

    #[tokio::test]
    async fn test_pass_prunes_revoked_sessions() {
        let cache = CacheManager::local(&CacheConfig::default());
        let sessions = SessionStore::new(cache.clone(), &SessionConfig::default());
        let id = sessions
            .create_session(
                "user1",
                TokenIdentifier::from_raw("a"),
                TokenIdentifier::from_raw("r"),
                Duration::from_secs(60),
                None,
            )
            .await
            .unwrap();
        sessions.revoke_session(id).await.unwrap();

        assert_eq!(run_maintenance(&sessions, &cache).await, Some(1));
        assert_eq!(run_maintenance(&sessions, &cache).await, Some(0));
    }

    #[tokio::test]
    async fn test_task_stops_on_cancel() {
        let cache = CacheManager::local(&CacheConfig::default());
        let sessions = SessionStore::new(cache.clone(), &SessionConfig::default());
        let cancel = CancellationToken::new();

        let handle = start_maintenance_task(sessions, cache, Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(35)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task exits after cancel")
            .expect("task did not panic");
    }
}
