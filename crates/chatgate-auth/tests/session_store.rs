//! Session lifecycle and token revocation against the local cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatgate_auth::{
    DeviceInfo, FailurePolicy, InMemorySessionAudit, SessionAuditStore, SessionConfig,
    SessionError, SessionEventKind, SessionStore, TokenIdentifier,
};
use chatgate_cache::{BackendKind, CacheConfig, CacheError, CacheManager, CacheResult, CacheStore};

fn local_store() -> SessionStore {
    SessionStore::new(CacheManager::local(&CacheConfig::default()), &SessionConfig::default())
}

fn ids(n: u32) -> (TokenIdentifier, TokenIdentifier) {
    (
        TokenIdentifier::from_raw(&format!("access-{n}")),
        TokenIdentifier::from_raw(&format!("refresh-{n}")),
    )
}

const HOUR: Duration = Duration::from_secs(3600);

/// A backend that is always down.
struct DownStore;

#[async_trait]
impl CacheStore for DownStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Networked
    }
    async fn set(&self, _: &str, _: Vec<u8>, _: Duration) -> CacheResult<()> {
        Err(CacheError::connection("connection refused"))
    }
    async fn get(&self, _: &str) -> CacheResult<Option<Vec<u8>>> {
        Err(CacheError::connection("connection refused"))
    }
    async fn delete(&self, _: &str) -> CacheResult<bool> {
        Err(CacheError::connection("connection refused"))
    }
    async fn exists(&self, _: &str) -> CacheResult<bool> {
        Err(CacheError::connection("connection refused"))
    }
    async fn increment(&self, _: &str, _: Duration) -> CacheResult<i64> {
        Err(CacheError::connection("connection refused"))
    }
    async fn keys_with_prefix(&self, _: &str) -> CacheResult<Vec<String>> {
        Err(CacheError::connection("connection refused"))
    }
    async fn delete_prefix(&self, _: &str) -> CacheResult<u64> {
        Err(CacheError::connection("connection refused"))
    }
    async fn ping(&self) -> CacheResult<()> {
        Err(CacheError::connection("connection refused"))
    }
}

fn down_store(policy: FailurePolicy) -> SessionStore {
    let cache = CacheManager::with_store(Arc::new(DownStore), &CacheConfig::default());
    let config = SessionConfig {
        blacklist_failure_policy: policy,
        ..SessionConfig::default()
    };
    SessionStore::new(cache, &config)
}

#[tokio::test]
async fn create_and_get_session() {
    let store = local_store();
    let (access, refresh) = ids(1);
    let device = DeviceInfo {
        user_agent: Some("curl/8.5".into()),
        ip_address: Some("10.0.0.7".into()),
        label: None,
    };

    let id = store
        .create_session("user1", access.clone(), refresh.clone(), HOUR, Some(device.clone()))
        .await
        .unwrap();

    let record = store.get_session(id).await.expect("session stored");
    assert_eq!(record.user_id, "user1");
    assert_eq!(record.token_hash, access);
    assert_eq!(record.refresh_token_hash, refresh);
    assert!(record.is_active);
    assert_eq!(record.device_info, Some(device));
    assert_eq!(record.expires_at - record.created_at, time::Duration::hours(1));
}

#[tokio::test]
async fn touch_updates_activity_without_extending() {
    let store = local_store();
    let (access, refresh) = ids(1);
    let id = store.create_session("user1", access, refresh, HOUR, None).await.unwrap();
    let before = store.get_session(id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(store.touch_session(id).await);

    let after = store.get_session(id).await.unwrap();
    assert!(after.last_activity > before.last_activity);
    assert_eq!(after.expires_at, before.expires_at);
    assert!(!store.touch_session(uuid::Uuid::new_v4()).await);
}

#[tokio::test]
async fn revoke_session_blacklists_token_and_is_idempotent() {
    let store = local_store();
    let (access, refresh) = ids(1);
    let id = store
        .create_session("user1", access.clone(), refresh, HOUR, None)
        .await
        .unwrap();
    assert!(!store.is_token_blacklisted(&access).await);

    assert!(store.revoke_session(id).await.unwrap());
    assert!(store.is_token_blacklisted(&access).await);

    let record = store.get_session(id).await.expect("revoked session kept until expiry");
    assert!(!record.is_active);
    assert!(!store.touch_session(id).await);

    assert!(store.revoke_session(id).await.unwrap());
}

#[tokio::test]
async fn session_expires_naturally() {
    let store = local_store();
    let (access, refresh) = ids(1);
    let id = store
        .create_session("user1", access, refresh, Duration::from_secs(1), None)
        .await
        .unwrap();
    assert!(store.get_session(id).await.is_some());

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert!(store.get_session(id).await.is_none());
    assert!(!store.touch_session(id).await);
    assert!(!store.revoke_session(id).await.unwrap());
}

#[tokio::test]
async fn blacklist_entry_lives_as_long_as_the_token() {
    let store = local_store();
    let token = TokenIdentifier::from_raw("short-lived");

    assert!(store.blacklist_token(&token, Duration::from_secs(1)).await);
    assert!(store.is_token_blacklisted(&token).await);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert!(!store.is_token_blacklisted(&token).await);
}

#[tokio::test]
async fn rotation_blacklists_previous_token() {
    let store = local_store();
    let (old_access, old_refresh) = ids(1);
    let (new_access, new_refresh) = ids(2);
    let id = store
        .create_session("user1", old_access.clone(), old_refresh, HOUR, None)
        .await
        .unwrap();
    let before = store.get_session(id).await.unwrap();

    assert!(store.rotate_tokens(id, new_access.clone(), new_refresh.clone()).await.unwrap());

    let after = store.get_session(id).await.unwrap();
    assert_eq!(after.token_hash, new_access);
    assert_eq!(after.refresh_token_hash, new_refresh);
    assert_eq!(after.expires_at, before.expires_at);
    assert!(store.is_token_blacklisted(&old_access).await);
    assert!(!store.is_token_blacklisted(&new_access).await);

    store.revoke_session(id).await.unwrap();
    let (a, r) = ids(3);
    assert!(!store.rotate_tokens(id, a, r).await.unwrap());
}

#[tokio::test]
async fn sign_out_everywhere() {
    let store = local_store();
    let mut tokens = Vec::new();
    for n in 0..3 {
        let (access, refresh) = ids(n);
        store
            .create_session("user1", access.clone(), refresh, HOUR, None)
            .await
            .unwrap();
        tokens.push(access);
    }
    let (other_access, other_refresh) = ids(9);
    store
        .create_session("user2", other_access.clone(), other_refresh, HOUR, None)
        .await
        .unwrap();

    assert_eq!(store.list_user_sessions("user1").await.unwrap().len(), 3);
    assert_eq!(store.revoke_user_sessions("user1").await.unwrap(), 3);

    for token in &tokens {
        assert!(store.is_token_blacklisted(token).await);
    }
    assert!(store.list_user_sessions("user1").await.unwrap().is_empty());
    assert_eq!(store.list_user_sessions("user2").await.unwrap().len(), 1);
    assert!(!store.is_token_blacklisted(&other_access).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn sign_out_everywhere_survives_concurrent_logins() {
    let store = local_store();
    let logins: Vec<_> = (0..50)
        .map(|n| {
            let store = store.clone();
            tokio::spawn(async move {
                let (access, refresh) = ids(n);
                store
                    .create_session("user1", access.clone(), refresh, HOUR, None)
                    .await
                    .unwrap();
                access
            })
        })
        .collect();

    let mut tokens = Vec::new();
    for login in logins {
        tokens.push(login.await.unwrap());
    }

    assert_eq!(store.list_user_sessions("user1").await.unwrap().len(), 50);
    assert_eq!(store.revoke_user_sessions("user1").await.unwrap(), 50);
    assert!(store.list_user_sessions("user1").await.unwrap().is_empty());
    for token in &tokens {
        assert!(store.is_token_blacklisted(token).await);
    }
}

#[tokio::test]
async fn prune_drops_revoked_and_expired_entries() {
    let store = local_store();
    let (a1, r1) = ids(1);
    let (a2, r2) = ids(2);
    let (a3, r3) = ids(3);
    let revoked = store.create_session("user1", a1, r1, HOUR, None).await.unwrap();
    store.create_session("user1", a2, r2, Duration::from_secs(1), None).await.unwrap();
    store.create_session("user1", a3, r3, HOUR, None).await.unwrap();

    store.revoke_session(revoked).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    assert_eq!(store.prune_user_index("user1").await, Some(2));
    assert_eq!(store.prune_user_index("user1").await, Some(0));
    assert_eq!(store.prune_all_indexes().await, Some(0));
    assert_eq!(store.list_user_sessions("user1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn audit_trail_records_lifecycle() {
    let audit = Arc::new(InMemorySessionAudit::new());
    let store = local_store().with_audit(audit.clone());
    let (access, refresh) = ids(1);
    let (new_access, new_refresh) = ids(2);

    let id = store.create_session("user1", access, refresh, HOUR, None).await.unwrap();
    store.rotate_tokens(id, new_access, new_refresh).await.unwrap();
    store.revoke_session(id).await.unwrap();
    store.revoke_session(id).await.unwrap();

    let kinds: Vec<_> = audit
        .events_for(id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![SessionEventKind::Created, SessionEventKind::Rotated, SessionEventKind::Revoked]
    );
}

#[tokio::test]
async fn blacklist_outage_follows_failure_policy() {
    let token = TokenIdentifier::from_raw("any");
    assert!(!down_store(FailurePolicy::Open).is_token_blacklisted(&token).await);
    assert!(down_store(FailurePolicy::Closed).is_token_blacklisted(&token).await);
}

#[tokio::test]
async fn outage_surfaces_as_session_errors() {
    let store = down_store(FailurePolicy::Open);
    let (access, refresh) = ids(1);

    let created = store.create_session("user1", access, refresh, HOUR, None).await;
    assert!(matches!(created, Err(SessionError::Unavailable { .. })));

    let revoked = store.revoke_session(uuid::Uuid::new_v4()).await;
    assert!(matches!(revoked, Err(SessionError::Unavailable { .. })));

    assert!(store.list_user_sessions("user1").await.is_none());
    assert!(!store.blacklist_token(&TokenIdentifier::from_raw("t"), HOUR).await);
}
