//! Distributed lock service
//!
//! `DistributedLockService` is the seam to the cluster's lock store.
//! `MemoryLockService` keeps the locks in process and is shared by every
//! simulated node of an in-process cluster.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::{Instant, interval};
use tracing::debug;

use super::model::*;

/// Distributed lock service trait
#[async_trait]
pub trait DistributedLockService: Send + Sync {
    /// Acquire a lock, waiting up to `wait_ms` for the current holder
    async fn acquire(&self, request: LockAcquireRequest) -> anyhow::Result<LockAcquireResult>;

    /// Release a lock
    async fn release(&self, request: LockReleaseRequest) -> anyhow::Result<LockReleaseResult>;

    /// Extend the lease of a held lock
    async fn renew(&self, request: LockRenewRequest) -> anyhow::Result<LockRenewResult>;

    /// Get a lock by key
    async fn get(&self, namespace: &str, name: &str) -> anyhow::Result<Option<DistributedLock>>;

    /// Force release a lock (admin operation)
    async fn force_release(&self, namespace: &str, name: &str) -> anyhow::Result<bool>;

    /// Get lock statistics
    async fn get_stats(&self) -> LockStats;
}

/// In-memory lock service implementation
pub struct MemoryLockService {
    locks: Arc<DashMap<String, DistributedLock>>,
    /// Wakes waiters of a key whenever it is released
    notifiers: Arc<DashMap<String, Arc<Notify>>>,
    stats: Arc<LockStatsCollector>,
    cleanup_handle: Option<tokio::task::JoinHandle<()>>,
}

#[derive(Default)]
struct LockStatsCollector {
    total_locks: AtomicU64,
    total_acquisitions: AtomicU64,
    total_releases: AtomicU64,
    total_renewals: AtomicU64,
    expired_locks: AtomicU64,
    failed_acquisitions: AtomicU64,
}

/// Outcome of a single non-blocking acquisition attempt
enum Attempt {
    Acquired(u64),
    Held {
        owner: Option<String>,
        remaining_ttl_ms: u64,
    },
}

impl MemoryLockService {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            notifiers: Arc::new(DashMap::new()),
            stats: Arc::new(LockStatsCollector::default()),
            cleanup_handle: None,
        }
    }

    /// Start with a background task that expires out-of-lease locks
    pub fn with_cleanup(mut self, interval_ms: u64) -> Self {
        let locks = self.locks.clone();
        let notifiers = self.notifiers.clone();
        let stats = self.stats.clone();

        let handle = tokio::spawn(async move {
            let mut interval = interval(Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                Self::cleanup_expired_locks(&locks, &notifiers, &stats);
            }
        });

        self.cleanup_handle = Some(handle);
        self
    }

    fn cleanup_expired_locks(
        locks: &DashMap<String, DistributedLock>,
        notifiers: &DashMap<String, Arc<Notify>>,
        stats: &LockStatsCollector,
    ) {
        let mut expired_keys = Vec::new();
        let mut active = 0u64;

        for mut entry in locks.iter_mut() {
            if entry.expire() {
                stats.expired_locks.fetch_add(1, Ordering::Relaxed);
                expired_keys.push(entry.key.clone());
            } else if entry.is_locked() {
                active += 1;
            }
        }

        for key in &expired_keys {
            debug!(key = %key, "Lock lease expired");
            if let Some(notify) = notifiers.get(key) {
                notify.notify_waiters();
            }
        }

        metrics::gauge!("lock_active_total").set(active as f64);
    }

    fn notifier(&self, key: &str) -> Arc<Notify> {
        self.notifiers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    fn try_acquire(&self, key: &str, request: &LockAcquireRequest) -> Attempt {
        let mut lock = self.locks.entry(key.to_string()).or_insert_with(|| {
            self.stats.total_locks.fetch_add(1, Ordering::Relaxed);
            DistributedLock::new(&request.namespace, &request.name)
        });

        if lock.expire() {
            self.stats.expired_locks.fetch_add(1, Ordering::Relaxed);
        }

        if lock.acquire(&request.owner, request.ttl_ms) {
            self.stats
                .total_acquisitions
                .fetch_add(1, Ordering::Relaxed);
            return Attempt::Acquired(lock.fence_token);
        }

        Attempt::Held {
            owner: lock.owner.clone(),
            remaining_ttl_ms: lock.remaining_ttl_ms(),
        }
    }
}

impl Drop for MemoryLockService {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }
}

impl Default for MemoryLockService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistributedLockService for MemoryLockService {
    async fn acquire(&self, request: LockAcquireRequest) -> anyhow::Result<LockAcquireResult> {
        let key = request.key();
        let notify = self.notifier(&key);
        let deadline = Instant::now() + Duration::from_millis(request.wait_ms);

        loop {
            // Register interest before checking so a release in between is not missed
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (current_owner, remaining_ttl_ms) = match self.try_acquire(&key, &request) {
                Attempt::Acquired(fence_token) => {
                    debug!(key = %key, owner = %request.owner, fence_token, "Lock acquired");
                    return Ok(LockAcquireResult {
                        acquired: true,
                        fence_token,
                        ..Default::default()
                    });
                }
                Attempt::Held {
                    owner,
                    remaining_ttl_ms,
                } => (owner, remaining_ttl_ms),
            };

            let now = Instant::now();
            if now >= deadline {
                self.stats
                    .failed_acquisitions
                    .fetch_add(1, Ordering::Relaxed);
                let error = if request.wait_ms == 0 {
                    "Lock is held by another owner"
                } else {
                    "Lock acquisition timeout"
                };
                return Ok(LockAcquireResult {
                    acquired: false,
                    current_owner,
                    error: Some(error.to_string()),
                    ..Default::default()
                });
            }

            // Wake on release, or when the holder's lease runs out
            let lease = Duration::from_millis(remaining_ttl_ms.max(1));
            let wait = (deadline - now).min(lease);
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }

    async fn release(&self, request: LockReleaseRequest) -> anyhow::Result<LockReleaseResult> {
        let key = lock_key(&request.namespace, &request.name);

        {
            let mut lock = match self.locks.get_mut(&key) {
                Some(lock) => lock,
                None => {
                    return Ok(LockReleaseResult {
                        released: false,
                        error: Some("Lock not found".to_string()),
                    });
                }
            };

            if let Some(expected_token) = request.fence_token
                && lock.fence_token != expected_token
            {
                return Ok(LockReleaseResult {
                    released: false,
                    error: Some("Fence token mismatch".to_string()),
                });
            }

            if !lock.release(&request.owner) {
                return Ok(LockReleaseResult {
                    released: false,
                    error: Some("Not the lock owner".to_string()),
                });
            }
        }

        self.stats.total_releases.fetch_add(1, Ordering::Relaxed);
        if let Some(notify) = self.notifiers.get(&key) {
            notify.notify_waiters();
        }
        debug!(key = %key, owner = %request.owner, "Lock released");

        Ok(LockReleaseResult {
            released: true,
            error: None,
        })
    }

    async fn renew(&self, request: LockRenewRequest) -> anyhow::Result<LockRenewResult> {
        let key = lock_key(&request.namespace, &request.name);

        let mut lock = match self.locks.get_mut(&key) {
            Some(lock) => lock,
            None => {
                return Ok(LockRenewResult {
                    error: Some("Lock not found".to_string()),
                    ..Default::default()
                });
            }
        };

        if let Some(expected_token) = request.fence_token
            && lock.fence_token != expected_token
        {
            return Ok(LockRenewResult {
                error: Some("Fence token mismatch".to_string()),
                ..Default::default()
            });
        }

        if !lock.renew(&request.owner) {
            return Ok(LockRenewResult {
                error: Some("Not the lock owner".to_string()),
                ..Default::default()
            });
        }

        self.stats.total_renewals.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, owner = %request.owner, renewal_count = lock.renewal_count, "Lock renewed");

        Ok(LockRenewResult {
            renewed: true,
            expires_at: lock.expires_at,
            renewal_count: lock.renewal_count,
            error: None,
        })
    }

    async fn get(&self, namespace: &str, name: &str) -> anyhow::Result<Option<DistributedLock>> {
        let key = lock_key(namespace, name);
        Ok(self.locks.get(&key).map(|l| l.clone()))
    }

    async fn force_release(&self, namespace: &str, name: &str) -> anyhow::Result<bool> {
        let key = lock_key(namespace, name);

        let released = match self.locks.get_mut(&key) {
            Some(mut lock) => {
                lock.force_release();
                true
            }
            None => false,
        };

        if released {
            self.stats.total_releases.fetch_add(1, Ordering::Relaxed);
            if let Some(notify) = self.notifiers.get(&key) {
                notify.notify_waiters();
            }
        }

        Ok(released)
    }

    async fn get_stats(&self) -> LockStats {
        let active_locks = self.locks.iter().filter(|l| l.is_locked()).count() as u32;

        LockStats {
            total_locks: self.stats.total_locks.load(Ordering::Relaxed),
            active_locks,
            total_acquisitions: self.stats.total_acquisitions.load(Ordering::Relaxed),
            total_releases: self.stats.total_releases.load(Ordering::Relaxed),
            total_renewals: self.stats.total_renewals.load(Ordering::Relaxed),
            expired_locks: self.stats.expired_locks.load(Ordering::Relaxed),
            failed_acquisitions: self.stats.failed_acquisitions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acquire_request(name: &str, owner: &str) -> LockAcquireRequest {
        LockAcquireRequest::new("test", name, owner)
    }

    fn release_request(name: &str, owner: &str) -> LockReleaseRequest {
        LockReleaseRequest {
            namespace: "test".to_string(),
            name: name.to_string(),
            owner: owner.to_string(),
            fence_token: None,
        }
    }

    #[tokio::test]
    async fn test_basic_lock_acquire_release() {
        let service = MemoryLockService::new();

        let result = service
            .acquire(acquire_request("my-lock", "client-1"))
            .await
            .unwrap();
        assert!(result.acquired);
        assert!(result.fence_token > 0);

        let result2 = service
            .acquire(acquire_request("my-lock", "client-2"))
            .await
            .unwrap();
        assert!(!result2.acquired);
        assert_eq!(result2.current_owner, Some("client-1".to_string()));

        let release_result = service
            .release(release_request("my-lock", "client-1"))
            .await
            .unwrap();
        assert!(release_result.released);

        let result3 = service
            .acquire(acquire_request("my-lock", "client-2"))
            .await
            .unwrap();
        assert!(result3.acquired);
    }

    #[tokio::test]
    async fn test_waiter_acquires_after_release() {
        let service = Arc::new(MemoryLockService::new());
        service
            .acquire(acquire_request("wait-lock", "holder"))
            .await
            .unwrap();

        let waiter = {
            let service = service.clone();
            tokio::spawn(async move {
                let mut request = acquire_request("wait-lock", "waiter");
                request.wait_ms = 5_000;
                service.acquire(request).await.unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        service
            .release(release_request("wait-lock", "holder"))
            .await
            .unwrap();

        let result = waiter.await.unwrap();
        assert!(result.acquired);
        let lock = service.get("test", "wait-lock").await.unwrap().unwrap();
        assert!(lock.is_owned_by("waiter"));
    }

    #[tokio::test]
    async fn test_acquire_times_out() {
        let service = MemoryLockService::new();
        service
            .acquire(acquire_request("busy", "holder"))
            .await
            .unwrap();

        let mut request = acquire_request("busy", "late");
        request.wait_ms = 30;
        let result = service.acquire(request).await.unwrap();

        assert!(!result.acquired);
        assert_eq!(result.error.as_deref(), Some("Lock acquisition timeout"));
        assert_eq!(service.get_stats().await.failed_acquisitions, 1);
    }

    #[tokio::test]
    async fn test_expired_lease_is_taken_over() {
        let service = MemoryLockService::new();
        let mut request = acquire_request("lease", "crashed");
        request.ttl_ms = 10;
        assert!(service.acquire(request).await.unwrap().acquired);

        let mut request = acquire_request("lease", "survivor");
        request.wait_ms = 1_000;
        let result = service.acquire(request).await.unwrap();

        assert!(result.acquired);
        assert_eq!(service.get_stats().await.expired_locks, 1);
    }

    #[tokio::test]
    async fn test_fence_token() {
        let service = MemoryLockService::new();

        let result = service
            .acquire(acquire_request("fence-lock", "client-1"))
            .await
            .unwrap();
        let token = result.fence_token;

        let mut release_wrong = release_request("fence-lock", "client-1");
        release_wrong.fence_token = Some(token + 1);
        assert!(!service.release(release_wrong).await.unwrap().released);

        let mut release_correct = release_request("fence-lock", "client-1");
        release_correct.fence_token = Some(token);
        assert!(service.release(release_correct).await.unwrap().released);
    }

    #[tokio::test]
    async fn test_renewed_lease_is_not_taken_over() {
        let service = MemoryLockService::new();
        let mut request = acquire_request("lease", "holder");
        request.ttl_ms = 50;
        let token = service.acquire(request).await.unwrap().fence_token;

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let result = service
                .renew(LockRenewRequest {
                    namespace: "test".to_string(),
                    name: "lease".to_string(),
                    owner: "holder".to_string(),
                    fence_token: Some(token),
                })
                .await
                .unwrap();
            assert!(result.renewed);
        }

        let result = service.acquire(acquire_request("lease", "other")).await.unwrap();
        assert!(!result.acquired);
        assert_eq!(result.current_owner.as_deref(), Some("holder"));
        assert_eq!(service.get_stats().await.total_renewals, 4);
    }

    #[tokio::test]
    async fn test_renew_rejects_stale_fence_token() {
        let service = MemoryLockService::new();
        let token = service
            .acquire(acquire_request("fenced", "holder"))
            .await
            .unwrap()
            .fence_token;

        let result = service
            .renew(LockRenewRequest {
                namespace: "test".to_string(),
                name: "fenced".to_string(),
                owner: "holder".to_string(),
                fence_token: Some(token + 1),
            })
            .await
            .unwrap();
        assert!(!result.renewed);
        assert_eq!(result.error.as_deref(), Some("Fence token mismatch"));
    }

    #[tokio::test]
    async fn test_force_release() {
        let service = MemoryLockService::new();
        service
            .acquire(acquire_request("stuck", "client-1"))
            .await
            .unwrap();

        assert!(service.force_release("test", "stuck").await.unwrap());
        assert!(!service.force_release("test", "unknown").await.unwrap());
        assert!(
            service
                .acquire(acquire_request("stuck", "client-2"))
                .await
                .unwrap()
                .acquired
        );
    }

    #[tokio::test]
    async fn test_mutual_exclusion_under_contention() {
        let service = Arc::new(MemoryLockService::new());
        let in_section = Arc::new(AtomicU64::new(0));
        let mut handles = vec![];

        for i in 0..16 {
            let service = service.clone();
            let in_section = in_section.clone();
            handles.push(tokio::spawn(async move {
                let owner = format!("client-{}", i);
                let mut request = acquire_request("contended", &owner);
                request.wait_ms = 10_000;
                assert!(service.acquire(request).await.unwrap().acquired);

                assert_eq!(in_section.fetch_add(1, Ordering::SeqCst), 0);
                tokio::task::yield_now().await;
                in_section.fetch_sub(1, Ordering::SeqCst);

                service
                    .release(release_request("contended", &owner))
                    .await
                    .unwrap();
            }));
        }

        for result in futures::future::join_all(handles).await {
            result.unwrap();
        }

        let stats = service.get_stats().await;
        assert_eq!(stats.total_acquisitions, 16);
        assert_eq!(stats.active_locks, 0);
    }
}
