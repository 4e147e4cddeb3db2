//! Scoped lock handle
//!
//! A `LockGuard` is handed out for every successful acquisition. While it is
//! held a background task renews the lease, so a slow holder keeps the lock
//! past its ttl. Releasing is idempotent and never fails the caller; a guard
//! dropped without an explicit release schedules the release on the current
//! runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::bail;
use tokio::task::AbortHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, warn};

use super::model::{LockReleaseRequest, LockRenewRequest, lock_key};
use super::service::DistributedLockService;

pub struct LockGuard {
    service: Arc<dyn DistributedLockService>,
    request: LockReleaseRequest,
    released: AtomicBool,
    renewal: Option<AbortHandle>,
}

/// Ownership proof of one acquisition, checked right before a guarded write
#[derive(Clone)]
pub struct LockFence {
    service: Arc<dyn DistributedLockService>,
    namespace: String,
    name: String,
    owner: String,
    fence_token: u64,
}

impl LockFence {
    pub fn key(&self) -> String {
        lock_key(&self.namespace, &self.name)
    }

    /// Fails when the lock is no longer held by this acquisition
    pub async fn check(&self) -> anyhow::Result<()> {
        let lock = self.service.get(&self.namespace, &self.name).await?;
        match lock {
            Some(lock) if lock.is_owned_by(&self.owner) && lock.fence_token == self.fence_token => {
                Ok(())
            }
            _ => bail!("lock '{}' is no longer held by '{}'", self.key(), self.owner),
        }
    }
}

impl std::fmt::Debug for LockFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockFence")
            .field("key", &self.key())
            .field("owner", &self.owner)
            .field("fence_token", &self.fence_token)
            .finish()
    }
}

impl LockGuard {
    pub(crate) fn new(
        service: Arc<dyn DistributedLockService>,
        namespace: String,
        name: String,
        owner: String,
        fence_token: u64,
    ) -> Self {
        Self {
            service,
            request: LockReleaseRequest {
                namespace,
                name,
                owner,
                fence_token: Some(fence_token),
            },
            released: AtomicBool::new(false),
            renewal: None,
        }
    }

    /// Renew the lease every `period` until the guard is released
    pub(crate) fn with_renewal(mut self, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let service = self.service.clone();
        let request = LockRenewRequest {
            namespace: self.request.namespace.clone(),
            name: self.request.name.clone(),
            owner: self.request.owner.clone(),
            fence_token: self.request.fence_token,
        };

        let handle = tokio::spawn(async move {
            let key = lock_key(&request.namespace, &request.name);
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                match service.renew(request.clone()).await {
                    Ok(result) if result.renewed => {}
                    Ok(result) => {
                        warn!(key = %key, error = ?result.error, "Lock lease lost");
                        break;
                    }
                    Err(e) => warn!(key = %key, error = %e, "Lock renewal failed"),
                }
            }
        });

        self.renewal = Some(handle.abort_handle());
        self
    }

    pub fn fence(&self) -> LockFence {
        LockFence {
            service: self.service.clone(),
            namespace: self.request.namespace.clone(),
            name: self.request.name.clone(),
            owner: self.request.owner.clone(),
            fence_token: self.fence_token(),
        }
    }

    fn stop_renewal(&self) {
        if let Some(renewal) = &self.renewal {
            renewal.abort();
        }
    }

    pub fn key(&self) -> String {
        lock_key(&self.request.namespace, &self.request.name)
    }

    pub fn owner(&self) -> &str {
        &self.request.owner
    }

    pub fn fence_token(&self) -> u64 {
        self.request.fence_token.unwrap_or_default()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Release the lock. Failures are logged, never returned.
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop_renewal();
        release_now(self.service.as_ref(), &self.request).await;
    }
}

async fn release_now(service: &dyn DistributedLockService, request: &LockReleaseRequest) {
    let key = lock_key(&request.namespace, &request.name);
    match service.release(request.clone()).await {
        Ok(result) if result.released => debug!(key = %key, "Releasing lock"),
        Ok(result) => warn!(key = %key, error = ?result.error, "Lock was not released"),
        Err(e) => warn!(key = %key, error = %e, "Lock release failed"),
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop_renewal();

        let service = self.service.clone();
        let request = self.request.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    release_now(service.as_ref(), &request).await;
                });
            }
            Err(_) => warn!(
                key = %lock_key(&request.namespace, &request.name),
                "Lock guard dropped outside a runtime; lease expiry will free it"
            ),
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key())
            .field("owner", &self.request.owner)
            .field("fence_token", &self.request.fence_token)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{LockAcquireRequest, MemoryLockService};

    async fn acquire(service: &Arc<MemoryLockService>, owner: &str) -> LockGuard {
        let result = service
            .acquire(LockAcquireRequest::new("test", "guarded", owner))
            .await
            .unwrap();
        assert!(result.acquired);
        LockGuard::new(
            service.clone(),
            "test".to_string(),
            "guarded".to_string(),
            owner.to_string(),
            result.fence_token,
        )
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let service = Arc::new(MemoryLockService::new());
        let guard = acquire(&service, "owner-1").await;

        guard.release().await;
        guard.release().await;
        assert!(guard.is_released());

        let stats = service.get_stats().await;
        assert_eq!(stats.total_releases, 1);
        assert_eq!(stats.active_locks, 0);
    }

    #[tokio::test]
    async fn test_renewal_outlives_ttl() {
        let service = Arc::new(MemoryLockService::new());
        let mut request = LockAcquireRequest::new("test", "guarded", "owner-1");
        request.ttl_ms = 40;
        let result = service.acquire(request).await.unwrap();
        let guard = LockGuard::new(
            service.clone(),
            "test".to_string(),
            "guarded".to_string(),
            "owner-1".to_string(),
            result.fence_token,
        )
        .with_renewal(Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(guard.fence().check().await.is_ok());

        let mut request = LockAcquireRequest::new("test", "guarded", "owner-2");
        request.wait_ms = 20;
        assert!(!service.acquire(request).await.unwrap().acquired);

        guard.release().await;
        assert!(service.get_stats().await.total_renewals > 0);
        assert!(guard.fence().check().await.is_err());
    }

    #[tokio::test]
    async fn test_fence_fails_after_takeover() {
        let service = Arc::new(MemoryLockService::new());
        let guard = acquire(&service, "owner-1").await;
        let fence = guard.fence();
        assert!(fence.check().await.is_ok());

        service.force_release("test", "guarded").await.unwrap();
        assert!(
            service
                .acquire(LockAcquireRequest::new("test", "guarded", "owner-2"))
                .await
                .unwrap()
                .acquired
        );

        let err = fence.check().await.unwrap_err();
        assert!(err.to_string().contains("no longer held"));
    }

    #[tokio::test]
    async fn test_drop_releases_lock() {
        let service = Arc::new(MemoryLockService::new());
        let guard = acquire(&service, "owner-1").await;
        assert_eq!(guard.key(), "test::guarded");
        drop(guard);

        let mut request = LockAcquireRequest::new("test", "guarded", "owner-2");
        request.wait_ms = 1_000;
        assert!(service.acquire(request).await.unwrap().acquired);
    }
}
