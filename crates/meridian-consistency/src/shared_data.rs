//! Access to the cluster's shared data (locks and maps)
//!
//! `SharedData` is the process-level handle to the store. Components obtain
//! a `SharedDataAccessor` scoped to their own namespace so that locks and
//! maps of unrelated components sharing one store never collide.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use tracing::error;

use meridian_common::NAMESPACE_SEPARATOR;

use crate::lock::{DistributedLockService, LockAcquireRequest, LockConfig, LockGuard, MemoryLockService};
use crate::map::{MemorySharedMapProvider, SharedMap, SharedMapProvider};

/// Handle to the cluster store, cloned into every component that needs it
#[derive(Clone)]
pub struct SharedData {
    locks: Arc<dyn DistributedLockService>,
    maps: Arc<dyn SharedMapProvider>,
    lock_config: LockConfig,
}

impl SharedData {
    pub fn new(locks: Arc<dyn DistributedLockService>, maps: Arc<dyn SharedMapProvider>) -> Self {
        Self {
            locks,
            maps,
            lock_config: LockConfig::default(),
        }
    }

    /// A fresh in-process store. Clones of the returned handle share it.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryLockService::new()),
            Arc::new(MemorySharedMapProvider::new()),
        )
    }

    pub fn with_lock_config(mut self, lock_config: LockConfig) -> Self {
        self.lock_config = lock_config;
        self
    }

    pub fn lock_config(&self) -> LockConfig {
        self.lock_config
    }

    pub fn lock_service(&self) -> &Arc<dyn DistributedLockService> {
        &self.locks
    }

    pub fn map_provider(&self) -> &Arc<dyn SharedMapProvider> {
        &self.maps
    }

    pub fn accessor(&self, namespace: impl Into<String>) -> SharedDataAccessor {
        SharedDataAccessor::new(self.clone(), namespace)
    }
}

impl std::fmt::Debug for SharedData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedData")
            .field("lock_config", &self.lock_config)
            .finish_non_exhaustive()
    }
}

/// Namespaced view over `SharedData`
#[derive(Clone, Debug)]
pub struct SharedDataAccessor {
    shared: SharedData,
    namespace: String,
}

impl SharedDataAccessor {
    pub fn new(shared: SharedData, namespace: impl Into<String>) -> Self {
        Self {
            shared,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Acquire the named lock for `owner`, waiting up to the configured time.
    /// The lease is renewed at a third of its ttl until the guard is released.
    ///
    /// Returns an error when the lock could not be acquired.
    pub async fn get_lock(&self, name: &str, owner: &str) -> anyhow::Result<LockGuard> {
        let request = LockAcquireRequest::new(&self.namespace, name, owner)
            .with_config(&self.shared.lock_config);
        let key = request.key();

        let result = self.shared.locks.acquire(request).await?;
        if !result.acquired {
            let reason = result
                .error
                .unwrap_or_else(|| "lock not acquired".to_string());
            error!(key = %key, owner = %owner, current_owner = ?result.current_owner, "Error acquiring lock: {}", reason);
            bail!(reason);
        }

        Ok(LockGuard::new(
            self.shared.locks.clone(),
            self.namespace.clone(),
            name.to_string(),
            owner.to_string(),
            result.fence_token,
        )
        .with_renewal(Duration::from_millis(self.shared.lock_config.ttl_ms / 3)))
    }

    /// The named map of this namespace
    pub async fn get_async_map(&self, name: &str) -> anyhow::Result<Arc<dyn SharedMap>> {
        let qualified = format!("{}{}{}", self.namespace, NAMESPACE_SEPARATOR, name);
        self.shared.maps.get_async_map(&qualified).await
    }
}
