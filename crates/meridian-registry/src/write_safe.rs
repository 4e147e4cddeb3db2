//! Write-safe registry
//!
//! A named shared map of key to duplicate-free entry list where every
//! mutation of a key runs as lock, read, modify, write, release. The lock is
//! per key and cluster-wide, so concurrent writers on any node never lose
//! each other's updates. Every write first checks the lock is still held by
//! the writing call. Nothing is cached; every operation reads the store.

use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info};

use meridian_common::{ClusterContext, RegistryError, Result};
use meridian_consistency::{EntryList, LockFence, SharedData, SharedDataAccessor, SharedMap};

use crate::metrics::record_operation;

/// Namespace of the locks and maps owned by write-safe registries
pub const REGISTRY_NAMESPACE: &str = "WriteSafeRegistry";

#[derive(Clone)]
pub struct WriteSafeRegistry {
    accessor: SharedDataAccessor,
    cluster: Arc<dyn ClusterContext>,
    name: String,
}

impl std::fmt::Debug for WriteSafeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSafeRegistry")
            .field("name", &self.name)
            .field("node_id", &self.cluster.local_node_id())
            .finish()
    }
}

impl WriteSafeRegistry {
    pub fn new(shared: &SharedData, cluster: Arc<dyn ClusterContext>, name: impl Into<String>) -> Self {
        Self {
            accessor: shared.accessor(REGISTRY_NAMESPACE),
            cluster,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register `value` under `key`. Registering an equal value again is a no-op.
    pub async fn register(&self, key: &str, value: Value) -> Result<()> {
        self.register_with(key, value, || Ok::<(), Infallible>(()))
            .await
    }

    /// Register `value` under `key` and run `on_first_insert` once the value
    /// has been written, only if it was not already present.
    ///
    /// A callback failure is returned as `CallbackFailure`; the value stays
    /// registered in that case.
    pub async fn register_with<F, E>(&self, key: &str, value: Value, on_first_insert: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<(), E> + Send,
        E: Display,
    {
        info!(registry = %self.name, key = %key, value = %value, "Register value");

        let result = self
            .locked(key, move |fence| self.add_value(fence, key, value, on_first_insert))
            .await;
        record_operation("register", &result);
        result
    }

    /// Remove `value` from `key`. Absent keys and values succeed unchanged.
    pub async fn unregister(&self, key: &str, value: &Value) -> Result<()> {
        info!(registry = %self.name, key = %key, value = %value, "Unregister value");

        let result = self
            .locked(key, |fence| self.remove_value(fence, key, value))
            .await;
        record_operation("unregister", &result);
        result
    }

    /// Remove `values` from `key` and drop the key once its list is empty.
    ///
    /// Returns the number of entries left under the key.
    pub async fn remove_values(&self, key: &str, values: &[Value]) -> Result<usize> {
        self.locked(key, |fence| async move {
            let map = self.map_for(key).await?;
            let Some(mut entries) = self.read(map.as_ref(), key).await? else {
                return Ok(0);
            };

            for value in values {
                entries.remove(value);
            }

            let remaining = entries.len();
            if remaining == 0 {
                fence.check().await.map_err(|e| RegistryError::lock(key, e))?;
                map.remove(key)
                    .await
                    .map_err(|e| RegistryError::map(map.name(), key, e))?;
                debug!(registry = %self.name, key = %key, "Removed key");
            } else {
                self.write(&fence, map.as_ref(), key, entries).await?;
            }
            Ok(remaining)
        })
        .await
    }

    /// Snapshot of the entries under `key`; absent keys read as empty
    pub async fn get(&self, key: &str) -> Result<EntryList> {
        let map = self.map_for(key).await?;
        Ok(self.read(map.as_ref(), key).await?.unwrap_or_default())
    }

    /// Handle to the backing map for bulk reads. Writes through it bypass
    /// the per-key lock.
    pub async fn shared_map(&self) -> Result<Arc<dyn SharedMap>> {
        self.accessor
            .get_async_map(&self.name)
            .await
            .map_err(|e| RegistryError::map(&self.name, "", e))
    }

    async fn locked<T, F, Fut>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(LockFence) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_lock(&self.accessor, &self.cluster.local_node_id(), &self.name, key, f).await
    }

    async fn add_value<F, E>(
        &self,
        fence: LockFence,
        key: &str,
        value: Value,
        on_first_insert: F,
    ) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<(), E>,
        E: Display,
    {
        let map = self.map_for(key).await?;
        let mut entries = self.read(map.as_ref(), key).await?.unwrap_or_default();

        if !entries.insert(value.clone()) {
            debug!(registry = %self.name, key = %key, value = %value, "Value already registered");
            return Ok(());
        }

        self.write(&fence, map.as_ref(), key, entries).await?;
        info!(
            registry = %self.name,
            key = %key,
            node_id = %self.cluster.local_node_id(),
            "Registered value {} in shared map",
            value
        );

        on_first_insert().map_err(|e| {
            error!(registry = %self.name, key = %key, "First-insert callback failed: {}", e);
            RegistryError::callback(key, e)
        })
    }

    async fn remove_value(&self, fence: LockFence, key: &str, value: &Value) -> Result<()> {
        let map = self.map_for(key).await?;
        let Some(mut entries) = self.read(map.as_ref(), key).await? else {
            return Ok(());
        };

        if entries.remove(value) {
            info!(
                registry = %self.name,
                key = %key,
                node_id = %self.cluster.local_node_id(),
                "Unregistered value {} from shared map",
                value
            );
        }

        self.write(&fence, map.as_ref(), key, entries).await
    }

    async fn map_for(&self, key: &str) -> Result<Arc<dyn SharedMap>> {
        self.accessor
            .get_async_map(&self.name)
            .await
            .map_err(|e| RegistryError::map(&self.name, key, e))
    }

    async fn read(&self, map: &dyn SharedMap, key: &str) -> Result<Option<EntryList>> {
        map.get(key)
            .await
            .map_err(|e| RegistryError::map(map.name(), key, e))
    }

    async fn write(
        &self,
        fence: &LockFence,
        map: &dyn SharedMap,
        key: &str,
        entries: EntryList,
    ) -> Result<()> {
        fence.check().await.map_err(|e| {
            error!(registry = %self.name, key = %key, "Lock lost before write: {}", e);
            RegistryError::lock(key, e)
        })?;
        map.put(key, entries)
            .await
            .map_err(|e| RegistryError::map(map.name(), key, e))
    }
}

/// Run `f` while holding the lock `key` of `accessor`, on behalf of `node_id`.
/// The lock is released on every outcome of `f`.
pub(crate) async fn with_lock<T, F, Fut>(
    accessor: &SharedDataAccessor,
    node_id: &str,
    scope: &str,
    key: &str,
    f: F,
) -> Result<T>
where
    F: FnOnce(LockFence) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // Unique per call so that callers on the same node serialize too
    let owner = format!("{}/{}", node_id, uuid::Uuid::new_v4());

    debug!(key = %key, owner = %owner, "Get lock");
    let guard = accessor.get_lock(key, &owner).await.map_err(|e| {
        error!(scope = %scope, key = %key, "Error acquiring lock: {}", e);
        RegistryError::lock(key, e)
    })?;

    let result = f(guard.fence()).await;

    debug!(key = %key, "Releasing lock");
    guard.release().await;
    result
}
