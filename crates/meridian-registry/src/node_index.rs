//! Node index
//!
//! Tracks, per cluster node, which registry entries that node contributed,
//! so the entries can be reclaimed when the node goes away. Announcing,
//! retracting and cleaning up a node all hold that node's lock, always taken
//! before any registry key lock.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use meridian_common::{ClusterContext, RegistryError, Result};
use meridian_consistency::{LockFence, SharedData, SharedDataAccessor};

use crate::metrics::record_node_cleanup;
use crate::write_safe::{WriteSafeRegistry, with_lock};

/// Cleanup passes before giving up on a node whose index keeps growing
pub const MAX_CLEANUP_ROUNDS: usize = 8;

/// Namespace of the per-node locks
pub const NODE_LOCK_NAMESPACE: &str = "NodeRegistry";

/// A node index value: `value` was registered under `key` in `registry`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRef {
    pub registry: String,
    pub key: String,
    pub value: Value,
}

impl EntryRef {
    pub fn new(registry: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Self {
            registry: registry.into(),
            key: key.into(),
            value,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "registry": self.registry,
            "key": self.key,
            "value": self.value,
        })
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Outcome of a completed node cleanup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupReport {
    pub node_id: String,
    /// Entries unregistered from their registries
    pub unregistered: usize,
    /// Index values that could not be read as an `EntryRef` and were dropped
    pub skipped: usize,
}

/// Content registries plus the index of what each node contributed to them
#[derive(Clone)]
pub struct NodeRegistry {
    shared: SharedData,
    cluster: Arc<dyn ClusterContext>,
    node_locks: SharedDataAccessor,
    index: WriteSafeRegistry,
    registries: Arc<DashMap<String, WriteSafeRegistry>>,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("index", &self.index.name())
            .field("registries", &self.registries.len())
            .finish()
    }
}

impl NodeRegistry {
    pub fn new(shared: SharedData, cluster: Arc<dyn ClusterContext>, index_name: impl Into<String>) -> Self {
        let index = WriteSafeRegistry::new(&shared, cluster.clone(), index_name);
        Self {
            node_locks: shared.accessor(NODE_LOCK_NAMESPACE),
            shared,
            cluster,
            index,
            registries: Arc::new(DashMap::new()),
        }
    }

    pub fn cluster(&self) -> &Arc<dyn ClusterContext> {
        &self.cluster
    }

    /// The node index registry, keyed by node id
    pub fn index(&self) -> &WriteSafeRegistry {
        &self.index
    }

    /// The content registry called `name`. The index's own name resolves to
    /// the index, so contents and node entries may share one map.
    pub fn registry(&self, name: &str) -> WriteSafeRegistry {
        if name == self.index.name() {
            return self.index.clone();
        }
        self.registries
            .entry(name.to_string())
            .or_insert_with(|| WriteSafeRegistry::new(&self.shared, self.cluster.clone(), name))
            .clone()
    }

    /// Register `value` under `key` in `registry` and record it against the
    /// local node.
    pub async fn announce(&self, registry: &str, key: &str, value: Value) -> Result<()> {
        let node_id = self.cluster.local_node_id();
        let node_id = node_id.as_str();
        let entry = EntryRef::new(registry, key, value.clone());

        self.node_locked(node_id, |_| async move {
            self.registry(registry).register(key, value).await?;
            self.index.register(node_id, entry.to_value()).await
        })
        .await
    }

    /// Reverse of `announce`
    pub async fn retract(&self, registry: &str, key: &str, value: Value) -> Result<()> {
        let node_id = self.cluster.local_node_id();
        let node_id = node_id.as_str();
        let entry = EntryRef::new(registry, key, value);

        self.node_locked(node_id, |_| async move {
            self.registry(registry).unregister(key, &entry.value).await?;
            self.index.unregister(node_id, &entry.to_value()).await
        })
        .await
    }

    /// Snapshot of what `node_id` has contributed
    pub async fn entries_of(&self, node_id: &str) -> Result<Vec<EntryRef>> {
        let entries = self.index.get(node_id).await?;
        Ok(entries.iter().filter_map(EntryRef::from_value).collect())
    }

    /// Unregister every entry `node_id` contributed, then drop its index.
    ///
    /// Entries are unregistered concurrently and all of them are attempted.
    /// If any fails, the index is kept so a later run can finish the job and
    /// `PartialCleanup` is returned; entries already removed stay removed.
    pub async fn unregister_node(&self, node_id: &str) -> Result<CleanupReport> {
        info!(node_id = %node_id, "Unregistering entries of node");

        let result = self
            .node_locked(node_id, |_| self.cleanup_rounds(node_id))
            .await;
        match &result {
            Ok(report) => {
                info!(
                    node_id = %node_id,
                    unregistered = report.unregistered,
                    skipped = report.skipped,
                    "Unregistered entries of node"
                );
                record_node_cleanup("complete");
            }
            Err(e @ RegistryError::PartialCleanup { .. }) => {
                error!(node_id = %node_id, "Failed to unregister entries of node: {}", e);
                record_node_cleanup("partial");
            }
            Err(e) => {
                error!(node_id = %node_id, "Failed to unregister entries of node: {}", e);
                record_node_cleanup("failed");
            }
        }
        result
    }

    // Index values written around `announce` while a round runs are left in
    // the index by `remove_values`, and picked up by the next round.
    async fn cleanup_rounds(&self, node_id: &str) -> Result<CleanupReport> {
        let mut report = CleanupReport {
            node_id: node_id.to_string(),
            unregistered: 0,
            skipped: 0,
        };

        for round in 0..MAX_CLEANUP_ROUNDS {
            let entries = self.index.get(node_id).await?.into_inner();
            let total = entries.len();

            let outcomes = join_all(entries.iter().map(|raw| self.unregister_entry(node_id, raw))).await;

            let mut failed = 0;
            for outcome in outcomes {
                match outcome {
                    Ok(true) => report.unregistered += 1,
                    Ok(false) => report.skipped += 1,
                    Err(_) => failed += 1,
                }
            }
            if failed > 0 {
                return Err(RegistryError::PartialCleanup {
                    node_id: node_id.to_string(),
                    failed,
                    total,
                });
            }

            let remaining = self.index.remove_values(node_id, &entries).await?;
            if remaining == 0 {
                return Ok(report);
            }
            debug!(node_id = %node_id, round, remaining, "Entries added during cleanup");
        }

        let remaining = self.index.get(node_id).await?.len();
        Err(RegistryError::PartialCleanup {
            node_id: node_id.to_string(),
            failed: remaining,
            total: report.unregistered + report.skipped + remaining,
        })
    }

    async fn node_locked<T, F, Fut>(&self, node_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(LockFence) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_lock(
            &self.node_locks,
            &self.cluster.local_node_id(),
            NODE_LOCK_NAMESPACE,
            node_id,
            f,
        )
        .await
    }

    /// Returns false for index values that are not entry references
    async fn unregister_entry(&self, node_id: &str, raw: &Value) -> Result<bool> {
        let Some(entry) = EntryRef::from_value(raw) else {
            warn!(node_id = %node_id, "Dropping malformed node index value {}", raw);
            return Ok(false);
        };

        self.registry(&entry.registry)
            .unregister(&entry.key, &entry.value)
            .await
            .inspect_err(|e| {
                warn!(
                    node_id = %node_id,
                    registry = %entry.registry,
                    key = %entry.key,
                    "Failed to unregister entry: {}",
                    e
                )
            })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use meridian_common::{DEFAULT_REGISTRY_NAME, StaticClusterContext};
    use serde_json::json;

    fn node(shared: &SharedData, node_id: &str) -> NodeRegistry {
        NodeRegistry::new(
            shared.clone(),
            Arc::new(StaticClusterContext::clustered(node_id, false)),
            DEFAULT_REGISTRY_NAME,
        )
    }

    #[test]
    fn test_entry_ref_value_shape() {
        let entry = EntryRef::new("entities", "Sales.Orders", json!("svc-a"));
        assert_eq!(
            entry.to_value(),
            json!({"registry": "entities", "key": "Sales.Orders", "value": "svc-a"})
        );
        assert_eq!(EntryRef::from_value(&entry.to_value()), Some(entry));
        assert!(EntryRef::from_value(&json!("not-a-ref")).is_none());
    }

    #[tokio::test]
    async fn test_announce_records_index() {
        let shared = SharedData::in_memory();
        let nodes = node(&shared, "node-1");

        nodes.announce("entities", "A", json!("svc")).await.unwrap();
        nodes.announce("entities", "B", json!("svc")).await.unwrap();

        let entries = nodes.entries_of("node-1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], EntryRef::new("entities", "A", json!("svc")));
        assert!(nodes.registry("entities").get("A").await.unwrap().contains(&json!("svc")));
    }

    #[tokio::test]
    async fn test_retract_reverses_announce() {
        let shared = SharedData::in_memory();
        let nodes = node(&shared, "node-1");

        nodes.announce("entities", "A", json!("svc")).await.unwrap();
        nodes.retract("entities", "A", json!("svc")).await.unwrap();

        assert!(nodes.entries_of("node-1").await.unwrap().is_empty());
        assert!(nodes.registry("entities").get("A").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unregister_unknown_node_succeeds() {
        let shared = SharedData::in_memory();
        let nodes = node(&shared, "node-1");

        let report = nodes.unregister_node("never-seen").await.unwrap();
        assert_eq!(report.unregistered, 0);
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn test_unregister_node_drops_malformed_values() {
        let shared = SharedData::in_memory();
        let nodes = node(&shared, "node-1");

        nodes.announce("entities", "A", json!("svc")).await.unwrap();
        nodes.index().register("node-1", json!(42)).await.unwrap();

        let report = nodes.unregister_node("node-1").await.unwrap();
        assert_eq!(report.unregistered, 1);
        assert_eq!(report.skipped, 1);
        assert!(nodes.index().shared_map().await.unwrap().get("node-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_index_and_contents_may_share_a_map() {
        let shared = SharedData::in_memory();
        let nodes = node(&shared, "node-1");

        nodes
            .announce(DEFAULT_REGISTRY_NAME, "Sales.Orders", json!({"qualifiedName": "svc"}))
            .await
            .unwrap();
        nodes.unregister_node("node-1").await.unwrap();

        let map = nodes.index().shared_map().await.unwrap();
        assert!(map.get("node-1").await.unwrap().is_none());
        assert_eq!(map.get("Sales.Orders").await.unwrap().map(|e| e.len()), Some(0));
    }
}
