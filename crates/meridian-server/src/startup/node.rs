//! Node assembly
//!
//! Wires the shared store, the member manager, the node registry and the
//! lifecycle hooks of one Meridian node.

use std::sync::Arc;

use tracing::{error, info};

use meridian_common::{ClusterContext, Result};
use meridian_consistency::{MemoryLockService, MemorySharedMapProvider, SharedData};
use meridian_core::{ClusterMemberManager, Configuration, HookRegistry};
use meridian_registry::{NodeRegistry, UnregisterEntriesHook, WriteSafeRegistry};

/// Interval of the expired-lease scan of the in-process lock service
const LOCK_CLEANUP_INTERVAL_MS: u64 = 1_000;

pub struct MeridianNode {
    shared: SharedData,
    members: ClusterMemberManager,
    hooks: HookRegistry,
    nodes: NodeRegistry,
}

impl MeridianNode {
    /// Start a node backed by an in-process store
    pub async fn start(configuration: &Configuration) -> Self {
        let shared = SharedData::new(
            Arc::new(MemoryLockService::new().with_cleanup(LOCK_CLEANUP_INTERVAL_MS)),
            Arc::new(MemorySharedMapProvider::new()),
        );
        Self::start_with(configuration, shared).await
    }

    /// Start a node on an existing store
    pub async fn start_with(configuration: &Configuration, shared: SharedData) -> Self {
        let shared = shared.with_lock_config(configuration.lock_config());

        let members = ClusterMemberManager::new(configuration);
        members.start().await;

        let nodes = NodeRegistry::new(
            shared.clone(),
            Arc::new(members.clone()),
            configuration.registry_name(),
        );

        let hooks = HookRegistry::new(configuration.hook_config());
        hooks
            .register(Arc::new(UnregisterEntriesHook::new(nodes.clone())))
            .await;
        members.register_listener(Arc::new(hooks.clone())).await;

        info!(
            node_id = %members.local_node_id(),
            registry = %configuration.registry_name(),
            "Meridian node started in {} mode",
            if members.is_standalone() { "standalone" } else { "cluster" }
        );

        Self {
            shared,
            members,
            hooks,
            nodes,
        }
    }

    pub fn node_id(&self) -> String {
        self.members.local_node_id()
    }

    pub fn shared_data(&self) -> &SharedData {
        &self.shared
    }

    pub fn members(&self) -> &ClusterMemberManager {
        &self.members
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    pub fn registry(&self, name: &str) -> WriteSafeRegistry {
        self.nodes.registry(name)
    }

    /// Run the before-shutdown hooks and stop membership. Hook failures are
    /// logged and returned, they never stop the shutdown itself.
    pub async fn shutdown(&self) -> Result<()> {
        info!(node_id = %self.node_id(), "Shutting down Meridian node");

        let result = self.hooks.before_shutdown().await;
        if let Err(e) = &result {
            error!(node_id = %self.node_id(), "Shutdown hooks failed: {}", e);
        }

        self.members.stop().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn configuration(standalone: bool, node_id: &str) -> Configuration {
        let config = config::Config::builder()
            .set_default("standalone", standalone)
            .unwrap()
            .set_default("node.id", node_id)
            .unwrap()
            .build()
            .unwrap();
        Configuration::from_config(config)
    }

    #[tokio::test]
    async fn test_clustered_shutdown_reclaims_entries() {
        let node = MeridianNode::start(&configuration(false, "node-a")).await;
        node.nodes().announce("entities", "A", json!("svc")).await.unwrap();

        node.shutdown().await.unwrap();

        assert!(node.nodes().entries_of("node-a").await.unwrap().is_empty());
        assert!(node.registry("entities").get("A").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_standalone_shutdown_keeps_entries() {
        let node = MeridianNode::start(&configuration(true, "solo")).await;
        node.nodes().announce("entities", "A", json!("svc")).await.unwrap();

        node.shutdown().await.unwrap();

        assert_eq!(node.nodes().entries_of("solo").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_nodes_share_a_store() {
        let shared = SharedData::in_memory();
        let a = MeridianNode::start_with(&configuration(false, "node-a"), shared.clone()).await;
        let b = MeridianNode::start_with(&configuration(false, "node-b"), shared).await;

        a.registry("entities").register("A", json!("from-a")).await.unwrap();
        b.registry("entities").register("A", json!("from-b")).await.unwrap();

        assert_eq!(a.registry("entities").get("A").await.unwrap().len(), 2);
    }
}
