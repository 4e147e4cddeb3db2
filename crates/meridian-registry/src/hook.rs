// Lifecycle hook reclaiming a node's registry entries
// Runs on local shutdown for this node, and on the leader for departed nodes

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use meridian_common::{ClusterContext, RegistryError, Result};
use meridian_core::{Completion, HookContext, LifecycleHook};

use crate::node_index::{CleanupReport, NodeRegistry};

pub const UNREGISTER_ENTRIES_HOOK: &str = "unregister-entries";

#[derive(Clone, Debug)]
pub struct UnregisterEntriesHook {
    nodes: NodeRegistry,
}

impl UnregisterEntriesHook {
    pub fn new(nodes: NodeRegistry) -> Self {
        Self { nodes }
    }

    fn cluster(&self) -> &Arc<dyn ClusterContext> {
        self.nodes.cluster()
    }

    /// Unregister everything `node_id` contributed. Returns `None` without
    /// touching the store when this process is not clustered.
    pub async fn unregister(&self, node_id: &str) -> Result<Option<CleanupReport>> {
        if !self.cluster().is_clustered() {
            debug!(node_id = %node_id, "Not clustered, nothing to unregister");
            return Ok(None);
        }
        self.nodes.unregister_node(node_id).await.map(Some)
    }
}

#[async_trait]
impl LifecycleHook for UnregisterEntriesHook {
    fn name(&self) -> &str {
        UNREGISTER_ENTRIES_HOOK
    }

    async fn before_shutdown(&self, _ctx: &HookContext, completion: Completion) {
        info!("Unregistering entries on shutdown");
        let node_id = self.cluster().local_node_id();

        let result = self.unregister(&node_id).await;
        match &result {
            Ok(_) => info!(node_id = %node_id, "Entries unregistered successfully"),
            Err(e) => error!(node_id = %node_id, "Failed to unregister entries on shutdown: {}", e),
        }
        completion.complete(result.map(|_| ()));
    }

    async fn node_left(&self, ctx: &HookContext, completion: Completion) {
        let Some(node_id) = ctx.node_id.as_deref() else {
            completion.fail(RegistryError::hook(UNREGISTER_ENTRIES_HOOK, "node-left event without node id"));
            return;
        };

        info!(node_id = %node_id, "Cleanup entries of departed node");
        if !self.cluster().is_leader() {
            debug!(node_id = %node_id, "Not the leader, leaving cleanup to the leader");
            completion.succeed();
            return;
        }

        let result = self.unregister(node_id).await;
        match &result {
            Ok(_) => info!(node_id = %node_id, "Entries of departed node cleaned up"),
            Err(e) => error!(node_id = %node_id, "Failed to clean up entries of departed node: {}", e),
        }
        completion.complete(result.map(|_| ()));
    }
}
