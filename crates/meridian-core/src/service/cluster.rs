// Cluster membership view
// Tracks members, answers leadership queries and publishes member changes

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use meridian_common::{ClusterContext, MemberState};

use crate::model::{Configuration, Member};

use super::member_event::{
    LoggingMemberChangeListener, MemberChangeEvent, MemberChangeEventPublisher, MemberChangeListener,
};

const DEFAULT_EVENT_QUEUE_SIZE: usize = 1024;

/// Cluster member manager
///
/// Member discovery itself is external; whatever transport is in use reports
/// joins and departures here.
#[derive(Clone)]
pub struct ClusterMemberManager {
    self_member: Arc<Member>,
    server_list: Arc<DashMap<String, Member>>,
    is_standalone: bool,
    event_publisher: Arc<MemberChangeEventPublisher>,
}

impl std::fmt::Debug for ClusterMemberManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterMemberManager")
            .field("node_id", &self.self_member.node_id)
            .field("is_standalone", &self.is_standalone)
            .field("member_count", &self.server_list.len())
            .finish()
    }
}

impl ClusterMemberManager {
    pub fn new(config: &Configuration) -> Self {
        let node_id = config
            .node_id()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self::with_member(
            Member::new(node_id, config.node_address()),
            config.is_standalone(),
        )
    }

    pub fn with_member(member: Member, is_standalone: bool) -> Self {
        let server_list = Arc::new(DashMap::new());
        server_list.insert(member.node_id.clone(), member.clone());

        Self {
            self_member: Arc::new(member),
            server_list,
            is_standalone,
            event_publisher: Arc::new(MemberChangeEventPublisher::new(DEFAULT_EVENT_QUEUE_SIZE)),
        }
    }

    pub async fn start(&self) {
        info!(
            node_id = %self.self_member.node_id,
            "Starting ClusterMemberManager, standalone: {}",
            self.is_standalone
        );
        self.event_publisher.start().await;
        self.event_publisher
            .register_listener(Arc::new(LoggingMemberChangeListener))
            .await;
    }

    pub async fn stop(&self) {
        info!("Stopping ClusterMemberManager");
        self.event_publisher.stop().await;
    }

    pub fn self_member(&self) -> &Member {
        &self.self_member
    }

    pub fn is_standalone(&self) -> bool {
        self.is_standalone
    }

    pub fn all_members(&self) -> Vec<Member> {
        self.server_list.iter().map(|e| e.value().clone()).collect()
    }

    pub fn healthy_members(&self) -> Vec<Member> {
        self.server_list
            .iter()
            .filter(|e| e.value().is_healthy())
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn find_member(&self, node_id: &str) -> Option<Member> {
        self.server_list.get(node_id).map(|m| m.clone())
    }

    pub async fn register_listener(&self, listener: Arc<dyn MemberChangeListener>) {
        self.event_publisher.register_listener(listener).await;
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<MemberChangeEvent> {
        self.event_publisher.subscribe()
    }

    /// A member joined the cluster
    pub async fn member_join(&self, member: Member) {
        let previous = self.server_list.insert(member.node_id.clone(), member.clone());
        if previous.is_none() {
            self.record_member_gauges();
            self.event_publisher
                .publish(MemberChangeEvent::member_join(member))
                .await;
        }
    }

    /// A member left the cluster. Returns the departed member if it was known.
    pub async fn member_leave(&self, node_id: &str) -> Option<Member> {
        if node_id == self.self_member.node_id {
            return None;
        }

        let (_, member) = self.server_list.remove(node_id)?;
        self.record_member_gauges();
        self.event_publisher
            .publish(MemberChangeEvent::member_leave(member.clone()))
            .await;
        Some(member)
    }

    pub async fn update_member_state(&self, node_id: &str, state: MemberState) {
        let previous = match self.server_list.get_mut(node_id) {
            Some(mut member) if member.state != state => {
                let previous = member.state;
                member.state = state;
                Some((member.clone(), previous))
            }
            _ => None,
        };

        if let Some((member, previous)) = previous {
            self.record_member_gauges();
            self.event_publisher
                .publish(MemberChangeEvent::member_state_change(member, previous))
                .await;
        }
    }

    /// Check if this node is the leader
    ///
    /// In standalone mode, this always returns true. In cluster mode the
    /// first healthy member by sorted node id is the leader.
    pub fn is_leader(&self) -> bool {
        self.leader_node_id()
            .is_some_and(|leader| leader == self.self_member.node_id)
    }

    pub fn leader_node_id(&self) -> Option<String> {
        if self.is_standalone {
            return Some(self.self_member.node_id.clone());
        }

        let mut healthy: Vec<String> = self
            .server_list
            .iter()
            .filter(|e| e.value().is_healthy())
            .map(|e| e.key().clone())
            .collect();

        healthy.sort();
        healthy.into_iter().next()
    }

    fn record_member_gauges(&self) {
        metrics::gauge!("cluster_members_total").set(self.server_list.len() as f64);
        metrics::gauge!("cluster_members_healthy").set(
            self.server_list
                .iter()
                .filter(|e| e.value().is_healthy())
                .count() as f64,
        );
    }
}

impl ClusterContext for ClusterMemberManager {
    fn local_node_id(&self) -> String {
        self.self_member.node_id.clone()
    }

    fn is_standalone(&self) -> bool {
        self.is_standalone
    }

    fn is_leader(&self) -> bool {
        ClusterMemberManager::is_leader(self)
    }

    fn member_count(&self) -> usize {
        self.server_list.len()
    }
}
