// Member change event handling
// Provides event-driven notifications for cluster membership changes

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

use meridian_common::MemberState;

use crate::model::Member;

/// Type of member change event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberChangeType {
    /// A new member joined the cluster
    MemberJoin,
    /// A member left the cluster
    MemberLeave,
    /// A member's state changed (e.g., UP -> DOWN)
    MemberStateChange,
}

impl std::fmt::Display for MemberChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberChangeType::MemberJoin => write!(f, "MEMBER_JOIN"),
            MemberChangeType::MemberLeave => write!(f, "MEMBER_LEAVE"),
            MemberChangeType::MemberStateChange => write!(f, "MEMBER_STATE_CHANGE"),
        }
    }
}

/// Member change event
#[derive(Clone, Debug)]
pub struct MemberChangeEvent {
    pub change_type: MemberChangeType,
    /// The affected member
    pub member: Member,
    /// Previous state (for state changes)
    pub previous_state: Option<MemberState>,
    /// Timestamp of the event
    pub timestamp: i64,
}

impl MemberChangeEvent {
    fn new(change_type: MemberChangeType, member: Member, previous_state: Option<MemberState>) -> Self {
        Self {
            change_type,
            member,
            previous_state,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn member_join(member: Member) -> Self {
        Self::new(MemberChangeType::MemberJoin, member, None)
    }

    pub fn member_leave(member: Member) -> Self {
        Self::new(MemberChangeType::MemberLeave, member, None)
    }

    pub fn member_state_change(member: Member, previous_state: MemberState) -> Self {
        Self::new(MemberChangeType::MemberStateChange, member, Some(previous_state))
    }
}

/// Trait for handling member change events
///
/// Listeners are awaited in registration order, so long-running work must be
/// spawned rather than done inline.
#[async_trait]
pub trait MemberChangeListener: Send + Sync {
    async fn on_member_change(&self, event: &MemberChangeEvent);
}

/// Member change event publisher
/// Manages subscriptions and broadcasts events to listeners
pub struct MemberChangeEventPublisher {
    broadcast_tx: broadcast::Sender<MemberChangeEvent>,
    listeners: Arc<RwLock<Vec<Arc<dyn MemberChangeListener>>>>,
    running: Arc<RwLock<bool>>,
}

impl MemberChangeEventPublisher {
    pub fn new(queue_size: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(queue_size);

        Self {
            broadcast_tx,
            listeners: Arc::new(RwLock::new(Vec::new())),
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            return;
        }
        *running = true;
        info!("Starting member change event publisher");
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("Stopped member change event publisher");
    }

    pub async fn register_listener(&self, listener: Arc<dyn MemberChangeListener>) {
        let mut listeners = self.listeners.write().await;
        listeners.push(listener);
        debug!(
            "Registered member change listener, total: {}",
            listeners.len()
        );
    }

    /// Publish a member change event. Dropped while the publisher is stopped.
    pub async fn publish(&self, event: MemberChangeEvent) {
        let is_running = *self.running.read().await;
        if !is_running {
            return;
        }

        info!(
            "Publishing member change event: {} for {}",
            event.change_type, event.member.node_id
        );

        let _ = self.broadcast_tx.send(event.clone());

        let listeners = self.listeners.read().await.clone();
        for listener in listeners.iter() {
            listener.on_member_change(&event).await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MemberChangeEvent> {
        self.broadcast_tx.subscribe()
    }
}

/// A simple logging listener for debugging
pub struct LoggingMemberChangeListener;

#[async_trait]
impl MemberChangeListener for LoggingMemberChangeListener {
    async fn on_member_change(&self, event: &MemberChangeEvent) {
        match event.change_type {
            MemberChangeType::MemberJoin => {
                info!(
                    "[MemberEvent] Member joined: {} at {} (state: {})",
                    event.member.node_id, event.member.address, event.member.state
                );
            }
            MemberChangeType::MemberLeave => {
                info!("[MemberEvent] Member left: {}", event.member.node_id);
            }
            MemberChangeType::MemberStateChange => {
                if let Some(prev_state) = &event.previous_state {
                    info!(
                        "[MemberEvent] Member state changed: {} ({} -> {})",
                        event.member.node_id, prev_state, event.member.state
                    );
                }
            }
        }
    }
}
