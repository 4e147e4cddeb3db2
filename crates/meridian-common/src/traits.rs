//! Context traits for dependency injection
//!
//! Components receive an explicit cluster handle at construction instead of
//! reaching for process-wide state. Tests build a local context per case.

/// Member state in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberState {
    Up,
    Down,
    Suspicious,
}

impl std::fmt::Display for MemberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberState::Up => write!(f, "UP"),
            MemberState::Down => write!(f, "DOWN"),
            MemberState::Suspicious => write!(f, "SUSPICIOUS"),
        }
    }
}

/// Cluster management context trait
///
/// Provides the identity and leadership queries the registry cleanup needs.
/// Every method is non-blocking.
pub trait ClusterContext: Send + Sync {
    /// Identifier of this node, stable for its cluster membership lifetime
    fn local_node_id(&self) -> String;

    /// Check if running in standalone mode
    fn is_standalone(&self) -> bool;

    /// Check if this process is part of a cluster
    fn is_clustered(&self) -> bool {
        !self.is_standalone()
    }

    /// Check if this node is the leader
    fn is_leader(&self) -> bool;

    /// Get the current member count
    fn member_count(&self) -> usize;
}

/// A fixed cluster view, handy for wiring and tests
#[derive(Debug, Clone)]
pub struct StaticClusterContext {
    pub node_id: String,
    pub standalone: bool,
    pub leader: bool,
}

impl StaticClusterContext {
    pub fn clustered(node_id: impl Into<String>, leader: bool) -> Self {
        Self {
            node_id: node_id.into(),
            standalone: false,
            leader,
        }
    }

    pub fn standalone(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            standalone: true,
            leader: true,
        }
    }
}

impl ClusterContext for StaticClusterContext {
    fn local_node_id(&self) -> String {
        self.node_id.clone()
    }

    fn is_standalone(&self) -> bool {
        self.standalone
    }

    fn is_leader(&self) -> bool {
        self.leader
    }

    fn member_count(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_state_display() {
        assert_eq!(format!("{}", MemberState::Up), "UP");
        assert_eq!(format!("{}", MemberState::Down), "DOWN");
        assert_eq!(format!("{}", MemberState::Suspicious), "SUSPICIOUS");
    }

    #[test]
    fn test_static_context() {
        let ctx = StaticClusterContext::clustered("node-1", false);
        assert!(ctx.is_clustered());
        assert!(!ctx.is_leader());
        assert_eq!(ctx.local_node_id(), "node-1");

        let ctx = StaticClusterContext::standalone("solo");
        assert!(!ctx.is_clustered());
        assert!(ctx.is_leader());
    }
}
