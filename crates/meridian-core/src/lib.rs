//! Meridian Core - Cluster membership and lifecycle
//!
//! This crate provides:
//! - Cluster member management and leadership queries
//! - Member change events
//! - Lifecycle hooks run before shutdown and on node departure
//! - Layered application configuration

pub mod model;
pub mod service;

// Re-export cluster module
pub mod cluster {
    pub use crate::service::cluster::ClusterMemberManager;
    pub use crate::service::member_event::{MemberChangeEvent, MemberChangeListener, MemberChangeType};
}

// Re-export commonly used types
pub use model::{Configuration, HookConfig, Member};
pub use service::{
    ClusterMemberManager, Completion, HookContext, HookOutcome, HookRegistry, HookType,
    LifecycleHook,
};
