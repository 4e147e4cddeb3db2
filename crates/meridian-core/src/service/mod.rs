// Core services for cluster membership and lifecycle hooks

pub mod cluster;
pub mod hook;
pub mod member_event;

// Re-export commonly used types
pub use cluster::ClusterMemberManager;
pub use hook::{Completion, HookContext, HookOutcome, HookRegistry, HookType, LifecycleHook};
pub use member_event::{
    LoggingMemberChangeListener, MemberChangeEvent, MemberChangeEventPublisher,
    MemberChangeListener, MemberChangeType,
};
