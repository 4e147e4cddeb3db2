//! Meridian Registry - write-safe cluster registry
//!
//! This crate provides:
//! - `WriteSafeRegistry`, a key to entry-list map whose mutations are
//!   serialized per key by a cluster-wide lock
//! - `NodeRegistry`, which records what each node contributed and reclaims
//!   it when the node goes away
//! - `UnregisterEntriesHook`, the lifecycle hook driving that reclaim on
//!   shutdown and on node departure

pub mod hook;
pub mod metrics;
pub mod node_index;
pub mod write_safe;

pub use hook::{UNREGISTER_ENTRIES_HOOK, UnregisterEntriesHook};
pub use node_index::{CleanupReport, EntryRef, NodeRegistry};
pub use write_safe::{REGISTRY_NAMESPACE, WriteSafeRegistry};
