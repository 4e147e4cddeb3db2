//! Meridian Consistency - cluster-wide locks and shared maps
//!
//! This crate provides:
//! - Distributed locking with fence tokens, leases and scoped release
//! - Named shared maps holding ordered, duplicate-free entry collections
//! - `SharedData` / `SharedDataAccessor` handles over both

pub mod lock;
pub mod map;
pub mod shared_data;

// Re-export lock types
pub use lock::{
    DistributedLock, DistributedLockService, LockAcquireRequest, LockAcquireResult, LockConfig,
    LockFence, LockGuard, LockReleaseRequest, LockReleaseResult, LockRenewRequest, LockRenewResult,
    LockState, LockStats, MemoryLockService,
};

// Re-export map types
pub use map::{EntryList, MemorySharedMap, MemorySharedMapProvider, SharedMap, SharedMapProvider};

pub use shared_data::{SharedData, SharedDataAccessor};
