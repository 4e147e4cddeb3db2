//! Distributed lock data model

use serde::{Deserialize, Serialize};

use meridian_common::NAMESPACE_SEPARATOR;

/// Default lease on a held lock
pub const DEFAULT_LOCK_TTL_MS: u64 = 30_000;

/// Default time an acquisition waits for the current holder
pub const DEFAULT_LOCK_WAIT_MS: u64 = 10_000;

/// Lock state enumeration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Lock is available
    #[default]
    Unlocked,
    /// Lock is held by an owner
    Locked,
    /// The holder's lease ran out before it released
    Expired,
}

/// Distributed lock entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedLock {
    /// Unique lock key (namespace::name format)
    pub key: String,
    pub name: String,
    pub namespace: String,
    pub state: LockState,
    /// Current owner (one id per acquisition)
    #[serde(default)]
    pub owner: Option<String>,
    /// Lock version (incremented on each state change)
    #[serde(default)]
    pub version: u64,
    /// Fence token (monotonically increasing across acquisitions)
    #[serde(default)]
    pub fence_token: u64,
    /// Lock acquisition timestamp (Unix millis)
    #[serde(default)]
    pub acquired_at: Option<i64>,
    /// Lock expiration timestamp (Unix millis)
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub ttl_ms: u64,
    /// Last lease renewal timestamp (Unix millis)
    #[serde(default)]
    pub last_renewed_at: Option<i64>,
    /// Renewals during the current acquisition
    #[serde(default)]
    pub renewal_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DistributedLock {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let name = name.into();
        let now = current_timestamp();
        Self {
            key: lock_key(&namespace, &name),
            name,
            namespace,
            state: LockState::Unlocked,
            owner: None,
            version: 0,
            fence_token: 0,
            acquired_at: None,
            expires_at: None,
            ttl_ms: DEFAULT_LOCK_TTL_MS,
            last_renewed_at: None,
            renewal_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the lock is currently held
    pub fn is_locked(&self) -> bool {
        self.state == LockState::Locked && !self.is_expired()
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| current_timestamp() >= expires_at)
    }

    /// Check if the given owner holds this lock
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.is_locked() && self.owner.as_deref() == Some(owner)
    }

    /// Remaining lease in milliseconds
    pub fn remaining_ttl_ms(&self) -> u64 {
        match self.expires_at {
            Some(expires_at) => (expires_at - current_timestamp()).max(0) as u64,
            None => 0,
        }
    }

    /// Acquire the lock for a given owner. The lock is not reentrant.
    pub fn acquire(&mut self, owner: impl Into<String>, ttl_ms: u64) -> bool {
        if self.is_locked() {
            return false;
        }

        let now = current_timestamp();
        self.state = LockState::Locked;
        self.owner = Some(owner.into());
        self.ttl_ms = ttl_ms;
        self.acquired_at = Some(now);
        self.expires_at = Some(now + ttl_ms as i64);
        self.version += 1;
        self.fence_token += 1;
        self.updated_at = now;
        true
    }

    pub fn release(&mut self, owner: &str) -> bool {
        if !self.is_owned_by(owner) {
            return false;
        }
        self.clear(LockState::Unlocked);
        true
    }

    /// Extend the lease of a held lock by its ttl. Fails once the lease ran out.
    pub fn renew(&mut self, owner: &str) -> bool {
        if !self.is_owned_by(owner) {
            return false;
        }

        let now = current_timestamp();
        self.expires_at = Some(now + self.ttl_ms as i64);
        self.last_renewed_at = Some(now);
        self.renewal_count += 1;
        self.version += 1;
        self.updated_at = now;
        true
    }

    /// Force release the lock (admin operation)
    pub fn force_release(&mut self) {
        self.clear(LockState::Unlocked);
    }

    /// Mark an out-of-lease lock as expired
    pub fn expire(&mut self) -> bool {
        if self.state == LockState::Locked && self.is_expired() {
            self.clear(LockState::Expired);
            return true;
        }
        false
    }

    fn clear(&mut self, state: LockState) {
        self.state = state;
        self.owner = None;
        self.acquired_at = None;
        self.expires_at = None;
        self.last_renewed_at = None;
        self.renewal_count = 0;
        self.version += 1;
        self.updated_at = current_timestamp();
    }
}

/// Lock acquisition request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockAcquireRequest {
    pub namespace: String,
    pub name: String,
    /// Owner id, unique per acquisition
    pub owner: String,
    /// Lease in milliseconds
    #[serde(default = "default_ttl")]
    pub ttl_ms: u64,
    /// Maximum wait time in milliseconds (0 = non-blocking)
    #[serde(default)]
    pub wait_ms: u64,
}

fn default_ttl() -> u64 {
    DEFAULT_LOCK_TTL_MS
}

impl LockAcquireRequest {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            owner: owner.into(),
            ttl_ms: DEFAULT_LOCK_TTL_MS,
            wait_ms: 0,
        }
    }

    pub fn with_config(mut self, config: &LockConfig) -> Self {
        self.ttl_ms = config.ttl_ms;
        self.wait_ms = config.wait_ms;
        self
    }

    pub fn key(&self) -> String {
        lock_key(&self.namespace, &self.name)
    }
}

/// Lock acquisition result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockAcquireResult {
    pub acquired: bool,
    /// Fence token of this acquisition
    pub fence_token: u64,
    /// Current owner (if lock is held by someone else)
    pub current_owner: Option<String>,
    pub error: Option<String>,
}

/// Lock release request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockReleaseRequest {
    pub namespace: String,
    pub name: String,
    pub owner: String,
    /// Expected fence token (for fencing)
    #[serde(default)]
    pub fence_token: Option<u64>,
}

/// Lock release result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockReleaseResult {
    pub released: bool,
    pub error: Option<String>,
}

/// Lease renewal request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRenewRequest {
    pub namespace: String,
    pub name: String,
    pub owner: String,
    /// Expected fence token; a newer acquisition is never renewed
    #[serde(default)]
    pub fence_token: Option<u64>,
}

/// Lease renewal result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockRenewResult {
    pub renewed: bool,
    /// New expiration timestamp
    pub expires_at: Option<i64>,
    pub renewal_count: u32,
    pub error: Option<String>,
}

/// Lock statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockStats {
    /// Total locks created
    pub total_locks: u64,
    /// Currently held locks
    pub active_locks: u32,
    pub total_acquisitions: u64,
    pub total_releases: u64,
    pub total_renewals: u64,
    /// Leases that ran out before release
    pub expired_locks: u64,
    /// Failed acquisitions (lock contention or timeout)
    pub failed_acquisitions: u64,
}

/// Timing knobs applied to every registry lock acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    pub wait_ms: u64,
    pub ttl_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_ms: DEFAULT_LOCK_WAIT_MS,
            ttl_ms: DEFAULT_LOCK_TTL_MS,
        }
    }
}

pub fn lock_key(namespace: &str, name: &str) -> String {
    format!("{}{}{}", namespace, NAMESPACE_SEPARATOR, name)
}

pub(crate) fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
