//! Error types for Meridian
//!
//! `RegistryError` is the failure taxonomy shared by the registry, the
//! node cleanup procedure and the lifecycle hooks. Store-facing traits
//! return `anyhow::Result`; the registry layer converts those failures
//! into one of the variants below with the key or node id attached.

/// Registry and cluster-cleanup failures
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    /// The per-key lock could not be acquired. Nothing was mutated.
    #[error("failed to acquire lock for '{key}': {reason}")]
    LockFailure { key: String, reason: String },

    /// A get/put/remove against the shared map failed.
    #[error("shared map '{map}' operation on '{key}' failed: {reason}")]
    MapFailure {
        map: String,
        key: String,
        reason: String,
    },

    /// The first-insert callback failed. The value is present in the map.
    #[error("value registered under '{key}' but first-insert callback failed: {reason}")]
    CallbackFailure { key: String, reason: String },

    /// Some per-entry unregister calls of a node cleanup failed.
    #[error("cleanup of node '{node_id}' incomplete: {failed} of {total} entries failed")]
    PartialCleanup {
        node_id: String,
        failed: usize,
        total: usize,
    },

    /// A lifecycle hook reported failure or never completed.
    #[error("hook '{hook}' failed: {reason}")]
    Hook { hook: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl RegistryError {
    pub fn lock(key: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        RegistryError::LockFailure {
            key: key.into(),
            reason: cause.to_string(),
        }
    }

    pub fn map(map: impl Into<String>, key: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        RegistryError::MapFailure {
            map: map.into(),
            key: key.into(),
            reason: cause.to_string(),
        }
    }

    pub fn callback(key: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        RegistryError::CallbackFailure {
            key: key.into(),
            reason: cause.to_string(),
        }
    }

    pub fn hook(hook: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        RegistryError::Hook {
            hook: hook.into(),
            reason: cause.to_string(),
        }
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::LockFailure { .. } => "lock",
            RegistryError::MapFailure { .. } => "map",
            RegistryError::CallbackFailure { .. } => "callback",
            RegistryError::PartialCleanup { .. } => "partial_cleanup",
            RegistryError::Hook { .. } => "hook",
            RegistryError::Config(_) => "config",
        }
    }

    /// True when the value was written even though the call failed.
    pub fn entry_present(&self) -> bool {
        matches!(self, RegistryError::CallbackFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_context() {
        let err = RegistryError::lock("orders", "timeout");
        assert_eq!(err.to_string(), "failed to acquire lock for 'orders': timeout");

        let err = RegistryError::map("entityRegistry", "orders", "store unavailable");
        assert!(err.to_string().contains("entityRegistry"));
        assert!(err.to_string().contains("orders"));

        let err = RegistryError::PartialCleanup {
            node_id: "node-1".to_string(),
            failed: 1,
            total: 3,
        };
        assert_eq!(
            err.to_string(),
            "cleanup of node 'node-1' incomplete: 1 of 3 entries failed"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(RegistryError::lock("k", "x").kind(), "lock");
        assert_eq!(RegistryError::callback("k", "x").kind(), "callback");
        assert_eq!(RegistryError::Config("bad".into()).kind(), "config");
    }

    #[test]
    fn test_callback_failure_means_entry_present() {
        assert!(RegistryError::callback("k", "x").entry_present());
        assert!(!RegistryError::lock("k", "x").entry_present());
        assert!(!RegistryError::map("m", "k", "x").entry_present());
    }

    #[test]
    fn test_from_anyhow_context() {
        let cause = anyhow::anyhow!("connection reset");
        let err = RegistryError::map("m", "k", cause);
        assert!(err.to_string().ends_with("connection reset"));
    }
}
