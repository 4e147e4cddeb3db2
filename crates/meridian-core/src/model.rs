// Core data models and configuration
// Cluster member description and the layered application configuration

use std::time::Duration;

use config::{Config, Environment, File};
use meridian_common::{DEFAULT_REGISTRY_NAME, MemberState, RegistryError};
use meridian_consistency::LockConfig;

pub const STANDALONE_PROPERTY: &str = "standalone";
pub const NODE_ID_PROPERTY: &str = "node.id";
pub const NODE_ADDRESS_PROPERTY: &str = "node.address";
pub const REGISTRY_NAME_PROPERTY: &str = "registry.name";
pub const LOCK_WAIT_MS_PROPERTY: &str = "lock.wait_ms";
pub const LOCK_TTL_MS_PROPERTY: &str = "lock.ttl_ms";
pub const HOOK_TIMEOUT_MS_PROPERTY: &str = "hook.timeout_ms";
pub const LOG_DIR_PROPERTY: &str = "log.dir";
pub const LOG_LEVEL_PROPERTY: &str = "log.level";
pub const LOG_FILE_PROPERTY: &str = "log.file";
pub const METRICS_ENABLED_PROPERTY: &str = "metrics.enabled";
pub const METRICS_LISTEN_PROPERTY: &str = "metrics.listen";

/// Default configuration file, optional
pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";

const DEFAULT_HOOK_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_METRICS_LISTEN: &str = "127.0.0.1:9464";

/// A cluster member
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub node_id: String,
    pub address: String,
    pub state: MemberState,
}

impl Member {
    pub fn new(node_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            address: address.into(),
            state: MemberState::Up,
        }
    }

    pub fn with_state(mut self, state: MemberState) -> Self {
        self.state = state;
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.state == MemberState::Up
    }
}

/// Lifecycle hook execution settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookConfig {
    /// How long a hook may take before its completion counts as failed
    pub timeout: Duration,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_HOOK_TIMEOUT_MS),
        }
    }
}

/// Application configuration loaded from defaults, config file and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Create a new configuration from a Config instance
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Load configuration layered as defaults < file < `MERIDIAN_*` environment.
    ///
    /// Nested keys use a double underscore in the environment, e.g.
    /// `MERIDIAN_LOCK__WAIT_MS=500`.
    pub fn load(file: Option<&str>) -> Result<Self, RegistryError> {
        Self::builder(file)
            .and_then(|builder| builder.build())
            .map(Self::from_config)
            .map_err(|e| RegistryError::Config(e.to_string()))
    }

    /// The default-seeded builder, for callers adding their own overrides
    pub fn builder(
        file: Option<&str>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        let defaults = LockConfig::default();
        Ok(Config::builder()
            .set_default(STANDALONE_PROPERTY, true)?
            .set_default(REGISTRY_NAME_PROPERTY, DEFAULT_REGISTRY_NAME)?
            .set_default(LOCK_WAIT_MS_PROPERTY, defaults.wait_ms)?
            .set_default(LOCK_TTL_MS_PROPERTY, defaults.ttl_ms)?
            .set_default(HOOK_TIMEOUT_MS_PROPERTY, DEFAULT_HOOK_TIMEOUT_MS)?
            .set_default(LOG_LEVEL_PROPERTY, "info")?
            .set_default(LOG_FILE_PROPERTY, false)?
            .set_default(METRICS_ENABLED_PROPERTY, false)?
            .set_default(METRICS_LISTEN_PROPERTY, DEFAULT_METRICS_LISTEN)?
            .add_source(File::with_name(file.unwrap_or(DEFAULT_CONFIG_FILE)).required(false))
            .add_source(
                Environment::with_prefix("MERIDIAN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            ))
    }

    /// Check if running in standalone (non-clustered) mode
    pub fn is_standalone(&self) -> bool {
        self.config.get_bool(STANDALONE_PROPERTY).unwrap_or(true)
    }

    /// Configured node id, if any
    pub fn node_id(&self) -> Option<String> {
        self.config
            .get_string(NODE_ID_PROPERTY)
            .ok()
            .filter(|id| !id.is_empty())
    }

    pub fn node_address(&self) -> String {
        self.config
            .get_string(NODE_ADDRESS_PROPERTY)
            .unwrap_or_else(|_| "127.0.0.1".to_string())
    }

    /// Name of the shared map backing the entry and node-index registry
    pub fn registry_name(&self) -> String {
        self.config
            .get_string(REGISTRY_NAME_PROPERTY)
            .unwrap_or_else(|_| DEFAULT_REGISTRY_NAME.to_string())
    }

    pub fn lock_config(&self) -> LockConfig {
        let defaults = LockConfig::default();
        LockConfig {
            wait_ms: self
                .config
                .get_int(LOCK_WAIT_MS_PROPERTY)
                .map(|v| v.max(0) as u64)
                .unwrap_or(defaults.wait_ms),
            ttl_ms: self
                .config
                .get_int(LOCK_TTL_MS_PROPERTY)
                .map(|v| v.max(1) as u64)
                .unwrap_or(defaults.ttl_ms),
        }
    }

    pub fn hook_config(&self) -> HookConfig {
        HookConfig {
            timeout: Duration::from_millis(
                self.config
                    .get_int(HOOK_TIMEOUT_MS_PROPERTY)
                    .map(|v| v.max(0) as u64)
                    .unwrap_or(DEFAULT_HOOK_TIMEOUT_MS),
            ),
        }
    }

    pub fn log_dir(&self) -> Option<String> {
        self.config.get_string(LOG_DIR_PROPERTY).ok()
    }

    pub fn log_level(&self) -> String {
        self.config
            .get_string(LOG_LEVEL_PROPERTY)
            .unwrap_or_else(|_| "info".to_string())
    }

    pub fn file_logging(&self) -> bool {
        self.config.get_bool(LOG_FILE_PROPERTY).unwrap_or(false)
    }

    /// Whether to serve Prometheus metrics
    pub fn metrics_enabled(&self) -> bool {
        self.config.get_bool(METRICS_ENABLED_PROPERTY).unwrap_or(false)
    }

    pub fn metrics_listen(&self) -> String {
        self.config
            .get_string(METRICS_LISTEN_PROPERTY)
            .unwrap_or_else(|_| DEFAULT_METRICS_LISTEN.to_string())
    }
}
