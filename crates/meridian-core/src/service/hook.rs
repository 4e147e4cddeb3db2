// Lifecycle hooks
// Components register hooks that run before the local node shuts down and
// when a remote node leaves the cluster. Each hook reports back through a
// one-shot completion signal which the registry awaits with a timeout.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, error, info, warn};

use meridian_common::{RegistryError, Result};

use crate::model::HookConfig;

use super::member_event::{MemberChangeEvent, MemberChangeListener, MemberChangeType};

/// The membership events a hook can react to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookType {
    /// The local node is about to leave the cluster
    BeforeShutdown,
    /// A remote node has left the cluster
    NodeLeft,
}

impl std::fmt::Display for HookType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookType::BeforeShutdown => write!(f, "BEFORE_SHUTDOWN"),
            HookType::NodeLeft => write!(f, "NODE_LEFT"),
        }
    }
}

/// Event context handed to each hook invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookContext {
    pub hook_type: HookType,
    /// Departed node, set for `NodeLeft`
    pub node_id: Option<String>,
}

impl HookContext {
    pub fn before_shutdown() -> Self {
        Self {
            hook_type: HookType::BeforeShutdown,
            node_id: None,
        }
    }

    pub fn node_left(node_id: impl Into<String>) -> Self {
        Self {
            hook_type: HookType::NodeLeft,
            node_id: Some(node_id.into()),
        }
    }
}

/// One-shot completion signal for a hook invocation
///
/// Dropping it without calling `complete` counts as a failure.
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<Result<()>>,
}

impl Completion {
    fn new(tx: oneshot::Sender<Result<()>>) -> Self {
        Self { tx }
    }

    pub fn complete(self, result: Result<()>) {
        // The registry may already have given up on this hook
        let _ = self.tx.send(result);
    }

    pub fn succeed(self) {
        self.complete(Ok(()))
    }

    pub fn fail(self, error: RegistryError) {
        self.complete(Err(error))
    }
}

/// A lifecycle hook. Both handlers succeed immediately unless overridden.
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    fn name(&self) -> &str;

    async fn before_shutdown(&self, _ctx: &HookContext, completion: Completion) {
        completion.succeed();
    }

    async fn node_left(&self, _ctx: &HookContext, completion: Completion) {
        completion.succeed();
    }
}

/// Result of a single hook invocation
#[derive(Debug)]
pub struct HookOutcome {
    pub hook: String,
    pub result: Result<()>,
}

impl HookOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Registered lifecycle hooks
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Arc<RwLock<Vec<Arc<dyn LifecycleHook>>>>,
    config: HookConfig,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HookRegistry {
    pub fn new(config: HookConfig) -> Self {
        Self {
            hooks: Arc::new(RwLock::new(Vec::new())),
            config,
        }
    }

    pub async fn register(&self, hook: Arc<dyn LifecycleHook>) {
        let mut hooks = self.hooks.write().await;
        debug!("Registered lifecycle hook '{}'", hook.name());
        hooks.push(hook);
    }

    pub async fn len(&self) -> usize {
        self.hooks.read().await.len()
    }

    /// Run every registered hook for `ctx` concurrently and wait for all
    /// completion signals. Outcomes are returned in registration order.
    pub async fn execute(&self, ctx: HookContext) -> Vec<HookOutcome> {
        let hooks = self.hooks.read().await.clone();
        let timeout = self.config.timeout;

        let pending: Vec<_> = hooks
            .into_iter()
            .map(|hook| {
                let (tx, rx) = oneshot::channel();
                let name = hook.name().to_string();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let completion = Completion::new(tx);
                    match ctx.hook_type {
                        HookType::BeforeShutdown => hook.before_shutdown(&ctx, completion).await,
                        HookType::NodeLeft => hook.node_left(&ctx, completion).await,
                    }
                });
                (name, rx)
            })
            .collect();

        join_all(pending.into_iter().map(|(name, rx)| async move {
            let result = match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(RegistryError::hook(&name, "completion dropped without a result")),
                Err(_) => Err(RegistryError::hook(
                    &name,
                    format!("no completion within {}ms", timeout.as_millis()),
                )),
            };
            HookOutcome { hook: name, result }
        }))
        .await
    }

    /// Run the `BeforeShutdown` hooks. Returns the first failure, after
    /// logging every failed hook.
    pub async fn before_shutdown(&self) -> Result<()> {
        info!("Executing before-shutdown hooks");
        let mut first_error = None;
        for outcome in self.execute(HookContext::before_shutdown()).await {
            if let Err(e) = outcome.result {
                error!(hook = %outcome.hook, "Before-shutdown hook failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Run the `NodeLeft` hooks for a departed node
    pub async fn node_left(&self, node_id: &str) -> Vec<HookOutcome> {
        self.execute(HookContext::node_left(node_id)).await
    }
}

#[async_trait]
impl MemberChangeListener for HookRegistry {
    async fn on_member_change(&self, event: &MemberChangeEvent) {
        if event.change_type != MemberChangeType::MemberLeave {
            return;
        }

        let registry = self.clone();
        let node_id = event.member.node_id.clone();
        tokio::spawn(async move {
            for outcome in registry.node_left(&node_id).await {
                match outcome.result {
                    Ok(()) => debug!(hook = %outcome.hook, node_id = %node_id, "Node-left hook completed"),
                    Err(e) => warn!(hook = %outcome.hook, node_id = %node_id, "Node-left hook failed: {}", e),
                }
            }
        });
    }
}
