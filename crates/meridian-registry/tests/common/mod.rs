//! Common test utilities for registry integration tests
//!
//! This module provides shared test infrastructure including:
//! - A shared in-memory store that several simulated nodes write to
//! - A map provider that injects failures, delays, pauses and extra index
//!   values for chosen keys
//! - A polling helper for effects produced by spawned tasks

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde_json::{Value, json};
use tokio::sync::Notify;

use meridian_common::{DEFAULT_REGISTRY_NAME, StaticClusterContext};
use meridian_consistency::{
    EntryList, LockConfig, MemoryLockService, MemorySharedMapProvider, SharedData, SharedMap,
    SharedMapProvider,
};
use meridian_registry::{NodeRegistry, WriteSafeRegistry};

/// Lock settings for tests: short waits so a leaked lock fails fast
pub const TEST_LOCK_CONFIG: LockConfig = LockConfig {
    wait_ms: 200,
    ttl_ms: 30_000,
};

/// A one-shot stop point: the map parks after the matching operation until
/// the test resumes it
#[derive(Default)]
pub struct Gate {
    reached: Notify,
    resume: Notify,
}

#[allow(dead_code)]
impl Gate {
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn resume(&self) {
        self.resume.notify_one();
    }
}

/// After each put of `trigger`, add a fresh entry reference to `target`
struct Injection {
    trigger: String,
    target: String,
    registry: String,
    remaining: AtomicUsize,
    issued: AtomicUsize,
}

/// Per-key behaviour of the wrapped maps
#[derive(Clone, Default)]
pub struct StoreSwitch {
    puts: Arc<DashSet<String>>,
    gets: Arc<DashSet<String>>,
    slow_puts: Arc<DashMap<String, Duration>>,
    slow_gets: Arc<DashMap<String, Duration>>,
    gates: Arc<DashMap<String, Arc<Gate>>>,
    injections: Arc<DashMap<String, Arc<Injection>>>,
}

#[allow(dead_code)]
impl StoreSwitch {
    pub fn fail_put(&self, key: &str) {
        self.puts.insert(key.to_string());
    }

    pub fn fail_get(&self, key: &str) {
        self.gets.insert(key.to_string());
    }

    pub fn delay_put(&self, key: &str, delay: Duration) {
        self.slow_puts.insert(key.to_string(), delay);
    }

    pub fn delay_get(&self, key: &str, delay: Duration) {
        self.slow_gets.insert(key.to_string(), delay);
    }

    /// Park the next put of `key` once it has been written
    pub fn pause_after_put(&self, key: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates.insert(key.to_string(), gate.clone());
        gate
    }

    /// After the next `times` puts of `trigger`, add a new reference to
    /// `registry`/`trigger` under the index key `target` of the same map
    pub fn inject_on_put(&self, trigger: &str, target: &str, registry: &str, times: usize) {
        self.injections.insert(
            trigger.to_string(),
            Arc::new(Injection {
                trigger: trigger.to_string(),
                target: target.to_string(),
                registry: registry.to_string(),
                remaining: AtomicUsize::new(times),
                issued: AtomicUsize::new(0),
            }),
        );
    }

    pub fn heal(&self) {
        self.puts.clear();
        self.gets.clear();
        self.slow_puts.clear();
        self.slow_gets.clear();
        self.gates.clear();
        self.injections.clear();
    }
}

struct FailingMap {
    inner: Arc<dyn SharedMap>,
    switch: StoreSwitch,
}

impl FailingMap {
    async fn inject(&self, injection: &Injection) -> anyhow::Result<()> {
        let claimed = injection
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if claimed.is_err() {
            return Ok(());
        }

        let n = injection.issued.fetch_add(1, Ordering::SeqCst);
        let reference: Value = json!({
            "registry": injection.registry,
            "key": injection.trigger,
            "value": format!("late-{n}"),
        });
        let mut entries = self.inner.get(&injection.target).await?.unwrap_or_default();
        entries.insert(reference);
        self.inner.put(&injection.target, entries).await
    }
}

#[async_trait]
impl SharedMap for FailingMap {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<EntryList>> {
        if self.switch.gets.contains(key) {
            anyhow::bail!("injected get failure for '{}'", key);
        }
        let delay = self.switch.slow_gets.get(key).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: EntryList) -> anyhow::Result<()> {
        if self.switch.puts.contains(key) {
            anyhow::bail!("injected put failure for '{}'", key);
        }
        let delay = self.switch.slow_puts.get(key).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.inner.put(key, value).await?;

        let injection = self.switch.injections.get(key).map(|i| i.clone());
        if let Some(injection) = injection {
            self.inject(&injection).await?;
        }

        let gate = self.switch.gates.remove(key).map(|(_, gate)| gate);
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.resume.notified().await;
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.inner.remove(key).await
    }

    async fn keys(&self) -> anyhow::Result<Vec<String>> {
        self.inner.keys().await
    }
}

struct FailingMapProvider {
    inner: MemorySharedMapProvider,
    switch: StoreSwitch,
}

#[async_trait]
impl SharedMapProvider for FailingMapProvider {
    async fn get_async_map(&self, name: &str) -> anyhow::Result<Arc<dyn SharedMap>> {
        let inner = self.inner.get_async_map(name).await?;
        Ok(Arc::new(FailingMap {
            inner,
            switch: self.switch.clone(),
        }))
    }
}

/// A shared store whose maps misbehave on demand
#[allow(dead_code)]
pub fn failing_store() -> (SharedData, StoreSwitch) {
    failing_store_with(TEST_LOCK_CONFIG)
}

#[allow(dead_code)]
pub fn failing_store_with(lock_config: LockConfig) -> (SharedData, StoreSwitch) {
    let switch = StoreSwitch::default();
    let provider = FailingMapProvider {
        inner: MemorySharedMapProvider::new(),
        switch: switch.clone(),
    };
    let shared = SharedData::new(Arc::new(MemoryLockService::new()), Arc::new(provider))
        .with_lock_config(lock_config);
    (shared, switch)
}

pub fn store() -> SharedData {
    SharedData::in_memory().with_lock_config(TEST_LOCK_CONFIG)
}

/// Registry handle of a simulated clustered node
#[allow(dead_code)]
pub fn registry_on(shared: &SharedData, node_id: &str) -> WriteSafeRegistry {
    WriteSafeRegistry::new(
        shared,
        Arc::new(StaticClusterContext::clustered(node_id, false)),
        DEFAULT_REGISTRY_NAME,
    )
}

/// Node registry of a simulated clustered node
#[allow(dead_code)]
pub fn nodes_on(shared: &SharedData, node_id: &str, leader: bool) -> NodeRegistry {
    NodeRegistry::new(
        shared.clone(),
        Arc::new(StaticClusterContext::clustered(node_id, leader)),
        DEFAULT_REGISTRY_NAME,
    )
}

/// Poll `check` until it holds, for at most two seconds
#[allow(dead_code)]
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
