//! Shared map service
//!
//! `SharedMap` is the seam to the cluster's replicated key-value store. The
//! in-memory implementation keeps each value as a serialized JSON document,
//! so every read hands back a fresh copy and callers never alias each other.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::model::EntryList;

/// A named cluster-wide map of key to entry collection
#[async_trait]
pub trait SharedMap: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> anyhow::Result<Option<EntryList>>;

    async fn put(&self, key: &str, value: EntryList) -> anyhow::Result<()>;

    /// Remove a key. Removing an absent key is a no-op.
    async fn remove(&self, key: &str) -> anyhow::Result<()>;

    async fn keys(&self) -> anyhow::Result<Vec<String>>;
}

/// Hands out map instances by name
#[async_trait]
pub trait SharedMapProvider: Send + Sync {
    async fn get_async_map(&self, name: &str) -> anyhow::Result<Arc<dyn SharedMap>>;
}

/// In-memory shared map
pub struct MemorySharedMap {
    name: String,
    documents: DashMap<String, String>,
}

impl MemorySharedMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl SharedMap for MemorySharedMap {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<EntryList>> {
        let Some(doc) = self.documents.get(key).map(|d| d.clone()) else {
            return Ok(None);
        };
        let entries = serde_json::from_str(&doc)
            .with_context(|| format!("corrupt document under '{}' in map '{}'", key, self.name))?;
        Ok(Some(entries))
    }

    async fn put(&self, key: &str, value: EntryList) -> anyhow::Result<()> {
        let doc = serde_json::to_string(&value)?;
        self.documents.insert(key.to_string(), doc);
        debug!(map = %self.name, key = %key, entries = value.len(), "Shared map put");
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        if self.documents.remove(key).is_some() {
            debug!(map = %self.name, key = %key, "Shared map remove");
        }
        Ok(())
    }

    async fn keys(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.documents.iter().map(|e| e.key().clone()).collect())
    }
}

/// In-memory map provider; one instance stands in for the cluster store
#[derive(Default)]
pub struct MemorySharedMapProvider {
    maps: DashMap<String, Arc<MemorySharedMap>>,
}

impl MemorySharedMapProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedMapProvider for MemorySharedMapProvider {
    async fn get_async_map(&self, name: &str) -> anyhow::Result<Arc<dyn SharedMap>> {
        let map: Arc<dyn SharedMap> = self
            .maps
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemorySharedMap::new(name)))
            .clone();
        Ok(map)
    }
}
