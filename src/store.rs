//! Namespace-sharded concurrent object store
//!
//! The controller's authoritative in-memory cache. The format is
//! namespace -> (object name -> record): an outer lock-guarded map hands out
//! one shard per namespace, and each shard guards its own object map. The two
//! independent lock levels bound contention to operations that share a
//! namespace; cross-namespace operations never block one another.
//!
//! The store is the only shared mutable state in the sync core. It is never
//! exposed for external mutation except through the operation set below, so
//! no caller can observe a half-updated shard.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard};

/// One namespace's object map plus its guarding lock.
///
/// Shards are only handed out as `Arc<Shard<T>>` by [`ObjectStore::shard`],
/// so a handle stays valid even if the namespace is torn down concurrently;
/// the torn-down shard simply stops being reachable for new callers.
#[derive(Debug)]
pub struct Shard<T> {
    objects: RwLock<HashMap<String, T>>,
}

impl<T> Default for Shard<T> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Clone> Shard<T> {
    /// Create an empty shard
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record stored under `name`
    pub async fn upsert(&self, name: impl Into<String>, object: T) {
        let mut objects = self.objects.write().await;
        objects.insert(name.into(), object);
    }

    /// Remove the record stored under `name`, reporting whether it existed
    pub async fn delete(&self, name: &str) -> bool {
        let mut objects = self.objects.write().await;
        objects.remove(name).is_some()
    }

    /// Look up the record stored under `name`
    ///
    /// Returns a clone of the value; the shard never hands out interior
    /// references from `get`. Absent names return `None`.
    pub async fn get(&self, name: &str) -> Option<T> {
        let objects = self.objects.read().await;
        objects.get(name).cloned()
    }

    /// Zero-copy read-only view of the live backing map.
    ///
    /// Writers to *this* shard block while the guard is held; other shards
    /// are unaffected. Prefer [`Shard::snapshot`] when the caller needs to do
    /// anything slow or lock-free with the contents.
    pub async fn list_all(&self) -> RwLockReadGuard<'_, HashMap<String, T>> {
        self.objects.read().await
    }

    /// Freshly allocated copy of the object map, safe to iterate or mutate
    /// without holding any lock afterward
    pub async fn snapshot(&self) -> HashMap<String, T> {
        let objects = self.objects.read().await;
        objects.clone()
    }

    /// Number of records in this shard
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether this shard holds no records
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

/// Lock-guarded mapping from namespace to [`Shard`], with lazy shard creation.
///
/// A missing namespace is materialized to an empty shard on first access,
/// never reported as absent; exactly one shard instance ever exists per
/// namespace, including under concurrent first-accesses.
#[derive(Debug)]
pub struct ObjectStore<T> {
    shards: RwLock<HashMap<String, Arc<Shard<T>>>>,
}

impl<T> Default for ObjectStore<T> {
    fn default() -> Self {
        Self {
            shards: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Clone> ObjectStore<T> {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the shard for `namespace`, creating it if absent.
    ///
    /// Creation happens under the store's write lock, so concurrent
    /// first-accesses to the same namespace observe the same shard instance.
    pub async fn shard(&self, namespace: &str) -> Arc<Shard<T>> {
        let mut shards = self.shards.write().await;
        shards
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(Shard::new()))
            .clone()
    }

    /// Delete the shard for `namespace` and everything in it.
    ///
    /// Wipes off the entire namespace, not just one entry, so use with care.
    /// Returns whether the namespace existed.
    pub async fn delete_shard(&self, namespace: &str) -> bool {
        let mut shards = self.shards.write().await;
        shards.remove(namespace).is_some()
    }

    /// Snapshot of all known namespace keys, in no particular order
    pub async fn namespaces(&self) -> Vec<String> {
        let shards = self.shards.read().await;
        shards.keys().cloned().collect()
    }
}
