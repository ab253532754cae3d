//! Named, shared clients.
//!
//! A process usually wants one client (and so one breaker) per downstream service. The registry
//! maps names to `Arc`s so every caller resolving the same name drives the same state.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// Errors from [`Registry`] lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no client registered under '{name}'")]
    NotFound { name: String },
}

/// Thread-safe map from name to shared client. Clones share the same map.
#[derive(Debug)]
pub struct Registry<C> {
    inner: Arc<RwLock<HashMap<String, Arc<C>>>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())) }
    }
}

impl<C> Clone for Registry<C> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client` under `name`. The first registration wins; returns `false` for a duplicate.
    pub fn register(&self, name: impl Into<String>, client: C) -> bool {
        self.register_shared(name, Arc::new(client))
    }

    /// Like [`register`](Self::register) for a client the caller keeps a handle to.
    pub fn register_shared(&self, name: impl Into<String>, client: Arc<C>) -> bool {
        let name = name.into();
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&name) {
            warn!(target: "lifeline::registry", name = %name, "client name already registered; keeping existing");
            return false;
        }
        map.insert(name, client);
        true
    }

    pub fn get(&self, name: &str) -> Result<Arc<C>, RegistryError> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(name).cloned().ok_or_else(|| RegistryError::NotFound { name: name.to_string() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<C>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner).remove(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
