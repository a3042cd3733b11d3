//! Process-wide map of registered services.
//!
//! [`ServiceRegistry`] is written during discovery and read by every
//! request. A [`tokio::sync::RwLock`] guards the map; entries are
//! `Arc<ServiceDescriptor>` so readers never hold the lock while they use
//! a descriptor.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::ServiceDescriptor;

#[derive(Debug)]
struct Entry {
    order: u64,
    descriptor: Arc<ServiceDescriptor>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_order: u64,
}

/// Registered services keyed by name.
///
/// # Concurrency
///
/// - Registration takes the write lock once; an entry is published whole.
/// - [`ServiceRegistry::list`] returns an owned snapshot, safe to iterate
///   while registrations continue.
/// - Registration order is remembered and drives route assignment.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    inner: RwLock<Inner>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a descriptor by name.
    ///
    /// Returns `true` if an entry with the same name already existed. The
    /// replacement takes the latest registration position.
    pub async fn register(&self, descriptor: Arc<ServiceDescriptor>) -> bool {
        let mut inner = self.inner.write().await;
        let order = inner.next_order;
        inner.next_order = inner.next_order.saturating_add(1);
        inner
            .entries
            .insert(descriptor.name().to_string(), Entry { order, descriptor })
            .is_some()
    }

    /// Returns the descriptor registered under `name`.
    pub async fn get(&self, name: &str) -> Option<Arc<ServiceDescriptor>> {
        self.inner
            .read()
            .await
            .entries
            .get(name)
            .map(|entry| Arc::clone(&entry.descriptor))
    }

    /// Snapshot of all descriptors in registration order.
    pub async fn list(&self) -> Vec<Arc<ServiceDescriptor>> {
        let inner = self.inner.read().await;
        let mut entries: Vec<&Entry> = inner.entries.values().collect();
        entries.sort_by_key(|entry| entry.order);
        entries
            .into_iter()
            .map(|entry| Arc::clone(&entry.descriptor))
            .collect()
    }

    /// Registered service names, sorted alphabetically.
    pub async fn names(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut names: Vec<String> = inner.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered services.
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    /// Returns `true` if no service is registered.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }
}
