use std::{collections::HashSet, sync::Arc};

use parking_lot::RwLock;

use super::RegisteredService;

/// Lookup of registered service definitions.
pub trait ServiceRegistry: Send + Sync {
    fn find_service_by_id(&self, id: i64) -> Option<Arc<RegisteredService>>;

    fn find_service_by_name(&self, name: &str) -> Option<Arc<RegisteredService>>;

    /// First definition, in evaluation order, whose matching strategy accepts
    /// `service_id`.
    fn find_service(&self, service_id: &str) -> Option<Arc<RegisteredService>>;

    /// Every definition, in evaluation order.
    fn all(&self) -> Vec<Arc<RegisteredService>>;
}

/// Registry holding an immutable, sorted snapshot of definitions.
///
/// Lookups clone the snapshot pointer and evaluate without holding the lock,
/// so a reload never waits on in-flight matching.
#[derive(Debug, Default)]
pub struct InMemoryServiceRegistry {
    services: RwLock<Arc<Vec<Arc<RegisteredService>>>>,
}

impl InMemoryServiceRegistry {
    pub fn new(services: impl IntoIterator<Item = RegisteredService>) -> Self {
        let registry = Self::default();
        registry.load(services);
        registry
    }

    /// Replace every definition at once.
    pub fn load(&self, services: impl IntoIterator<Item = RegisteredService>) -> usize {
        let mut services: Vec<Arc<RegisteredService>> = services.into_iter().map(Arc::new).collect();
        services.sort_by(|a, b| a.evaluation_cmp(b));

        let mut seen = HashSet::new();
        for service in &services {
            if !seen.insert(service.id) {
                tracing::warn!(id = service.id, name = %service.name, "Duplicate registered service id");
            }
        }

        let count = services.len();
        *self.services.write() = Arc::new(services);
        tracing::debug!(count, "Loaded registered services");
        count
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }

    fn snapshot(&self) -> Arc<Vec<Arc<RegisteredService>>> {
        self.services.read().clone()
    }
}

impl ServiceRegistry for InMemoryServiceRegistry {
    fn find_service_by_id(&self, id: i64) -> Option<Arc<RegisteredService>> {
        self.snapshot().iter().find(|s| s.id == id).cloned()
    }

    fn find_service_by_name(&self, name: &str) -> Option<Arc<RegisteredService>> {
        self.snapshot().iter().find(|s| s.name == name).cloned()
    }

    fn find_service(&self, service_id: &str) -> Option<Arc<RegisteredService>> {
        let found = self
            .snapshot()
            .iter()
            .find(|s| s.matches(service_id))
            .cloned();
        if found.is_none() {
            tracing::debug!(service = %service_id, "No registered service matches");
        }
        found
    }

    fn all(&self) -> Vec<Arc<RegisteredService>> {
        self.snapshot().as_ref().clone()
    }
}
