//! # Loop Registry
//!
//! Ensures at most one reconciliation loop per purchase.
//!
//! The registry is the seam for running several back-office instances: the
//! in-memory implementation covers one process, a shared store can implement
//! [`LoopRegistry`] for many.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Set of purchases with a live reconciliation loop.
pub trait LoopRegistry: Send + Sync {
    /// Marks `purchase_id` active. Returns false if it already was.
    fn try_register(&self, purchase_id: Uuid) -> bool;

    fn unregister(&self, purchase_id: Uuid);

    fn is_registered(&self, purchase_id: Uuid) -> bool;

    fn active_count(&self) -> usize;
}

/// Process-local [`LoopRegistry`].
#[derive(Debug, Default)]
pub struct InMemoryLoopRegistry {
    active: Mutex<HashSet<Uuid>>,
}

impl InMemoryLoopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LoopRegistry for InMemoryLoopRegistry {
    fn try_register(&self, purchase_id: Uuid) -> bool {
        self.active().insert(purchase_id)
    }

    fn unregister(&self, purchase_id: Uuid) {
        self.active().remove(&purchase_id);
    }

    fn is_registered(&self, purchase_id: Uuid) -> bool {
        self.active().contains(&purchase_id)
    }

    fn active_count(&self) -> usize {
        self.active().len()
    }
}

/// Registration held by a running loop. Unregisters on drop, including on panic.
pub struct LoopLease {
    registry: Arc<dyn LoopRegistry>,
    purchase_id: Uuid,
}

impl LoopLease {
    /// Registers `purchase_id`, or returns `None` if a loop already holds it.
    pub fn acquire(registry: &Arc<dyn LoopRegistry>, purchase_id: Uuid) -> Option<Self> {
        registry.try_register(purchase_id).then(|| LoopLease {
            registry: Arc::clone(registry),
            purchase_id,
        })
    }

    pub fn purchase_id(&self) -> Uuid {
        self.purchase_id
    }
}

impl Drop for LoopLease {
    fn drop(&mut self) {
        self.registry.unregister(self.purchase_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_registration_is_refused() {
        let registry: Arc<dyn LoopRegistry> = Arc::new(InMemoryLoopRegistry::new());
        let id = Uuid::new_v4();

        let lease = LoopLease::acquire(&registry, id).unwrap();
        assert!(LoopLease::acquire(&registry, id).is_none());
        assert!(registry.is_registered(id));
        assert_eq!(registry.active_count(), 1);

        drop(lease);
        assert!(!registry.is_registered(id));
        assert!(LoopLease::acquire(&registry, id).is_some());
    }

    #[test]
    fn test_independent_purchases() {
        let registry: Arc<dyn LoopRegistry> = Arc::new(InMemoryLoopRegistry::new());
        let a = LoopLease::acquire(&registry, Uuid::new_v4());
        let b = LoopLease::acquire(&registry, Uuid::new_v4());
        assert!(a.is_some() && b.is_some());
        assert_eq!(registry.active_count(), 2);
    }
}
