//! Client identifiers and the live-connection registry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::socket::Socket;

/// Identifier of one accepted connection.
///
/// Ids come from a per-server counter, increase strictly with each accepted
/// connection and are never reused, even after the connection goes away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Map from [`ClientId`] to the shared socket serving it.
///
/// Every method takes the lock for the duration of a map operation only;
/// callers get cloned `Arc`s back and do their I/O after the lock is gone.
#[derive(Debug)]
pub(crate) struct Registry {
    connections: Mutex<BTreeMap<ClientId, Arc<Socket>>>,
    next_id: AtomicU64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            connections: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate the next id.
    pub(crate) fn next_id(&self) -> ClientId {
        ClientId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn insert(&self, id: ClientId, socket: Arc<Socket>) {
        self.connections.lock().insert(id, socket);
    }

    pub(crate) fn remove(&self, id: ClientId) -> Option<Arc<Socket>> {
        self.connections.lock().remove(&id)
    }

    pub(crate) fn get(&self, id: ClientId) -> Option<Arc<Socket>> {
        self.connections.lock().get(&id).cloned()
    }

    /// Every live socket at this instant.
    pub(crate) fn sockets(&self) -> Vec<Arc<Socket>> {
        self.connections.lock().values().cloned().collect()
    }

    /// Live ids in ascending order.
    pub(crate) fn ids(&self) -> Vec<ClientId> {
        self.connections.lock().keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Empty the registry, handing back what it held.
    pub(crate) fn drain(&self) -> Vec<Arc<Socket>> {
        std::mem::take(&mut *self.connections.lock())
            .into_values()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase() {
        let registry = Registry::new();
        let a = registry.next_id();
        let b = registry.next_id();
        let c = registry.next_id();
        assert!(a < b && b < c);
        assert_eq!(a.as_u64() + 1, b.as_u64());
        assert_eq!(c.to_string(), format!("client-{}", c.as_u64()));
    }

    #[test]
    fn test_insert_lookup_remove() {
        let registry = Registry::new();
        let first = registry.next_id();
        let second = registry.next_id();
        registry.insert(second, Arc::new(Socket::new()));
        registry.insert(first, Arc::new(Socket::new()));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec![first, second]);
        assert!(registry.get(first).is_some());

        assert!(registry.remove(first).is_some());
        assert!(registry.remove(first).is_none());
        assert!(registry.get(first).is_none());
        assert_eq!(registry.sockets().len(), 1);
    }

    #[test]
    fn test_drain_empties_registry() {
        let registry = Registry::new();
        for _ in 0..3 {
            let id = registry.next_id();
            registry.insert(id, Arc::new(Socket::new()));
        }

        assert_eq!(registry.drain().len(), 3);
        assert_eq!(registry.len(), 0);

        // Ids keep counting after a drain.
        assert_eq!(registry.next_id().as_u64(), 4);
    }
}
