use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::delivery::PushMessage;

/// Live push connections keyed by connection id.
///
/// Cloning is cheap and every clone shares the same map, so the registry can
/// be handed to each connection task and to status endpoints alike.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, mpsc::Sender<PushMessage>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh identifier of the form `conn_<uuid>`.
    pub fn new_connection_id() -> String {
        format!("conn_{}", Uuid::new_v4().simple())
    }

    /// Registers `sender` under `id`, replacing any previous entry.
    pub fn add(&self, id: impl Into<String>, sender: mpsc::Sender<PushMessage>) {
        let id = id.into();
        debug!(connection_id = %id, "Registering connection");
        self.connections.insert(id, sender);
    }

    /// Removes `id`. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.connections.remove(id).is_some();
        if removed {
            debug!(connection_id = %id, "Connection removed");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_prefixed_and_unique() {
        let a = ConnectionRegistry::new_connection_id();
        let b = ConnectionRegistry::new_connection_id();
        assert!(a.starts_with("conn_"));
        assert_eq!(a.len(), "conn_".len() + 32);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn add_remove_and_count() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel::<PushMessage>(4);

        registry.add("conn_a", tx);
        assert_eq!(registry.count(), 1);

        assert!(registry.remove("conn_a"));
        // The registry held the only sender.
        assert!(rx.recv().await.is_none());
        assert!(!registry.remove("conn_a"));
        assert!(!registry.remove("never_registered"));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn re_adding_an_id_replaces_the_entry() {
        let registry = ConnectionRegistry::new();
        let (first, mut first_rx) = mpsc::channel::<PushMessage>(1);
        let (second, _second_rx) = mpsc::channel::<PushMessage>(1);

        registry.add("conn_a", first);
        registry.add("conn_a", second);

        assert_eq!(registry.count(), 1);
        assert!(first_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn concurrent_registration_is_counted_exactly() {
        let registry = ConnectionRegistry::new();
        let mut handles = Vec::new();

        for i in 0..64 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let (tx, _rx) = mpsc::channel(1);
                let id = format!("conn_{i}");
                registry.add(id.clone(), tx);
                if i % 2 == 0 {
                    registry.remove(&id);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.count(), 32);
    }
}
