//! Subscriber Registry
//!
//! Tracks the set of live subscriber connections between the WebSocket
//! boundary and the broadcast loop.
//!
//! # Design
//!
//! The registry is the only shared mutable state in the service. It is
//! never iterated directly: broadcast walks an immutable `snapshot()`
//! taken at the start of delivery, so register/unregister calls issued
//! while a delivery is in flight cannot corrupt iteration. Removal of an
//! absent id is a no-op, which lets the disconnect path and the
//! failed-send path race without coordination.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a subscriber connection.
pub type SubscriberId = u64;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-wide unique subscriber id.
#[must_use]
pub fn next_subscriber_id() -> SubscriberId {
    NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Delivery failure for a single subscriber.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The subscriber's delivery channel is closed or broken.
    #[error("subscriber channel closed")]
    Closed,
}

/// Opaque per-subscriber delivery channel.
///
/// Implementations own no socket directly; the registry's `Arc` must not
/// be the only thing keeping a connection alive. `close` is idempotent.
#[async_trait]
pub trait SubscriberSink: Send + Sync {
    /// Deliver one serialized update to the subscriber.
    async fn send(&self, payload: &str) -> Result<(), SinkError>;

    /// Tear down the delivery channel.
    async fn close(&self);
}

// =============================================================================
// Registry
// =============================================================================

/// Thread-safe collection of active subscribers.
///
/// All three operations are safe to call concurrently from the broadcast
/// loop and any number of per-connection handlers.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<SubscriberId, Arc<dyn SubscriberSink>>>,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber.
    ///
    /// Registering an id twice replaces the previous sink; it never
    /// produces a duplicate entry.
    pub fn register(&self, id: SubscriberId, sink: Arc<dyn SubscriberSink>) {
        self.subscribers.write().insert(id, sink);
    }

    /// Remove a subscriber if present, returning its sink.
    ///
    /// Removing an absent id is a no-op returning `None`.
    pub fn unregister(&self, id: SubscriberId) -> Option<Arc<dyn SubscriberSink>> {
        self.subscribers.write().remove(&id)
    }

    /// Point-in-time copy of the current subscribers.
    ///
    /// Safe to iterate while concurrent register/unregister calls
    /// proceed; the copy neither skips nor duplicates entries relative
    /// to the state at snapshot time. Order is unspecified.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(SubscriberId, Arc<dyn SubscriberSink>)> {
        self.subscribers
            .read()
            .iter()
            .map(|(id, sink)| (*id, Arc::clone(sink)))
            .collect()
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Whether no subscribers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Whether the given id is currently registered.
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.read().contains_key(&id)
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    struct NoopSink;

    #[async_trait]
    impl SubscriberSink for NoopSink {
        async fn send(&self, _payload: &str) -> Result<(), SinkError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    fn noop() -> Arc<dyn SubscriberSink> {
        Arc::new(NoopSink)
    }

    #[test]
    fn register_twice_does_not_duplicate() {
        let registry = SubscriberRegistry::new();
        registry.register(7, noop());
        registry.register(7, noop());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn unregister_absent_is_noop() {
        let registry = SubscriberRegistry::new();
        assert!(registry.unregister(42).is_none());

        registry.register(1, noop());
        registry.unregister(1);
        // Second removal races are fine
        assert!(registry.unregister(1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn size_tracks_registers_minus_unregisters() {
        let registry = SubscriberRegistry::new();
        for id in 0..10 {
            registry.register(id, noop());
        }
        for id in 0..4 {
            registry.unregister(id);
        }
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn snapshot_is_stable_under_later_mutation() {
        let registry = SubscriberRegistry::new();
        registry.register(1, noop());
        registry.register(2, noop());

        let snapshot = registry.snapshot();
        registry.unregister(1);

        // The snapshot reflects state at the time it was taken
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn concurrent_registration_from_many_threads() {
        let registry = Arc::new(SubscriberRegistry::new());

        std::thread::scope(|scope| {
            for thread in 0u64..8 {
                let registry = Arc::clone(&registry);
                scope.spawn(move || {
                    for i in 0..50 {
                        let id = thread * 100 + i;
                        registry.register(id, Arc::new(NoopSink));
                        let _ = registry.snapshot();
                        if i % 2 == 0 {
                            registry.unregister(id);
                        }
                    }
                });
            }
        });

        assert_eq!(registry.len(), 8 * 25);
    }

    #[test]
    fn subscriber_ids_are_unique() {
        let a = next_subscriber_id();
        let b = next_subscriber_id();
        assert_ne!(a, b);
    }

    proptest! {
        // Any interleaving of register/unregister keeps the registry
        // consistent with a set model: correct size, no duplicates, no
        // entries that were not registered.
        #[test]
        fn snapshot_matches_set_model(
            ops in proptest::collection::vec((any::<bool>(), 0u64..16), 0..200)
        ) {
            let registry = SubscriberRegistry::new();
            let mut model: HashSet<SubscriberId> = HashSet::new();

            for (register, id) in ops {
                if register {
                    registry.register(id, Arc::new(NoopSink));
                    model.insert(id);
                } else {
                    registry.unregister(id);
                    model.remove(&id);
                }
                prop_assert_eq!(registry.len(), model.len());
            }

            let mut ids: Vec<_> = registry.snapshot().into_iter().map(|(id, _)| id).collect();
            ids.sort_unstable();
            let unique: HashSet<_> = ids.iter().copied().collect();
            prop_assert_eq!(unique.len(), ids.len());

            let mut expected: Vec<_> = model.into_iter().collect();
            expected.sort_unstable();
            prop_assert_eq!(ids, expected);
        }
    }
}
