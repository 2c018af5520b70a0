//! Synchronous, single-threaded publish/subscribe (spec.md §4.3).
//!
//! Emission order equals subscription order. Emitters invoke callbacks
//! synchronously after the triggering transaction's `done` resolves — never
//! from inside a transaction (enforced by callers: nothing in `engine::`
//! emits while a storage transaction is open).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The event types the engine emits (spec.md §4.3, minimum set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    NodeCreated,
    NodeUpdated,
    NodeDeleted,
    NodeMoved,
    NodeCopied,
    NodesBatchUpdated,
    NodesBatchMoved,
    ModuleMounted,
    ModuleUnmounted,
    ModuleUpdated,
    VfsReady,
}

/// Every variant of [`EventType`], in no particular order — used by
/// `facade::Facade::bootstrap` to subscribe a catch-all metrics listener
/// without hand-maintaining a second copy of this list.
pub const ALL_EVENT_TYPES: &[EventType] = &[
    EventType::NodeCreated,
    EventType::NodeUpdated,
    EventType::NodeDeleted,
    EventType::NodeMoved,
    EventType::NodeCopied,
    EventType::NodesBatchUpdated,
    EventType::NodesBatchMoved,
    EventType::ModuleMounted,
    EventType::ModuleUnmounted,
    EventType::ModuleUpdated,
    EventType::VfsReady,
];

/// `{ type, nodeId?, path?, moduleId?, timestamp, data? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub node_id: Option<String>,
    pub path: Option<String>,
    pub module_id: Option<String>,
    pub timestamp: u64,
    pub data: Option<Value>,
}

impl Event {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            node_id: None,
            path: None,
            module_id: None,
            timestamp: crate::model::now_millis(),
            data: None,
        }
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_module_id(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

type Callback = Box<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: u64,
    callback: Callback,
    once: bool,
}

/// A subscription handle; dropping it does *not* unsubscribe — call
/// `EventBus::off` explicitly, or use the closure returned by `on`/`once`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscribers {
    by_type: HashMap<EventType, Vec<Subscription>>,
}

/// Synchronous event bus. Cheap to clone (shares internal state via `Arc`),
/// so the facade can hand clones to external collaborators (sync adapters,
/// the session-engine adapter) without a shared-reference lifetime.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<RwLock<Subscribers>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Subscribers::default())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Subscribes `callback` to `event_type`. Returns an id usable with
    /// [`EventBus::off`].
    pub fn on(
        &self,
        event_type: EventType,
        callback: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.alloc_id();
        self.inner
            .write()
            .by_type
            .entry(event_type)
            .or_default()
            .push(Subscription {
                id,
                callback: Box::new(callback),
                once: false,
            });
        SubscriptionId(id)
    }

    /// Like `on`, but the subscriber is removed after its first invocation.
    pub fn once(
        &self,
        event_type: EventType,
        callback: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.alloc_id();
        self.inner
            .write()
            .by_type
            .entry(event_type)
            .or_default()
            .push(Subscription {
                id,
                callback: Box::new(callback),
                once: true,
            });
        SubscriptionId(id)
    }

    /// Removes a single subscription by id.
    pub fn off(&self, id: SubscriptionId) {
        let mut subs = self.inner.write();
        for list in subs.by_type.values_mut() {
            list.retain(|s| s.id != id.0);
        }
    }

    /// Removes every subscriber of `event_type`, or all subscribers of all
    /// types when `event_type` is `None`.
    pub fn clear(&self, event_type: Option<EventType>) {
        let mut subs = self.inner.write();
        match event_type {
            Some(t) => {
                subs.by_type.remove(&t);
            }
            None => subs.by_type.clear(),
        }
    }

    /// Invokes every subscriber of `event.event_type` in subscription
    /// order. A subscriber that panics is caught so it cannot take down
    /// unrelated listeners or the committed state (spec.md §7: "bus
    /// isolates per-subscriber exceptions and logs them").
    pub fn emit(&self, event: Event) {
        let to_call: Vec<(u64, bool)> = {
            let subs = self.inner.read();
            match subs.by_type.get(&event.event_type) {
                Some(list) => list.iter().map(|s| (s.id, s.once)).collect(),
                None => return,
            }
        };
        if to_call.is_empty() {
            return;
        }

        for (id, _once) in &to_call {
            // Re-acquire the read guard per call, freshly, rather than
            // holding one guard across every callback: a callback may
            // itself call on()/off(), which would deadlock on a held
            // guard (parking_lot's RwLock is not reentrant).
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let subs = self.inner.read();
                if let Some(sub) = subs
                    .by_type
                    .get(&event.event_type)
                    .and_then(|list| list.iter().find(|s| s.id == *id))
                {
                    (sub.callback)(&event);
                }
            }));
            if result.is_err() {
                tracing::error!(
                    subscriber_id = id,
                    event_type = ?event.event_type,
                    "event subscriber panicked; isolating"
                );
            }
        }

        let once_ids: Vec<u64> = to_call
            .into_iter()
            .filter(|(_, once)| *once)
            .map(|(id, _)| id)
            .collect();
        if !once_ids.is_empty() {
            let mut subs = self.inner.write();
            if let Some(list) = subs.by_type.get_mut(&event.event_type) {
                list.retain(|s| !once_ids.contains(&s.id));
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn emits_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        bus.on(EventType::NodeCreated, move |_| o1.lock().unwrap().push(1));
        let o2 = order.clone();
        bus.on(EventType::NodeCreated, move |_| o2.lock().unwrap().push(2));
        bus.emit(Event::new(EventType::NodeCreated));
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn once_fires_exactly_once() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        bus.once(EventType::NodeDeleted, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(Event::new(EventType::NodeDeleted));
        bus.emit(Event::new(EventType::NodeDeleted));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_removes_subscriber() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        let id = bus.on(EventType::NodeUpdated, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.off(id);
        bus.emit(Event::new(EventType::NodeUpdated));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        bus.on(EventType::VfsReady, |_| panic!("boom"));
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        bus.on(EventType::VfsReady, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(Event::new(EventType::VfsReady));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
