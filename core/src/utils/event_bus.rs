/// Type-keyed dispatch of inbound envelopes to subscribers
use crate::net::protocol::{Inbound, InboundKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Callback invoked for every matching envelope
pub type Handler = Arc<dyn Fn(&Inbound) + Send + Sync>;

struct Listener {
    id: u64,
    active: Arc<AtomicBool>,
    handler: Handler,
}

impl Clone for Listener {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            active: self.active.clone(),
            handler: self.handler.clone(),
        }
    }
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<InboundKind, Vec<Listener>>>,
}

impl BusInner {
    fn remove(&self, id: u64, kinds: &[InboundKind]) {
        let mut table = self.listeners.lock();
        for kind in kinds {
            if let Some(list) = table.get_mut(kind) {
                list.retain(|l| l.id != id);
                if list.is_empty() {
                    table.remove(kind);
                }
            }
        }
    }
}

/// Event bus owned by one connection
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for the given kinds. The listener stays attached
    /// until the returned guard is dropped.
    pub fn subscribe(&self, kinds: &[InboundKind], handler: Handler) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        let mut unique: Vec<InboundKind> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !unique.contains(kind) {
                unique.push(*kind);
            }
        }
        let kinds = unique;

        {
            let mut table = self.inner.listeners.lock();
            for kind in &kinds {
                table.entry(*kind).or_default().push(Listener {
                    id,
                    active: active.clone(),
                    handler: handler.clone(),
                });
            }
        }

        Subscription {
            id,
            kinds,
            active,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver one envelope to every listener of its kind, in registration order.
    /// Returns the number of listeners invoked.
    pub fn dispatch(&self, inbound: &Inbound) -> usize {
        let Some(kind) = inbound.kind() else {
            return 0;
        };

        // Snapshot so handlers may subscribe or unsubscribe while we iterate
        let snapshot: Vec<Listener> = match self.inner.listeners.lock().get(&kind) {
            Some(list) => list.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for listener in snapshot {
            // Detached after the snapshot was taken
            if !listener.active.load(Ordering::Acquire) {
                continue;
            }
            (listener.handler)(inbound);
            delivered += 1;
        }

        if delivered == 0 {
            debug!("No listener for {}", kind.wire_name());
        }
        delivered
    }

    /// Number of live registrations for a kind
    pub fn listener_count(&self, kind: InboundKind) -> usize {
        self.inner
            .listeners
            .lock()
            .get(&kind)
            .map(|l| l.len())
            .unwrap_or(0)
    }
}

/// Scoped registration on an [`EventBus`]; dropping it detaches the listener
pub struct Subscription {
    id: u64,
    kinds: Vec<InboundKind>,
    active: Arc<AtomicBool>,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Detach now; same as dropping the guard
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Still registered on a live bus
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && self.bus.strong_count() > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id, &self.kinds);
        }
    }
}
