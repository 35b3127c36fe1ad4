use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde_json::Value;

use crate::events::EventName;

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventName, Vec<(u64, Handler)>>,
}

/// Client-side event handlers, keyed by event tag.
#[derive(Clone, Default)]
pub struct EventListeners {
    registry: Arc<Mutex<Registry>>,
}

impl fmt::Debug for EventListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("listeners", &self.total())
            .finish()
    }
}

impl EventListeners {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event`. The handler stays registered while the
    /// returned [`Subscription`] is alive.
    #[must_use = "dropping the subscription unregisters the handler"]
    pub fn on<F>(&self, event: EventName, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .handlers
            .entry(event)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            event,
            id: Some(id),
        }
    }

    /// Calls every handler registered for `event`, in registration order.
    /// Returns the number of handlers called.
    pub fn emit(&self, event: EventName, payload: &Value) -> usize {
        let handlers: Vec<Handler> = self
            .registry()
            .handlers
            .get(&event)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }

    /// Removes every handler.
    pub fn clean(&self) {
        self.registry().handlers.clear();
    }

    /// Number of handlers registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: EventName) -> usize {
        self.registry().handlers.get(&event).map_or(0, Vec::len)
    }

    fn total(&self) -> usize {
        self.registry().handlers.values().map(Vec::len).sum()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a registered handler; unregisters it on drop.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    event: EventName,
    id: Option<u64>,
}

impl Subscription {
    /// Event this subscription listens to.
    #[must_use]
    pub const fn event(&self) -> EventName {
        self.event
    }

    /// Unregisters the handler now.
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let (Some(id), Some(registry)) = (self.id.take(), self.registry.upgrade()) else {
            return;
        };
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handlers) = registry.handlers.get_mut(&self.event) {
            handlers.retain(|(handler_id, _)| *handler_id != id);
            if handlers.is_empty() {
                registry.handlers.remove(&self.event);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}
