//! In-process publish/subscribe for client events.
//!
//! Payloads are `serde_json::Value` so producers (HTTP client, stream
//! manager, recovery) and UI consumers agree on shape without sharing types.
//! Every name may have any number of handlers; they run synchronously in
//! registration order on the emitting task.

use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use logger::{trace, warn};
use serde_json::Value;

pub mod events;

pub type HandlerResult = anyhow::Result<()>;

type Handler = Arc<dyn Fn(&Value) -> HandlerResult + Send + Sync>;

/// Handle returned by [`EventBus::on`], used to remove one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Registry {
    handlers: HashMap<String, Vec<(ListenerId, Handler)>>,
}

/// Cheap to clone; clones share the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<RwLock<Registry>>,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self
            .registry
            .read()
            .map(|r| r.handlers.len())
            .unwrap_or_default();
        f.debug_struct("EventBus").field("events", &names).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to `event`.
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        registry
            .handlers
            .entry(event.into())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Deliver `payload` to every handler of `event`.
    ///
    /// Returns the number of handlers invoked. A failing or panicking
    /// handler is logged and does not stop delivery to the rest.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        // snapshot so handlers may subscribe or unsubscribe while running
        let handlers: Vec<Handler> = {
            let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
            match registry.handlers.get(event) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => {
                    trace!(event, "no listeners");
                    return 0;
                }
            }
        };

        for handler in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(event, error = %e, "event handler failed"),
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    warn!(event, panic = %message, "event handler panicked");
                }
            }
        }

        handlers.len()
    }

    /// Remove a single handler. Returns whether it was registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = false;
        registry.handlers.retain(|_, list| {
            let before = list.len();
            list.retain(|(listener, _)| *listener != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    /// Remove every handler of `event`.
    pub fn remove_listener(&self, event: &str) {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        registry.handlers.remove(event);
    }

    pub fn remove_all_listeners(&self) {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        registry.handlers.clear();
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .handlers
            .get(event)
            .map_or(0, Vec::len)
    }
}
