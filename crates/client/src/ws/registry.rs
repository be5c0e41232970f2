//! Per-event listener bookkeeping with ordered, panic-isolated fan-out.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

/// Callback invoked with the raw payload of an event.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifies one registration made through [`EventRegistry::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    active: Arc<AtomicBool>,
    callback: Listener,
}

/// Event name → ordered callbacks.
#[derive(Default)]
pub struct EventRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<Registration>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<String, Vec<Registration>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a callback for `event`, after any already registered.
    pub fn on(&self, event: &str, callback: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners()
            .entry(event.to_string())
            .or_default()
            .push(Registration {
                id,
                active: Arc::new(AtomicBool::new(true)),
                callback,
            });
        id
    }

    /// Remove one registration, or every registration for `event` when `id`
    /// is `None`. Returns whether anything was removed.
    pub fn off(&self, event: &str, id: Option<ListenerId>) -> bool {
        let mut listeners = self.listeners();
        let Some(list) = listeners.get_mut(event) else {
            return false;
        };

        let removed = match id {
            Some(id) => match list.iter().position(|r| r.id == id) {
                Some(pos) => {
                    let registration = list.remove(pos);
                    registration.active.store(false, Ordering::SeqCst);
                    true
                }
                None => false,
            },
            None => {
                for registration in list.drain(..) {
                    registration.active.store(false, Ordering::SeqCst);
                }
                true
            }
        };

        if list.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Drop every registration for every event.
    pub fn clear(&self) {
        let mut listeners = self.listeners();
        for registration in listeners.values().flatten() {
            registration.active.store(false, Ordering::SeqCst);
        }
        listeners.clear();
    }

    /// Whether `id` is still registered for `event`.
    pub fn contains(&self, event: &str, id: ListenerId) -> bool {
        self.listeners()
            .get(event)
            .is_some_and(|list| list.iter().any(|r| r.id == id))
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners().get(event).map_or(0, Vec::len)
    }

    /// Invoke every callback for `event` in registration order.
    ///
    /// Callbacks run with no lock held, so they may register or unregister
    /// listeners themselves. A panicking callback is logged and skipped.
    /// Returns how many callbacks completed.
    pub fn emit(&self, event: &str, data: &Value) -> usize {
        let snapshot: Vec<(Arc<AtomicBool>, Listener)> = match self.listeners().get(event) {
            Some(list) => list
                .iter()
                .map(|r| (r.active.clone(), r.callback.clone()))
                .collect(),
            None => return 0,
        };

        let mut completed = 0;
        for (active, callback) in snapshot {
            if !active.load(Ordering::SeqCst) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| callback(data))) {
                Ok(()) => completed += 1,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    crate::log_error!("listener for '{}' panicked: {}", event, message);
                }
            }
        }
        completed
    }
}
