//! Subscriber Registry
//!
//! Maps event names to ordered lists of handlers.
//!
//! # Design
//!
//! - Handlers for an event run in registration order.
//! - Registration never deduplicates: registering the same closure twice
//!   yields two subscriptions and two invocations per event.
//! - A handler that panics is isolated; the remaining handlers for the same
//!   event still run and the failure is reported back to the caller.
//! - Dispatch snapshots the handler list before invoking, so handlers may
//!   freely call `subscribe`/`unsubscribe` on the same registry.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;

// =============================================================================
// Types
// =============================================================================

/// Callback invoked with the `data` of a dispatched event.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifies one registration returned by [`SubscriberRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw numeric value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

struct Subscriber {
    id: SubscriptionId,
    handler: EventHandler,
}

/// A handler that panicked during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Registration that failed.
    pub id: SubscriptionId,
    /// Panic payload rendered as text.
    pub message: String,
}

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Number of handlers invoked, including failed ones.
    pub invoked: usize,
    /// Handlers that panicked.
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    /// Check if any handler panicked.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Thread-safe event name → handler list registry.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use marketplace_realtime::domain::registry::SubscriberRegistry;
///
/// let registry = SubscriberRegistry::new();
/// let hits = Arc::new(AtomicUsize::new(0));
///
/// let counter = Arc::clone(&hits);
/// let id = registry.subscribe("new_message", Arc::new(move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// }));
///
/// registry.dispatch("new_message", &serde_json::json!({"text": "hi"}));
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
///
/// registry.unsubscribe("new_message", Some(id));
/// registry.dispatch("new_message", &serde_json::Value::Null);
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to the list for `event`.
    pub fn subscribe(&self, event: &str, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .entry(event.to_string())
            .or_default()
            .push(Subscriber { id, handler });
        id
    }

    /// Remove one registration, or every handler for `event` when `id` is `None`.
    ///
    /// Returns the number of handlers removed.
    pub fn unsubscribe(&self, event: &str, id: Option<SubscriptionId>) -> usize {
        let mut subscribers = self.subscribers.write();

        let Some(id) = id else {
            return subscribers.remove(event).map_or(0, |list| list.len());
        };

        let Some(list) = subscribers.get_mut(event) else {
            return 0;
        };

        let before = list.len();
        list.retain(|s| s.id != id);
        let removed = before - list.len();

        if list.is_empty() {
            subscribers.remove(event);
        }

        removed
    }

    /// Invoke every handler registered for `event`, in registration order.
    pub fn dispatch(&self, event: &str, data: &Value) -> DispatchReport {
        let snapshot: Vec<(SubscriptionId, EventHandler)> = {
            let subscribers = self.subscribers.read();
            match subscribers.get(event) {
                Some(list) => list
                    .iter()
                    .map(|s| (s.id, Arc::clone(&s.handler)))
                    .collect(),
                None => return DispatchReport::default(),
            }
        };

        let mut report = DispatchReport {
            invoked: snapshot.len(),
            failures: Vec::new(),
        };

        for (id, handler) in snapshot {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(data))) {
                report.failures.push(HandlerFailure {
                    id,
                    message: panic_message(payload.as_ref()),
                });
            }
        }

        report
    }

    /// Number of handlers registered for `event`.
    #[must_use]
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscribers.read().get(event).map_or(0, Vec::len)
    }

    /// Event names with at least one handler.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        let mut names: Vec<String> = self.subscribers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribers = self.subscribers.read();
        let counts: HashMap<&str, usize> = subscribers
            .iter()
            .map(|(event, list)| (event.as_str(), list.len()))
            .collect();
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &counts)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> EventHandler {
        let log = Arc::clone(log);
        Arc::new(move |data: &Value| log.lock().push(format!("{tag}:{data}")))
    }

    #[test]
    fn dispatch_in_registration_order() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.subscribe("x", recorder(&log, "a"));
        registry.subscribe("x", recorder(&log, "b"));
        registry.subscribe("x", recorder(&log, "c"));

        let report = registry.dispatch("x", &json!(1));
        assert_eq!(report.invoked, 3);
        assert_eq!(*log.lock(), vec!["a:1", "b:1", "c:1"]);
    }

    #[test]
    fn same_handler_twice_runs_twice() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = recorder(&log, "h");

        let first = registry.subscribe("x", Arc::clone(&handler));
        let second = registry.subscribe("x", handler);
        assert_ne!(first, second);

        registry.dispatch("x", &json!(null));
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn panicking_handler_does_not_stop_the_rest() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let bad = registry.subscribe("x", Arc::new(|_: &Value| panic!("boom")));
        registry.subscribe("x", recorder(&log, "good"));

        let report = registry.dispatch("x", &json!({"k": 2}));

        assert_eq!(report.invoked, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, bad);
        assert_eq!(report.failures[0].message, "boom");
        assert_eq!(*log.lock(), vec![r#"good:{"k":2}"#]);
    }

    #[test]
    fn unsubscribe_one() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let a = registry.subscribe("y", recorder(&log, "a"));
        registry.subscribe("y", recorder(&log, "b"));

        assert_eq!(registry.unsubscribe("y", Some(a)), 1);
        registry.dispatch("y", &json!(0));
        assert_eq!(*log.lock(), vec!["b:0"]);
    }

    #[test]
    fn unsubscribe_without_id_clears_event() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.subscribe("y", recorder(&log, "a"));
        registry.subscribe("y", recorder(&log, "b"));
        registry.subscribe("z", recorder(&log, "z"));

        assert_eq!(registry.unsubscribe("y", None), 2);
        registry.dispatch("y", &json!(0));
        registry.dispatch("z", &json!(0));

        assert_eq!(*log.lock(), vec!["z:0"]);
        assert_eq!(registry.subscriber_count("y"), 0);
        assert_eq!(registry.events(), vec!["z".to_string()]);
    }

    #[test]
    fn unsubscribe_unknown_is_noop() {
        let registry = SubscriberRegistry::new();
        assert_eq!(registry.unsubscribe("nothing", None), 0);

        let id = registry.subscribe("a", Arc::new(|_: &Value| {}));
        assert_eq!(registry.unsubscribe("b", Some(id)), 0);
        assert_eq!(registry.subscriber_count("a"), 1);
    }

    #[test]
    fn handler_may_unsubscribe_itself_during_dispatch() {
        let registry = Arc::new(SubscriberRegistry::new());
        let inner = Arc::clone(&registry);

        registry.subscribe(
            "once",
            Arc::new(move |_: &Value| {
                inner.unsubscribe("once", None);
            }),
        );

        assert_eq!(registry.dispatch("once", &json!(null)).invoked, 1);
        assert_eq!(registry.dispatch("once", &json!(null)).invoked, 0);
    }

    #[test]
    fn dispatch_without_subscribers() {
        let registry = SubscriberRegistry::new();
        let report = registry.dispatch("nobody", &json!(null));
        assert_eq!(report, DispatchReport::default());
        assert!(!report.has_failures());
    }
}
