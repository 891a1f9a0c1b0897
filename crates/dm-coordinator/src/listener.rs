//! Listener registrations of one coordinator

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use tracing::{trace, warn};

use crate::error::ListenerError;

/// Zero-argument re-render callback
pub type UpdateCallback = Arc<dyn Fn() -> Result<(), ListenerError> + Send + Sync>;

/// Identifies one registration; a new one is handed out on every add
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Registered callbacks in registration order
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<IndexMap<ListenerId, UpdateCallback>>,
}

impl Listeners {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(IndexMap::new()),
        }
    }

    pub(crate) fn add(&self, callback: UpdateCallback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, callback);
        id
    }

    /// Keeps the order of the remaining registrations
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(&id)
            .is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn ids(&self) -> Vec<ListenerId> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    fn get(&self, id: ListenerId) -> Option<UpdateCallback> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Run one notification pass and return how many listeners were invoked
    ///
    /// The pass covers the registrations present when it starts. Each one
    /// is looked up again right before its call, so a listener removed
    /// mid-pass is skipped. No lock is held while a callback runs.
    pub(crate) fn notify_all(&self, entity_id: &str) -> usize {
        let mut invoked = 0;
        for id in self.ids() {
            let Some(callback) = self.get(id) else {
                trace!(%id, "Listener removed during pass");
                continue;
            };

            invoked += 1;
            let outcome = catch_unwind(AssertUnwindSafe(|| callback()))
                .unwrap_or_else(|payload| Err(ListenerError::Panicked(panic_message(payload))));

            match outcome {
                Ok(()) => trace!(%id, entity_id, "Delivered update"),
                Err(error) => warn!(%id, entity_id, %error, "Listener failed, continuing"),
            }
        }
        invoked
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> UpdateCallback {
        let log = log.clone();
        Arc::new(move || -> Result<(), ListenerError> {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let listeners = Listeners::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = listeners.add(recorder(&log, "a"));
        let b = listeners.add(recorder(&log, "b"));
        assert!(a < b);
        assert_eq!(listeners.len(), 2);
        assert_eq!(a.to_string(), "listener#1");
    }

    #[test]
    fn test_remove_keeps_order_of_the_rest() {
        let listeners = Listeners::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        listeners.add(recorder(&log, "a"));
        let b = listeners.add(recorder(&log, "b"));
        listeners.add(recorder(&log, "c"));

        assert!(listeners.remove(b));
        assert!(!listeners.remove(b));
        assert_eq!(listeners.notify_all("switch.pump"), 2);
        assert_eq!(*log.lock().unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn test_panic_payloads_are_reported() {
        let listeners = Listeners::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        listeners.add(Arc::new(|| -> Result<(), ListenerError> { panic!("boom") }));
        listeners.add(Arc::new(|| -> Result<(), ListenerError> {
            panic!("{}", String::from("formatted"))
        }));
        listeners.add(recorder(&log, "after"));

        assert_eq!(listeners.notify_all("switch.pump"), 3);
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7_u8)), "unknown panic");
    }
}
