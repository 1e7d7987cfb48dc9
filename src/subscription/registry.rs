//! Kind-keyed listener registry with isolated fan-out

use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::{debug, error, trace};

/// Listener body: receives the payload of every message of its kind
pub type ListenerFn = dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync;

/// A shareable listener; its identity is the address of its allocation
pub type Listener = Arc<ListenerFn>;

/// kind -> (listener identity -> listener)
type ListenerMap = HashMap<String, HashMap<usize, Listener>>;

fn listener_key(listener: &Listener) -> usize {
    Arc::as_ptr(listener).cast::<()>() as usize
}

fn read_map(map: &RwLock<ListenerMap>) -> RwLockReadGuard<'_, ListenerMap> {
    map.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_map(map: &RwLock<ListenerMap>) -> RwLockWriteGuard<'_, ListenerMap> {
    map.write().unwrap_or_else(PoisonError::into_inner)
}

fn remove_listener(map: &RwLock<ListenerMap>, kind: &str, key: usize) -> bool {
    let mut listeners = write_map(map);
    let Some(set) = listeners.get_mut(kind) else {
        return false;
    };

    let removed = set.remove(&key).is_some();
    let remaining = set.len();
    if remaining == 0 {
        listeners.remove(kind);
    }

    if removed {
        debug!("Unsubscribed from {}, remaining listeners: {}", kind, remaining);
    }
    removed
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Maps message kind to the set of listeners interested in it.
///
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    listeners: Arc<RwLock<ListenerMap>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure under `kind`
    pub fn subscribe<F>(&self, kind: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        self.subscribe_listener(kind, &listener)
    }

    /// Register a shared listener under `kind`.
    ///
    /// The same listener registered twice under one kind is stored once.
    pub fn subscribe_listener(&self, kind: impl Into<String>, listener: &Listener) -> Subscription {
        let kind = kind.into();
        let key = listener_key(listener);

        let mut listeners = write_map(&self.listeners);
        let set = listeners.entry(kind.clone()).or_default();
        set.entry(key).or_insert_with(|| listener.clone());
        debug!("Subscribed to {}, total listeners: {}", kind, set.len());
        drop(listeners);

        Subscription {
            kind,
            key,
            _pin: Arc::downgrade(listener),
            registry: Arc::downgrade(&self.listeners),
            active: AtomicBool::new(true),
        }
    }

    /// Remove `listener` from `kind`. No-op when either is absent.
    pub fn unsubscribe(&self, kind: &str, listener: &Listener) -> bool {
        remove_listener(&self.listeners, kind, listener_key(listener))
    }

    /// Invoke every listener registered for `kind` with `payload`.
    ///
    /// A listener that fails or panics is logged and skipped; the rest still
    /// run and nothing propagates to the caller. Returns the number of
    /// listeners invoked.
    pub fn dispatch(&self, kind: &str, payload: &Value) -> usize {
        // Snapshot so listeners may (un)subscribe while being invoked
        let snapshot: Vec<Listener> = match read_map(&self.listeners).get(kind) {
            Some(set) => set.values().cloned().collect(),
            None => {
                trace!("No listeners for {}", kind);
                return 0;
            }
        };

        for listener in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Error in listener for {}: {:#}", kind, e),
                Err(panic) => {
                    error!("Listener for {} panicked: {}", kind, panic_message(panic.as_ref()))
                }
            }
        }

        snapshot.len()
    }

    /// Number of listeners registered for `kind`
    pub fn listener_count(&self, kind: &str) -> usize {
        read_map(&self.listeners).get(kind).map_or(0, HashMap::len)
    }

    /// Listener count per kind; kinds without listeners are absent
    pub fn listener_counts(&self) -> BTreeMap<String, usize> {
        read_map(&self.listeners)
            .iter()
            .map(|(kind, set)| (kind.clone(), set.len()))
            .collect()
    }

    /// Listener count summed across kinds
    pub fn total_listeners(&self) -> usize {
        read_map(&self.listeners).values().map(HashMap::len).sum()
    }

    /// Whether any listener is registered
    pub fn is_empty(&self) -> bool {
        read_map(&self.listeners).is_empty()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("listeners", &self.listener_counts())
            .finish()
    }
}

/// Capability to remove one registration.
///
/// Dropping it leaves the listener registered.
pub struct Subscription {
    kind: String,
    key: usize,
    /// Keeps the listener allocation, and so its identity, from being reused
    _pin: Weak<ListenerFn>,
    registry: Weak<RwLock<ListenerMap>>,
    active: AtomicBool,
}

impl Subscription {
    /// Kind this subscription was registered under
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Whether `unsubscribe` has not been called yet
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Remove the listener. Calling it again does nothing.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(listeners) = self.registry.upgrade() {
            remove_listener(&listeners, &self.kind, self.key);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .finish()
    }
}
