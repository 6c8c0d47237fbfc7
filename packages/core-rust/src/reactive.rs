//! Minimal observer-pattern reactive cells.
//!
//! A [`Signal`] holds a value, a monotonically increasing version and a list
//! of subscribers. Every mutation bumps the version and notifies subscribers
//! once with a consistent snapshot, so a multi-field update is never
//! observed half-applied. [`Derived`] memoizes a projection of a signal and
//! recomputes only when the source version changed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slot<T> {
    value: T,
    version: u64,
}

struct SignalInner<T> {
    slot: RwLock<Slot<T>>,
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_listener: AtomicU64,
}

/// A shared, observable value. Clones point at the same cell.
pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Signal<T> {
    /// Creates a signal at version 0.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                slot: RwLock::new(Slot { value, version: 0 }),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// Returns a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.slot.read().value.clone()
    }

    /// Reads the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.slot.read().value)
    }

    /// Number of mutations applied so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.slot.read().version
    }

    /// Replaces the value.
    pub fn set(&self, value: T) {
        self.update(|current| *current = value);
    }

    /// Mutates the value in place and notifies subscribers once.
    ///
    /// Subscribers run after the write lock is released, so they may read or
    /// mutate the signal again.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let listeners: Vec<Listener<T>> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        let (result, snapshot) = {
            let mut slot = self.inner.slot.write();
            let result = f(&mut slot.value);
            slot.version += 1;
            let snapshot = (!listeners.is_empty()).then(|| slot.value.clone());
            (result, snapshot)
        };
        if let Some(snapshot) = snapshot {
            for listener in &listeners {
                listener(&snapshot);
            }
        }
        result
    }

    /// Registers an effect that runs after every mutation.
    ///
    /// The effect stays registered until the returned [`Subscription`] is
    /// dropped.
    pub fn subscribe(&self, f: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(f)));
        let weak = Arc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.listeners.lock().retain(|(existing, _)| *existing != id);
                }
            })),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Creates a memoized projection of this signal.
    pub fn derive<U>(&self, f: impl Fn(&T) -> U + Send + Sync + 'static) -> Derived<T, U>
    where
        U: Clone + Send + Sync + 'static,
    {
        Derived {
            source: self.clone(),
            compute: Arc::new(f),
            cache: Arc::new(Mutex::new(None)),
        }
    }
}

/// Handle keeping a subscriber registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Keeps the subscriber registered for the lifetime of the signal.
    pub fn detach(mut self) {
        self.unsubscribe = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// A cached projection of a [`Signal`], recomputed lazily on version change.
pub struct Derived<T, U> {
    source: Signal<T>,
    compute: Arc<dyn Fn(&T) -> U + Send + Sync>,
    cache: Arc<Mutex<Option<(u64, U)>>>,
}

impl<T, U> Clone for Derived<T, U> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            compute: Arc::clone(&self.compute),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<T, U> Derived<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    /// Returns the projected value, recomputing it if the source changed.
    #[must_use]
    pub fn get(&self) -> U {
        let slot = self.source.inner.slot.read();
        let mut cache = self.cache.lock();
        if let Some((version, value)) = cache.as_ref() {
            if *version == slot.version {
                return value.clone();
            }
        }
        let value = (self.compute)(&slot.value);
        *cache = Some((slot.version, value.clone()));
        value
    }
}
