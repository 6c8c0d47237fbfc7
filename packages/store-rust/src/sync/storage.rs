//! Web-storage style persistence of collection snapshots.
//!
//! A [`StorageSnapshot`] is written as JSON under the configured key, with an
//! RFC 3339 timestamp under `"<key>-date"`. On attach the snapshot is read
//! back once; an expired snapshot is discarded and removed, anything
//! unreadable is treated as absent. Writes follow every store change,
//! optionally throttled.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use tessera_core::{
    ClockSource, CollectionState, Entity, FilterValue, StorageSnapshot, Subscription, SystemClock,
};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::StorageSyncConfig;
use crate::error::StoreError;
use crate::store::CollectionStore;

/// A string key-value store with web-storage semantics.
pub trait KeyValueStorage: Send + Sync + 'static {
    /// Value under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove_item(&self, key: &str) -> anyhow::Result<()>;
}

/// Process-local storage, gone when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: DashMap<String, String>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.items.get(key).map(|value| value.clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        self.items.remove(key);
        Ok(())
    }
}

/// One file per key in a directory. Survives restarts.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Opens (creating if needed) the storage directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating storage directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path(key);
        std::fs::write(&path, value).with_context(|| format!("writing {}", path.display()))
    }

    fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("removing {}", path.display())),
        }
    }
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Keeps a store's snapshot persisted. Dropping it stops writing.
pub struct StorageSync {
    _subscription: Subscription,
    _writer: Option<JoinHandle<()>>,
}

struct Writer<S> {
    storage: Arc<S>,
    key: String,
    date_key: String,
    clock: Arc<dyn ClockSource>,
}

impl<S: KeyValueStorage> Writer<S> {
    fn write(&self, payload: &str) {
        let date = format_millis(self.clock.now());
        let result = self
            .storage
            .set_item(&self.key, payload)
            .and_then(|()| self.storage.set_item(&self.date_key, &date));
        if let Err(err) = result {
            warn!(key = %self.key, error = %err, "failed to persist collection snapshot");
        }
    }
}

impl StorageSync {
    /// Restores the store from `storage` and starts persisting it.
    ///
    /// A failed restore is logged and the store keeps its current state.
    pub fn attach<T, F, S>(
        store: &CollectionStore<T, F>,
        storage: Arc<S>,
        config: StorageSyncConfig,
    ) -> Self
    where
        T: Entity,
        F: FilterValue,
        S: KeyValueStorage,
    {
        Self::attach_with_clock(store, storage, config, Arc::new(SystemClock))
    }

    /// Like [`attach`](Self::attach) with an injected clock for timestamps
    /// and expiry.
    pub fn attach_with_clock<T, F, S>(
        store: &CollectionStore<T, F>,
        storage: Arc<S>,
        config: StorageSyncConfig,
        clock: Arc<dyn ClockSource>,
    ) -> Self
    where
        T: Entity,
        F: FilterValue,
        S: KeyValueStorage,
    {
        if let Err(err) = Self::restore(store, storage.as_ref(), &config, clock.as_ref()) {
            warn!(key = %config.key, error = %err, "failed to restore collection snapshot");
        }

        let fields = config.fields;
        let writer = Arc::new(Writer {
            storage,
            date_key: config.date_key(),
            key: config.key,
            clock,
        });
        let encode = move |s: &CollectionState<T, F>| {
            match serde_json::to_string(&StorageSnapshot::capture(s, fields)) {
                Ok(payload) => Some(payload),
                Err(err) => {
                    warn!(error = %err, "failed to encode collection snapshot");
                    None
                }
            }
        };

        let handle = if config.throttle.is_zero() {
            None
        } else {
            Handle::try_current().ok()
        };
        match handle {
            Some(handle) => {
                let (tx, rx) = watch::channel(String::new());
                let subscription = store.subscribe(move |s| {
                    if let Some(payload) = encode(s) {
                        tx.send_replace(payload);
                    }
                });
                let task = handle.spawn(write_throttled(rx, writer, config.throttle));
                Self {
                    _subscription: subscription,
                    _writer: Some(task),
                }
            }
            None => {
                let subscription = store.subscribe(move |s| {
                    if let Some(payload) = encode(s) {
                        writer.write(&payload);
                    }
                });
                Self {
                    _subscription: subscription,
                    _writer: None,
                }
            }
        }
    }

    /// Reads the persisted snapshot and applies it to `store`.
    ///
    /// Returns whether a snapshot was applied. A snapshot older than
    /// `config.expires` is removed together with its timestamp. Unparseable
    /// snapshots and timestamps are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the backend cannot be read or the
    /// expired entries cannot be removed.
    pub fn restore<T, F, S>(
        store: &CollectionStore<T, F>,
        storage: &S,
        config: &StorageSyncConfig,
        clock: &dyn ClockSource,
    ) -> Result<bool, StoreError>
    where
        T: Entity,
        F: FilterValue,
        S: KeyValueStorage + ?Sized,
    {
        let Some(raw) = storage.get_item(&config.key)? else {
            return Ok(false);
        };

        if let Some(expires) = config.expires {
            let date_key = config.date_key();
            if let Some(date) = storage.get_item(&date_key)? {
                let Some(written) = parse_millis(&date) else {
                    warn!(key = %date_key, date = %date, "ignoring snapshot with unparseable timestamp");
                    return Ok(false);
                };
                let age = clock.now().saturating_sub(written);
                if u128::from(age) > expires.as_millis() {
                    warn!(key = %config.key, age_ms = age, "discarding expired collection snapshot");
                    storage.remove_item(&config.key)?;
                    storage.remove_item(&date_key)?;
                    return Ok(false);
                }
            }
        }

        match serde_json::from_str::<StorageSnapshot<T, F>>(&raw) {
            Ok(snapshot) => {
                debug!(
                    key = %config.key,
                    entities = snapshot.id_list.len(),
                    "restoring collection snapshot"
                );
                store.restore_snapshot(snapshot);
                Ok(true)
            }
            Err(err) => {
                warn!(key = %config.key, error = %err, "ignoring unparseable collection snapshot");
                Ok(false)
            }
        }
    }
}

async fn write_throttled<S: KeyValueStorage>(
    mut rx: watch::Receiver<String>,
    writer: Arc<Writer<S>>,
    throttle: Duration,
) {
    while rx.changed().await.is_ok() {
        let payload = rx.borrow_and_update().clone();
        writer.write(&payload);
        tokio::time::sleep(throttle).await;
    }
}

fn format_millis(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_millis(raw: &str) -> Option<u64> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .and_then(|date| u64::try_from(date.timestamp_millis()).ok())
}
