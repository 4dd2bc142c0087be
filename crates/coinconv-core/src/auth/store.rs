//! Token persistence in a durable slot and a session-scoped slot.
//!
//! Several contexts (a REPL, a second terminal, a GUI window) may share one
//! durable backend. Each context has its own session slot and announces
//! its writes on a [`StorageBus`] so the others can re-read the shared key.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keyring::Entry;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default key shared by both slots
pub const DEFAULT_STORAGE_KEY: &str = "access_token";

/// Keychain service name for the keyring backend
const KEYRING_SERVICE: &str = "coinconv";

/// Pending notifications per subscriber before it starts lagging
const BUS_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// A string key-value backend for one storage slot.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process storage. Used for the session slot: its contents end with
/// the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// Durable storage: one file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::Unavailable(format!("invalid storage key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.token")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path(key)?) {
            Ok(contents) => {
                let value = contents.trim();
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path(key)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, value)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Durable storage in the OS keychain.
#[derive(Debug, Clone, Default)]
pub struct KeyringStore;

impl KeyringStore {
    pub fn new() -> Self {
        Self
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match Entry::new(KEYRING_SERVICE, key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Entry::new(KEYRING_SERVICE, key)?.set_password(value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match Entry::new(KEYRING_SERVICE, key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Identifies the context that wrote to shared storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Origin used for changes detected outside this process
    pub const EXTERNAL: ContextId = ContextId(0);

    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Notification that `key` changed in shared storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub origin: ContextId,
}

/// Broadcast channel connecting every context that shares a durable backend.
#[derive(Debug, Clone)]
pub struct StorageBus {
    tx: broadcast::Sender<StorageEvent>,
}

impl Default for StorageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: StorageEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.tx.subscribe()
    }
}

/// A durable backend plus the bus its contexts talk on.
#[derive(Clone)]
pub struct SharedStorage {
    durable: Arc<dyn KeyValueStore>,
    bus: StorageBus,
}

impl SharedStorage {
    pub fn new(durable: Arc<dyn KeyValueStore>) -> Self {
        Self {
            durable,
            bus: StorageBus::new(),
        }
    }

    pub fn bus(&self) -> &StorageBus {
        &self.bus
    }

    /// Open a new context with its own, empty session slot.
    pub fn open_context(&self, key: &str) -> TokenStore {
        TokenStore::new(
            key,
            Arc::clone(&self.durable),
            Arc::new(MemoryStore::new()),
            self.bus.clone(),
        )
    }

    /// Poll the durable slot and publish an external event whenever its value
    /// changes. Picks up writes made by other processes.
    pub fn spawn_durable_watcher(&self, key: &str, period: Duration) -> JoinHandle<()> {
        let durable = Arc::clone(&self.durable);
        let bus = self.bus.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let mut last = durable.get(&key).ok().flatten();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let current = match durable.get(&key) {
                    Ok(value) => value,
                    Err(e) => {
                        debug!(error = %e, "Durable slot unreadable during watch");
                        None
                    }
                };
                if current != last {
                    debug!(key = %key, "Durable slot changed outside this process");
                    last = current;
                    bus.publish(StorageEvent {
                        key: key.clone(),
                        origin: ContextId::EXTERNAL,
                    });
                }
            }
        })
    }
}

/// Raw contents of both slots, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlotValues {
    pub durable: Option<String>,
    pub session: Option<String>,
}

/// Token persistence for one context.
///
/// Backend failures are logged and swallowed: reads degrade to `None` and
/// writes are dropped, leaving an anonymous, non-persistent session.
#[derive(Clone)]
pub struct TokenStore {
    key: String,
    durable: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
    bus: StorageBus,
    origin: ContextId,
}

impl TokenStore {
    pub fn new(
        key: &str,
        durable: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        bus: StorageBus,
    ) -> Self {
        Self {
            key: key.to_string(),
            durable,
            session,
            bus,
            origin: ContextId::next(),
        }
    }

    /// Store backed only by process memory, for tests and ephemeral use
    pub fn in_memory(key: &str) -> Self {
        Self::new(
            key,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            StorageBus::new(),
        )
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn origin(&self) -> ContextId {
        self.origin
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.bus.subscribe()
    }

    /// Persist `token`. Without `remember` the durable slot is cleared so the
    /// token cannot outlive the session.
    pub fn save(&self, token: &str, remember: bool) {
        let before = self.durable_value();
        swallow("session", "write", self.session.set(&self.key, token));
        if remember {
            swallow("durable", "write", self.durable.set(&self.key, token));
        } else {
            swallow("durable", "remove", self.durable.remove(&self.key));
        }
        self.notify_if_changed(before);
    }

    /// Durable slot first, then the session slot
    pub fn load(&self) -> Option<String> {
        let durable = swallow("durable", "read", self.durable.get(&self.key));
        durable.or_else(|| swallow("session", "read", self.session.get(&self.key)))
    }

    pub fn clear(&self) {
        let before = self.durable_value();
        swallow("durable", "remove", self.durable.remove(&self.key));
        swallow("session", "remove", self.session.remove(&self.key));
        self.notify_if_changed(before);
    }

    pub fn slots(&self) -> SlotValues {
        SlotValues {
            durable: self.durable_value(),
            session: swallow("session", "read", self.session.get(&self.key)),
        }
    }

    fn durable_value(&self) -> Option<String> {
        swallow("durable", "read", self.durable.get(&self.key))
    }

    /// Announce only durable changes that alter the value.
    fn notify_if_changed(&self, before: Option<String>) {
        if self.durable_value() == before {
            return;
        }
        self.bus.publish(StorageEvent {
            key: self.key.clone(),
            origin: self.origin,
        });
    }
}

fn swallow<T: Default>(slot: &str, op: &str, result: Result<T, StorageError>) -> T {
    result.unwrap_or_else(|e| {
        warn!(slot, op, error = %e, "Token storage operation failed");
        T::default()
    })
}
