//! Key-value storage shared by browsing contexts.
//!
//! # Model
//!
//! A [`StorageMedium`] is the persistent store of one browser profile: a
//! [`StorageBackend`] holding string values under string keys, plus the
//! medium's native change signal. Each browsing context opens its own
//! [`LocalStorage`] handle. Writes through a handle emit a [`StorageEvent`]
//! tagged with the writer's [`ContextId`]; [`LocalStorage::external_changes`]
//! only yields events written by *other* contexts, never the handle's own.
//!
//! Backends are synchronous; [`LocalStorage`] runs them on the blocking pool so
//! callers suspend without stalling their context.

mod file;
mod memory;

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::BasketConfig;
use crate::error::StoreError;

pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Raw string storage under string keys.
pub trait StorageBackend: Send + Sync + 'static {
    /// Read the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be written.
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete the value under `key`. Deleting an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Identity of one browsing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generate a fresh context identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Native change signal: a key changed in the medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
    /// The context that performed the write.
    pub origin: ContextId,
}

/// The persistent store shared by every context of one profile.
#[derive(Clone)]
pub struct StorageMedium {
    backend: Arc<dyn StorageBackend>,
    events: broadcast::Sender<StorageEvent>,
}

impl StorageMedium {
    /// Create a medium over a backend.
    ///
    /// `event_capacity` bounds how many change events a slow context may fall
    /// behind before it starts missing them.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self { backend, events }
    }

    /// An in-memory medium.
    #[must_use]
    pub fn in_memory(event_capacity: usize) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), event_capacity)
    }

    /// Build the medium described by the configuration: file-backed when a
    /// storage directory is set, in-memory otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be created.
    pub fn from_config(config: &BasketConfig) -> Result<Self, StoreError> {
        let backend: Arc<dyn StorageBackend> = match &config.storage_dir {
            Some(dir) => Arc::new(FileBackend::open(dir)?),
            None => Arc::new(MemoryBackend::new()),
        };
        Ok(Self::new(backend, config.event_capacity))
    }

    /// Open a handle for a new browsing context.
    #[must_use]
    pub fn open_context(&self) -> LocalStorage {
        let context = ContextId::new();
        debug!(%context, "Opened storage context");
        LocalStorage {
            context,
            backend: Arc::clone(&self.backend),
            events: self.events.clone(),
        }
    }
}

/// One context's view of the shared medium.
#[derive(Clone)]
pub struct LocalStorage {
    context: ContextId,
    backend: Arc<dyn StorageBackend>,
    events: broadcast::Sender<StorageEvent>,
}

impl LocalStorage {
    /// The context this handle belongs to.
    #[must_use]
    pub const fn context(&self) -> ContextId {
        self.context
    }

    /// Read the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or its worker is lost.
    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let backend = Arc::clone(&self.backend);
        let key = key.to_owned();
        run_blocking(move || backend.read(&key)).await
    }

    /// Store `value` under `key` and signal other contexts.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails; no event is emitted then.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let backend = Arc::clone(&self.backend);
        let (k, v) = (key.to_owned(), value.to_owned());
        run_blocking(move || backend.write(&k, &v)).await?;
        self.signal(key, Some(value.to_owned()));
        Ok(())
    }

    /// Delete `key` and signal other contexts.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails; no event is emitted then.
    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let backend = Arc::clone(&self.backend);
        let k = key.to_owned();
        run_blocking(move || backend.remove(&k)).await?;
        self.signal(key, None);
        Ok(())
    }

    /// Changes written by other contexts, from now on.
    #[must_use]
    pub fn external_changes(&self) -> ExternalChanges {
        ExternalChanges {
            context: self.context,
            receiver: self.events.subscribe(),
        }
    }

    fn signal(&self, key: &str, new_value: Option<String>) {
        let event = StorageEvent {
            key: key.to_owned(),
            new_value,
            origin: self.context,
        };
        // No receivers just means no other context is listening.
        let _ = self.events.send(event);
    }
}

impl fmt::Debug for LocalStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStorage")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for StorageMedium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageMedium")
            .field("listeners", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}

/// Outcome of waiting for the next external change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalChange {
    /// Another context changed a key.
    Changed(StorageEvent),
    /// This listener fell behind and `skipped` events were dropped.
    Lagged { skipped: u64 },
    /// The medium is gone; no further events will arrive.
    Closed,
}

/// Stream of [`StorageEvent`]s that originated in other contexts.
pub struct ExternalChanges {
    context: ContextId,
    receiver: broadcast::Receiver<StorageEvent>,
}

impl ExternalChanges {
    /// Wait for the next change made by another context.
    pub async fn next(&mut self) -> ExternalChange {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.origin == self.context => {}
                Ok(event) => return ExternalChange::Changed(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(context = %self.context, skipped, "Storage listener lagged");
                    return ExternalChange::Lagged { skipped };
                }
                Err(broadcast::error::RecvError::Closed) => return ExternalChange::Closed,
            }
        }
    }
}

async fn run_blocking<T, F>(operation: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(|e| StoreError::Unavailable(format!("storage worker failed: {e}")))?
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn next_change(changes: &mut ExternalChanges) -> ExternalChange {
        tokio::time::timeout(Duration::from_secs(1), changes.next())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_contexts_share_values() {
        let medium = StorageMedium::in_memory(8);
        let a = medium.open_context();
        let b = medium.open_context();

        a.set("k", "v1").await.unwrap();
        assert_eq!(b.get("k").await.unwrap().as_deref(), Some("v1"));

        b.remove("k").await.unwrap();
        assert_eq!(a.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_writer_does_not_see_own_event() {
        let medium = StorageMedium::in_memory(8);
        let a = medium.open_context();
        let b = medium.open_context();
        let mut a_changes = a.external_changes();
        let mut b_changes = b.external_changes();

        a.set("k", "from-a").await.unwrap();
        b.set("k", "from-b").await.unwrap();

        let ExternalChange::Changed(seen_by_b) = next_change(&mut b_changes).await else {
            panic!("expected a change");
        };
        assert_eq!(seen_by_b.new_value.as_deref(), Some("from-a"));
        assert_eq!(seen_by_b.origin, a.context());

        let ExternalChange::Changed(seen_by_a) = next_change(&mut a_changes).await else {
            panic!("expected a change");
        };
        assert_eq!(seen_by_a.new_value.as_deref(), Some("from-b"));
    }

    #[tokio::test]
    async fn test_remove_signals_none() {
        let medium = StorageMedium::in_memory(8);
        let a = medium.open_context();
        let mut b_changes = medium.open_context().external_changes();

        a.remove("k").await.unwrap();
        let ExternalChange::Changed(event) = next_change(&mut b_changes).await else {
            panic!("expected a change");
        };
        assert_eq!(event.new_value, None);
    }

    #[tokio::test]
    async fn test_slow_listener_reports_lag() {
        let medium = StorageMedium::in_memory(2);
        let a = medium.open_context();
        let mut b_changes = medium.open_context().external_changes();

        for i in 0..5 {
            a.set("k", &i.to_string()).await.unwrap();
        }
        assert!(matches!(
            next_change(&mut b_changes).await,
            ExternalChange::Lagged { skipped: 3 }
        ));
    }
}
