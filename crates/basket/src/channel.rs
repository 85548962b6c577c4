//! Per-context change notification channel.
//!
//! One [`ChangeChannel`] exists per browsing context. It fans a basket payload
//! out to every [`ChangeSubscriber`] registered in that context, from two
//! sources:
//!
//! 1. [`ChangeChannel::publish`] after a local write completed, so other
//!    views in the same context pick it up. Whether the writer itself also
//!    receives its write is decided by the channel's [`EchoPolicy`].
//! 2. The storage medium's native signal for writes made by *other*
//!    contexts, relayed by a task started with [`ChangeChannel::attach`].
//!    These go to every subscriber.
//!
//! Delivery is fire-and-forget and isolated: a subscriber that fails or
//! panics is logged and skipped, the rest still receive the payload.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::storage::{ExternalChange, ExternalChanges, LocalStorage};

/// A subscriber could not process a payload.
#[derive(Debug, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Receives basket payloads published on a [`ChangeChannel`].
pub trait ChangeSubscriber: Send + Sync {
    /// Handle a raw snapshot payload.
    ///
    /// # Errors
    ///
    /// Errors are logged by the channel and do not affect other subscribers.
    fn on_storage_changed(&self, payload: &str) -> std::result::Result<(), DeliveryError>;
}

/// Whether a local write is delivered back to the subscription that wrote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoPolicy {
    /// Deliver to every other subscriber in the context, not the writer.
    #[default]
    Siblings,
    /// Deliver to every subscriber, the writer included.
    All,
}

impl EchoPolicy {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "siblings" => Some(Self::Siblings),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Siblings => "siblings",
            Self::All => "all",
        }
    }
}

/// Handle for one registration on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Broadcast point for one browsing context.
#[derive(Clone)]
pub struct ChangeChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    key: String,
    echo: EchoPolicy,
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn ChangeSubscriber>)>>,
    next_id: AtomicU64,
    relay: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ChangeChannel {
    /// Create a channel for payloads stored under `key`.
    #[must_use]
    pub fn new(key: impl Into<String>, echo: EchoPolicy) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                key: key.into(),
                echo,
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                relay: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The storage key whose changes this channel carries.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    #[must_use]
    pub fn echo_policy(&self) -> EchoPolicy {
        self.inner.echo
    }

    /// Register a subscriber.
    ///
    /// Registering a handler that is already subscribed returns its existing
    /// id instead of adding it twice.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Subscription`] if the channel has been closed.
    pub fn subscribe(&self, handler: Arc<dyn ChangeSubscriber>) -> Result<SubscriptionId> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(SyncError::Subscription("channel is closed".to_string()));
        }
        let mut subscribers = self.inner.subscribers_mut()?;
        if let Some((id, _)) = subscribers
            .iter()
            .find(|(_, existing)| Arc::ptr_eq(existing, &handler))
        {
            return Ok(*id);
        }
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        subscribers.push((id, handler));
        debug!(key = %self.inner.key, subscription = id.0, "Subscriber registered");
        Ok(id)
    }

    /// Remove every subscriber in this context, returning how many there were.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Subscription`] if the subscriber list is unusable.
    pub fn unsubscribe_all(&self) -> Result<usize> {
        let mut subscribers = self.inner.subscribers_mut()?;
        let removed = subscribers.len();
        subscribers.clear();
        drop(subscribers);
        debug!(key = %self.inner.key, removed, "Subscribers cleared");
        Ok(removed)
    }

    /// Deliver `payload` to this context's subscribers.
    ///
    /// `origin` is the writer's own subscription, if any; it is skipped under
    /// [`EchoPolicy::Siblings`]. Returns how many subscribers accepted it.
    pub fn publish(&self, payload: &str, origin: Option<SubscriptionId>) -> usize {
        self.inner.publish(payload, origin)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().map_or(0, |s| s.len())
    }

    /// Start relaying changes made by other contexts through `storage`'s
    /// medium. Calling it again while the relay runs does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Subscription`] outside a Tokio runtime or if the
    /// channel has been closed.
    pub fn attach(&self, storage: &LocalStorage) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(SyncError::Subscription("channel is closed".to_string()));
        }
        let mut relay = self
            .inner
            .relay
            .lock()
            .map_err(|_| SyncError::Subscription("relay lock poisoned".to_string()))?;
        if relay.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SyncError::Subscription(format!("no async runtime: {e}")))?;
        let changes = storage.external_changes();
        let task = relay_external_changes(
            Arc::downgrade(&self.inner),
            self.inner.key.clone(),
            storage.clone(),
            changes,
        );
        *relay = Some(runtime.spawn(task));
        drop(relay);

        info!(key = %self.inner.key, context = %storage.context(), "Listening for external basket changes");
        Ok(())
    }

    /// Stop relaying external changes.
    pub fn detach(&self) {
        if let Ok(mut relay) = self.inner.relay.lock()
            && let Some(handle) = relay.take()
        {
            handle.abort();
            debug!(key = %self.inner.key, "External change relay stopped");
        }
    }

    /// Whether the external change relay is running.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner
            .relay
            .lock()
            .map(|relay| relay.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    /// Detach, drop all subscribers and refuse new ones.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Subscription`] if the subscriber list is unusable;
    /// the channel is closed regardless.
    pub fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        self.detach();
        self.unsubscribe_all().map(|_| ())
    }
}

impl std::fmt::Debug for ChangeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeChannel")
            .field("key", &self.inner.key)
            .field("echo", &self.inner.echo)
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl ChannelInner {
    fn subscribers_mut(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, Vec<(SubscriptionId, Arc<dyn ChangeSubscriber>)>>>
    {
        self.subscribers
            .write()
            .map_err(|_| SyncError::Subscription("subscriber list poisoned".to_string()))
    }

    fn publish(&self, payload: &str, origin: Option<SubscriptionId>) -> usize {
        // Deliver from a copy so handlers may (un)subscribe without deadlocking.
        let targets: Vec<_> = match self.subscribers.read() {
            Ok(subscribers) => subscribers
                .iter()
                .filter(|(id, _)| self.echo == EchoPolicy::All || Some(*id) != origin)
                .cloned()
                .collect(),
            Err(_) => {
                warn!(key = %self.key, "Subscriber list poisoned, dropping publish");
                return 0;
            }
        };

        targets
            .iter()
            .filter(|(id, subscriber)| deliver(*id, subscriber.as_ref(), payload))
            .count()
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        if let Ok(relay) = self.relay.get_mut()
            && let Some(handle) = relay.take()
        {
            handle.abort();
        }
    }
}

fn deliver(id: SubscriptionId, subscriber: &dyn ChangeSubscriber, payload: &str) -> bool {
    match catch_unwind(AssertUnwindSafe(|| subscriber.on_storage_changed(payload))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(subscription = id.0, error = %e, "Subscriber rejected basket change");
            false
        }
        Err(_) => {
            warn!(subscription = id.0, "Subscriber panicked handling basket change");
            false
        }
    }
}

/// Forward other contexts' writes of `key` to the channel's subscribers.
///
/// Ends when the channel is dropped or the medium closes.
#[instrument(skip_all, fields(key = %key, context = %storage.context()))]
async fn relay_external_changes(
    channel: Weak<ChannelInner>,
    key: String,
    storage: LocalStorage,
    mut changes: ExternalChanges,
) {
    loop {
        let payload = match changes.next().await {
            ExternalChange::Changed(event) => {
                if event.key != key {
                    continue;
                }
                match event.new_value {
                    Some(value) if !value.is_empty() => value,
                    _ => continue,
                }
            }
            // Intermediate values are irrelevant under last-write-wins; catch
            // up with whatever is stored now.
            ExternalChange::Lagged { skipped } => match storage.get(&key).await {
                Ok(Some(value)) if !value.is_empty() => {
                    debug!(skipped, "Caught up with latest stored basket after lag");
                    value
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "Could not re-read basket after lag");
                    continue;
                }
            },
            ExternalChange::Closed => break,
        };

        let Some(channel) = channel.upgrade() else {
            break;
        };
        let delivered = channel.publish(&payload, None);
        debug!(delivered, "Relayed external basket change");
    }
    debug!("External change relay finished");
}
