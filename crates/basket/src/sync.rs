//! Basket synchronizer.
//!
//! Orchestrates one basket view: loading it (from local storage, falling back
//! to the catalog), mutating it, persisting after every mutation and applying
//! changes published by sibling views or other contexts.
//!
//! # Consistency
//!
//! - Mutations within one synchronizer are applied, written and published in
//!   call order, even when calls overlap.
//! - A change from elsewhere replaces the whole basket: last write wins, no
//!   merge.
//! - Storage and subscription failures are logged and swallowed via
//!   [`crate::attempt`]; the view keeps working in memory.
//! - A synchronizer only persists while its storage lifecycle is linked, so it
//!   never overwrites a snapshot it has not loaded yet.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use cmsg_core::{MenuItemId, Price, UserId};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use crate::attempt::{attempt, attempt_async};
use crate::catalog::BasketSource;
use crate::channel::{ChangeChannel, ChangeSubscriber, DeliveryError, SubscriptionId};
use crate::config::BasketConfig;
use crate::error::SyncError;
use crate::lifecycle::Lifecycle;
use crate::model::{Basket, LineItem};
use crate::snapshot;
use crate::store::BasketStore;

/// Why a [`BasketChanged`] notification was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    /// Domain initialization finished.
    Initialized,
    /// A stored snapshot replaced the basket.
    Restored,
    /// This view added or removed an item.
    Local,
    /// Another view or context wrote the basket.
    External,
}

/// Local change notification carrying the basket as it now stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasketChanged {
    pub basket: Basket,
    pub cause: ChangeCause,
}

/// Keeps one basket view in step with local storage and other views.
///
/// Cloning yields another handle to the same view.
pub struct BasketSynchronizer<C> {
    inner: Arc<SyncInner<C>>,
}

impl<C> Clone for BasketSynchronizer<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SyncInner<C> {
    owner: UserId,
    basket: RwLock<Basket>,
    lifecycle: Mutex<Lifecycle>,
    /// Serializes initialization; concurrent callers wait for the first.
    init_gate: tokio::sync::Mutex<()>,
    /// Held from a mutation through its write and publish.
    write_gate: tokio::sync::Mutex<()>,
    /// Bumped on every applied external change.
    external_seq: AtomicU64,
    store: BasketStore,
    channel: ChangeChannel,
    catalog: C,
    changes: broadcast::Sender<BasketChanged>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl<C: BasketSource> BasketSynchronizer<C> {
    /// Create an uninitialized view with an empty basket.
    #[must_use]
    pub fn new(
        owner: UserId,
        store: BasketStore,
        channel: ChangeChannel,
        catalog: C,
        config: &BasketConfig,
    ) -> Self {
        let (changes, _) = broadcast::channel(config.change_capacity.max(1));
        Self {
            inner: Arc::new(SyncInner {
                owner,
                basket: RwLock::new(Basket::empty(owner)),
                lifecycle: Mutex::new(Lifecycle::new()),
                init_gate: tokio::sync::Mutex::new(()),
                write_gate: tokio::sync::Mutex::new(()),
                external_seq: AtomicU64::new(0),
                store,
                channel,
                catalog,
                changes,
                subscription: Mutex::new(None),
            }),
        }
    }

    /// Link storage, then load the domain basket if still needed.
    pub async fn initialize(&self) {
        self.initialize_storage().await;
        self.initialize_domain().await;
    }

    /// Fetch the owner's basket from the catalog if the view is empty.
    ///
    /// Runs once; later calls return immediately. A failed fetch leaves the
    /// basket empty. Always ends with a [`ChangeCause::Initialized`]
    /// notification on the first call.
    #[instrument(skip(self), fields(owner = %self.inner.owner))]
    pub async fn initialize_domain(&self) {
        let _gate = self.inner.init_gate.lock().await;
        if !self.inner.with_lifecycle(Lifecycle::begin_domain) {
            debug!("Domain already initialized");
            return;
        }

        if self.inner.with_basket(Basket::is_empty) {
            let fetched = attempt_async("fetch_basket", async {
                self.inner
                    .catalog
                    .fetch_basket(self.inner.owner)
                    .await
                    .map_err(SyncError::from)
            })
            .await
            .map(Basket::from);

            if let Some(fetched) = fetched {
                let _turn = self.inner.write_gate.lock().await;
                let applied = self.inner.update(|basket| {
                    if basket.is_empty() {
                        *basket = fetched.clone();
                        true
                    } else {
                        false
                    }
                });
                if applied {
                    info!(items = fetched.item_count(), "Loaded basket from catalog");
                    if !fetched.is_empty() {
                        self.persist().await;
                    }
                } else {
                    debug!("Basket changed while fetching, keeping local items");
                }
            }
        }

        self.inner.with_lifecycle(Lifecycle::complete_domain);
        self.inner.notify(ChangeCause::Initialized);
    }

    /// Subscribe to changes from elsewhere and restore the stored snapshot.
    ///
    /// Runs once until [`teardown`](Self::teardown). A non-empty snapshot
    /// replaces whatever the basket currently holds, unless a newer change
    /// was delivered while reading it. With nothing stored, a basket already
    /// loaded from the catalog is written out. Failures are logged and the
    /// view continues in memory.
    #[instrument(skip(self), fields(owner = %self.inner.owner, key = %self.inner.store.key()))]
    pub async fn initialize_storage(&self) {
        let _gate = self.inner.init_gate.lock().await;
        if self.inner.with_lifecycle(|l| l.is_storage_linked()) {
            debug!("Storage already linked");
            return;
        }

        // Subscribe before reading so a write landing in between is delivered.
        let listener: Arc<dyn ChangeSubscriber> = Arc::new(SyncListener {
            inner: Arc::downgrade(&self.inner),
        });
        if let Some(id) = attempt("subscribe", self.inner.channel.subscribe(listener)) {
            *self.inner.subscription_slot() = Some(id);
        }

        let seen = self.inner.external_seq.load(Ordering::SeqCst);
        let restored = attempt_async("load_snapshot", self.inner.store.load())
            .await
            .flatten()
            .filter(|basket| !basket.is_empty());
        let found_snapshot = restored.is_some();
        if let Some(restored) = restored {
            if self.inner.external_seq.load(Ordering::SeqCst) == seen {
                info!(items = restored.item_count(), "Restored basket from storage");
                self.inner.replace(restored);
                self.inner.notify(ChangeCause::Restored);
            } else {
                debug!("Newer basket arrived while loading, skipping restore");
            }
        }

        self.inner.with_lifecycle(Lifecycle::link_storage);

        if !found_snapshot && !self.inner.with_basket(Basket::is_empty) {
            debug!("Storing basket loaded before storage was linked");
            let _turn = self.inner.write_gate.lock().await;
            self.persist().await;
        }
    }

    /// Append an item, persist, and notify.
    ///
    /// The notification is sent even when persisting fails.
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn add(&self, item: LineItem) {
        let _turn = self.inner.write_gate.lock().await;
        self.inner.update(|basket| basket.add_item(item));
        self.persist().await;
        self.inner.notify(ChangeCause::Local);
    }

    /// Remove the most recently added unit of `item_id`, persist, and notify.
    ///
    /// Returns `false` and does nothing if the basket holds no such unit.
    #[instrument(skip(self))]
    pub async fn remove(&self, item_id: MenuItemId) -> bool {
        let _turn = self.inner.write_gate.lock().await;
        if !self.inner.update(|basket| basket.remove_item(item_id)) {
            debug!("Item not in basket");
            return false;
        }
        self.persist().await;
        self.inner.notify(ChangeCause::Local);
        true
    }

    /// Apply a payload written elsewhere.
    ///
    /// A valid snapshot replaces the basket; anything else is logged and
    /// dropped.
    pub fn on_external_change(&self, raw: &str) {
        self.inner.apply_external(raw);
    }

    /// Unsubscribe this context from change notifications and unlink storage.
    ///
    /// Clears every subscriber of the context's channel. Never fails.
    #[instrument(skip(self), fields(owner = %self.inner.owner))]
    pub fn teardown(&self) {
        if let Some(removed) = attempt("unsubscribe", self.inner.channel.unsubscribe_all()) {
            debug!(removed, "Unsubscribed from basket changes");
        }
        self.inner.subscription_slot().take();
        self.inner.with_lifecycle(Lifecycle::unlink_storage);
    }

    /// Receive a notification after every change to this view.
    #[must_use]
    pub fn changes(&self) -> broadcast::Receiver<BasketChanged> {
        self.inner.changes.subscribe()
    }

    /// A copy of the current basket.
    #[must_use]
    pub fn basket(&self) -> Basket {
        self.inner.snapshot()
    }

    /// Run `f` against the current basket without copying it.
    pub fn with_basket<R>(&self, f: impl FnOnce(&Basket) -> R) -> R {
        self.inner.with_basket(f)
    }

    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.inner.with_basket(Basket::subtotal)
    }

    #[must_use]
    pub fn delivery_fee(&self) -> Price {
        self.inner.with_basket(Basket::delivery_fee)
    }

    #[must_use]
    pub fn total(&self) -> Price {
        self.inner.with_basket(Basket::total)
    }

    /// Grouped lines as `(representative, quantity)`, ordered by catalog id.
    #[must_use]
    pub fn grouped_items(&self) -> Vec<(LineItem, usize)> {
        self.inner.with_basket(|basket| {
            basket
                .grouped_items_sorted()
                .into_iter()
                .map(|group| (group.item.clone(), group.quantity))
                .collect()
        })
    }

    #[must_use]
    pub fn owner(&self) -> UserId {
        self.inner.owner
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.with_lifecycle(|l| *l)
    }

    /// This view's registration on the context channel, while linked.
    #[must_use]
    pub fn subscription(&self) -> Option<SubscriptionId> {
        *self.inner.subscription_slot()
    }

    /// Write the current basket and tell sibling views, if storage is linked.
    ///
    /// Callers hold `write_gate`, so the last write and the last publish both
    /// carry the newest basket.
    async fn persist(&self) {
        if !self.inner.with_lifecycle(|l| l.is_storage_linked()) {
            debug!("Storage not linked, change kept in memory");
            return;
        }
        let basket = self.inner.snapshot();
        if let Some(payload) = attempt_async("persist_basket", self.inner.store.save(&basket)).await
        {
            let origin = *self.inner.subscription_slot();
            let delivered = self.inner.channel.publish(&payload, origin);
            debug!(delivered, "Published basket to local views");
        }
    }
}

impl<C> fmt::Debug for BasketSynchronizer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasketSynchronizer")
            .field("owner", &self.inner.owner)
            .field("store", &self.inner.store)
            .field("lifecycle", &self.inner.with_lifecycle(|l| *l))
            .finish_non_exhaustive()
    }
}

impl<C> SyncInner<C> {
    fn with_basket<R>(&self, f: impl FnOnce(&Basket) -> R) -> R {
        f(&self.basket.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn update<R>(&self, f: impl FnOnce(&mut Basket) -> R) -> R {
        f(&mut self.basket.write().unwrap_or_else(PoisonError::into_inner))
    }

    fn snapshot(&self) -> Basket {
        self.with_basket(Basket::clone)
    }

    fn replace(&self, basket: Basket) {
        self.update(|current| *current = basket);
    }

    fn with_lifecycle<R>(&self, f: impl FnOnce(&mut Lifecycle) -> R) -> R {
        f(&mut self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn subscription_slot(&self) -> std::sync::MutexGuard<'_, Option<SubscriptionId>> {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, cause: ChangeCause) {
        let event = BasketChanged {
            basket: self.snapshot(),
            cause,
        };
        // No receivers means no view is rendering this basket right now.
        let _ = self.changes.send(event);
    }

    fn apply_external(&self, raw: &str) {
        let Some(basket) = attempt("decode_external_change", snapshot::decode(raw)) else {
            return;
        };
        debug!(items = basket.item_count(), "Applying basket written elsewhere");
        self.replace(basket);
        self.external_seq.fetch_add(1, Ordering::SeqCst);
        self.notify(ChangeCause::External);
    }
}

/// Channel registration of a synchronizer. Holds it weakly so the channel
/// does not keep a dropped view alive.
struct SyncListener<C> {
    inner: Weak<SyncInner<C>>,
}

impl<C: BasketSource> ChangeSubscriber for SyncListener<C> {
    fn on_storage_changed(&self, payload: &str) -> Result<(), DeliveryError> {
        let inner = self
            .inner
            .upgrade()
            .ok_or_else(|| DeliveryError("basket view was dropped".to_string()))?;
        inner.apply_external(payload);
        Ok(())
    }
}
