//! Wiring for one browsing context.
//!
//! A [`BrowsingContext`] owns the context's storage handle and its single
//! [`ChangeChannel`]. Every basket view opened in the context shares both.

use cmsg_core::UserId;
use tracing::{debug, info};

use crate::attempt::attempt;
use crate::catalog::BasketSource;
use crate::channel::ChangeChannel;
use crate::config::BasketConfig;
use crate::storage::{ContextId, LocalStorage, StorageMedium};
use crate::store::BasketStore;
use crate::sync::BasketSynchronizer;

/// One tab's share of the storage medium.
#[derive(Debug, Clone)]
pub struct BrowsingContext {
    storage: LocalStorage,
    channel: ChangeChannel,
    config: BasketConfig,
}

impl BrowsingContext {
    /// Open a context on `medium` and start listening for other contexts'
    /// writes. Failing to listen is logged; the context still works locally.
    #[must_use]
    pub fn open(medium: &StorageMedium, config: &BasketConfig) -> Self {
        let storage = medium.open_context();
        let channel = ChangeChannel::new(config.storage_key.clone(), config.echo);
        attempt("attach_channel", channel.attach(&storage));
        info!(context = %storage.context(), key = %config.storage_key, "Browsing context opened");
        Self {
            storage,
            channel,
            config: config.clone(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> ContextId {
        self.storage.context()
    }

    #[must_use]
    pub const fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    #[must_use]
    pub const fn channel(&self) -> &ChangeChannel {
        &self.channel
    }

    #[must_use]
    pub const fn config(&self) -> &BasketConfig {
        &self.config
    }

    /// The basket store for this context.
    #[must_use]
    pub fn store(&self) -> BasketStore {
        BasketStore::new(self.storage.clone(), self.config.storage_key.clone())
    }

    /// Create a basket view in this context. Call
    /// [`BasketSynchronizer::initialize`] before use.
    #[must_use]
    pub fn synchronizer<C: BasketSource>(&self, owner: UserId, catalog: C) -> BasketSynchronizer<C> {
        debug!(context = %self.id(), %owner, "Creating basket view");
        BasketSynchronizer::new(owner, self.store(), self.channel.clone(), catalog, &self.config)
    }

    /// Stop listening and drop every subscriber. Views stay usable in memory.
    pub fn close(&self) {
        attempt("close_channel", self.channel.close());
        info!(context = %self.id(), "Browsing context closed");
    }
}
