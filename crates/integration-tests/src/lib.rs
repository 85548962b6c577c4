//! Integration tests for the CMSG basket engine.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cmsg-integration-tests
//!
//! # With engine logs
//! RUST_LOG=cmsg_basket=debug cargo test -p cmsg-integration-tests -- --nocapture
//! ```
//!
//! # Test Categories
//!
//! - `basket_sync` - Views converging across and within browsing contexts
//! - `basket_persistence` - Durable storage, restarts and broken storage
//!
//! This library holds the shared fixtures: a scripted catalog, a storage
//! backend that always fails, and helpers for waiting on change notifications.
//! Tests needing durable storage put it in a `tempfile::tempdir()`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cmsg_basket::storage::StorageBackend;
use cmsg_basket::{BasketChanged, BasketSource, CatalogError, ChangeCause, LineItem, StoreError};
use cmsg_core::{BasketId, CatalogBasket, MenuItem, MenuItemId, Price, UserId};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// How long a test waits for a change to propagate.
pub const PROPAGATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to warnings from the engine.
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cmsg_basket=warn".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Catalog
// =============================================================================

/// Catalog double returning a fixed basket, or `NotFound` when it has none.
///
/// Clones share the call counter.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    basket: Option<CatalogBasket>,
    calls: Arc<AtomicUsize>,
}

impl StaticCatalog {
    /// A catalog with no basket for anyone.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A catalog holding `owner`'s basket with the given menu items.
    #[must_use]
    pub fn with_items(owner: UserId, items: Vec<MenuItem>) -> Self {
        Self {
            basket: Some(CatalogBasket {
                id: BasketId::new(1),
                user_id: owner,
                menu_items: items,
            }),
            calls: Arc::default(),
        }
    }

    /// Number of fetches served so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BasketSource for StaticCatalog {
    async fn fetch_basket(&self, owner: UserId) -> Result<CatalogBasket, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.basket
            .clone()
            .filter(|basket| basket.user_id == owner)
            .ok_or(CatalogError::NotFound(owner))
    }
}

/// A catalog menu item priced in pence.
#[must_use]
pub fn menu_item(id: i32, name: &str, pence: u32) -> MenuItem {
    MenuItem {
        id: MenuItemId::new(id),
        name: name.to_string(),
        price: Price::from_minor(pence),
        description: None,
        category: "Mains".to_string(),
        order: id,
    }
}

/// A basket line priced in pence.
#[must_use]
pub fn line(id: i32, name: &str, pence: u32) -> LineItem {
    LineItem::from(&menu_item(id, name, pence))
}

// =============================================================================
// Storage
// =============================================================================

/// Backend standing in for disabled or full browser storage.
#[derive(Debug, Default)]
pub struct UnavailableBackend;

impl StorageBackend for UnavailableBackend {
    fn read(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("storage disabled".to_string()))
    }

    fn write(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("quota exceeded".to_string()))
    }

    fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("storage disabled".to_string()))
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// Wait for the next change with the given cause, skipping others.
///
/// Returns `None` on timeout or if the view is gone.
pub async fn wait_for_change(
    changes: &mut broadcast::Receiver<BasketChanged>,
    cause: ChangeCause,
) -> Option<BasketChanged> {
    let next = async {
        loop {
            match changes.recv().await {
                Ok(event) if event.cause == cause => return Some(event),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    };
    tokio::time::timeout(PROPAGATION_TIMEOUT, next)
        .await
        .ok()
        .flatten()
}

/// Causes of every notification already queued on `changes`.
pub fn drain_causes(changes: &mut broadcast::Receiver<BasketChanged>) -> Vec<ChangeCause> {
    std::iter::from_fn(|| changes.try_recv().ok())
        .map(|event| event.cause)
        .collect()
}
