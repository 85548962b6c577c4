//! CMSG basket engine.
//!
//! Holds a client's ordering basket in memory, derives its totals, persists it
//! to a local key-value store and keeps every view of it consistent across
//! browsing contexts (tabs) that share that store.
//!
//! # Architecture
//!
//! - [`storage`] - Key-value backends and the shared medium with its native
//!   cross-context change signal
//! - [`store`] - The basket's fixed-key adapter over a context's storage
//! - [`model`] - Basket, line items and derived views (grouping, totals)
//! - [`mapping`] - Catalog entity to basket conversions
//! - [`snapshot`] - JSON codec for persisted baskets
//! - [`channel`] - Per-context publish/subscribe for storage changes
//! - [`sync`] - The synchronizer tying the above together
//! - [`context`] - Wiring for one browsing context
//!
//! Storage is a convenience layer, not a system of record: nothing in this
//! crate surfaces a storage failure to the caller of the synchronizer.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod attempt;
pub mod catalog;
pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod mapping;
pub mod model;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod sync;

pub use catalog::BasketSource;
pub use channel::{ChangeChannel, ChangeSubscriber, EchoPolicy, SubscriptionId};
pub use config::BasketConfig;
pub use context::BrowsingContext;
pub use error::{CatalogError, StoreError, SyncError};
pub use model::{Basket, DELIVERY_FEE, GroupedLine, LineItem};
pub use storage::{ContextId, LocalStorage, StorageMedium};
pub use store::BasketStore;
pub use sync::{BasketChanged, BasketSynchronizer, ChangeCause};
