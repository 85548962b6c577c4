//! The basket's storage adapter: raw blobs under one fixed key.

use tracing::warn;

use crate::error::Result;
use crate::model::Basket;
use crate::snapshot;
use crate::storage::LocalStorage;

/// Reads and writes the basket snapshot of one context.
#[derive(Clone)]
pub struct BasketStore {
    storage: LocalStorage,
    key: String,
}

impl BasketStore {
    #[must_use]
    pub fn new(storage: LocalStorage, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// The key the snapshot lives under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The context-scoped storage handle.
    #[must_use]
    pub const fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    /// Read the raw snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StorageUnavailable` if the medium cannot be read.
    pub async fn read(&self) -> Result<Option<String>> {
        Ok(self.storage.get(&self.key).await?)
    }

    /// Replace the raw snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StorageUnavailable` if the medium cannot be written.
    pub async fn write(&self, raw: &str) -> Result<()> {
        Ok(self.storage.set(&self.key, raw).await?)
    }

    /// Delete the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StorageUnavailable` if the medium cannot be written.
    pub async fn clear(&self) -> Result<()> {
        Ok(self.storage.remove(&self.key).await?)
    }

    /// Read and decode the snapshot.
    ///
    /// An absent, blank or undecodable value yields `Ok(None)`; undecodable
    /// values are logged.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StorageUnavailable` if the medium cannot be read.
    pub async fn load(&self) -> Result<Option<Basket>> {
        let Some(raw) = self.read().await? else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        match snapshot::decode(&raw) {
            Ok(basket) => Ok(Some(basket)),
            Err(e) => {
                warn!(key = %self.key, kind = e.kind(), error = %e, "Ignoring unreadable basket snapshot");
                Ok(None)
            }
        }
    }

    /// Encode and write a basket, returning the payload that was stored.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Serialization` or
    /// `SyncError::StorageUnavailable`.
    pub async fn save(&self, basket: &Basket) -> Result<String> {
        let raw = snapshot::encode(basket)?;
        self.write(&raw).await?;
        Ok(raw)
    }
}

impl std::fmt::Debug for BasketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasketStore")
            .field("context", &self.storage.context())
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cmsg_core::{MenuItemId, Price, UserId};

    use super::*;
    use crate::model::LineItem;
    use crate::storage::StorageMedium;

    fn store() -> BasketStore {
        BasketStore::new(StorageMedium::in_memory(8).open_context(), "cmsg:basket")
    }

    #[tokio::test]
    async fn test_load_absent() {
        assert_eq!(store().load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = store();
        let mut basket = Basket::empty(UserId::new(1));
        basket.add_item(LineItem {
            id: MenuItemId::new(2),
            name: "Caesar Salad".to_string(),
            price: Price::from_minor(899),
            description: None,
        });

        let raw = store.save(&basket).await.unwrap();
        assert_eq!(store.read().await.unwrap().as_deref(), Some(raw.as_str()));
        assert_eq!(store.load().await.unwrap(), Some(basket));
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_is_absent() {
        let store = store();
        store.write("{broken").await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);

        store.write("   ").await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = store();
        store.save(&Basket::empty(UserId::new(1))).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.read().await.unwrap(), None);
    }
}
