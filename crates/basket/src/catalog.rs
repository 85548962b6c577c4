//! Boundary with the catalog/order subsystem.

use std::future::Future;

use cmsg_core::{CatalogBasket, UserId};

use crate::error::CatalogError;

/// Source of an owner's basket when no local snapshot exists yet.
pub trait BasketSource: Send + Sync + 'static {
    /// Fetch the owner's basket.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the owner has no basket, or
    /// [`CatalogError::Unavailable`] if the catalog cannot be reached.
    fn fetch_basket(
        &self,
        owner: UserId,
    ) -> impl Future<Output = Result<CatalogBasket, CatalogError>> + Send;
}
