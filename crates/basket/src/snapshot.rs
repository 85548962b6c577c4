//! JSON codec for persisted baskets.
//!
//! Layout: `{ "id", "userId", "menuItems": [{ "id", "name", "price",
//! "description" }] }`. Prices are decimal strings; `description` is `null`
//! when absent.

use crate::error::{Result, SyncError};
use crate::model::Basket;

/// Encode a basket for storage.
///
/// # Errors
///
/// Returns [`SyncError::Serialization`] if encoding fails.
pub fn encode(basket: &Basket) -> Result<String> {
    serde_json::to_string(basket).map_err(SyncError::Serialization)
}

/// Decode a stored or received payload.
///
/// # Errors
///
/// Returns [`SyncError::Deserialization`] if the payload is not a valid
/// basket (including one with a negative price).
pub fn decode(raw: &str) -> Result<Basket> {
    serde_json::from_str(raw).map_err(SyncError::Deserialization)
}
