//! Core types for the ordering basket.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod catalog;
pub mod id;
pub mod price;

pub use catalog::{CatalogBasket, MenuItem};
pub use id::*;
pub use price::{CurrencyCode, Price, PriceError};
