//! CMSG Core - Shared types library.
//!
//! This crate provides the types shared between the basket engine and the
//! catalog/order subsystem it talks to:
//! - `cmsg-basket` - Basket model, persistence and cross-context sync
//! - `cmsg-integration-tests` - Multi-context scenario tests
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no storage access, no async
//! runtime. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, fixed-point prices and catalog entities

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
