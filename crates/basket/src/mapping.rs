//! Catalog entity to basket conversions.
//!
//! Pure and total: every catalog basket maps to a basket, keeping item order
//! and cardinality. Catalog-only fields (`category`, `order`) are dropped.

use cmsg_core::{CatalogBasket, MenuItem};

use crate::model::{Basket, LineItem};

impl From<&MenuItem> for LineItem {
    fn from(item: &MenuItem) -> Self {
        Self {
            id: item.id,
            name: item.name.clone(),
            price: item.price,
            description: item.description.clone(),
        }
    }
}

impl From<&CatalogBasket> for Basket {
    fn from(basket: &CatalogBasket) -> Self {
        Self {
            id: Some(basket.id),
            user_id: basket.user_id,
            menu_items: line_items(&basket.menu_items),
        }
    }
}

impl From<CatalogBasket> for Basket {
    fn from(basket: CatalogBasket) -> Self {
        Self::from(&basket)
    }
}

/// Map a sequence of catalog items, one line item per menu item.
#[must_use]
pub fn line_items(items: &[MenuItem]) -> Vec<LineItem> {
    items.iter().map(LineItem::from).collect()
}
