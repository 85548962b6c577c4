//! Catalog-owned entities.
//!
//! These are the shapes the menu catalog and order subsystem hand to the
//! basket engine. They carry the full catalog-backed fields; the basket keeps
//! only a reduced view of each item (see `cmsg-basket`'s mapping module).

use serde::{Deserialize, Serialize};

use super::id::{BasketId, MenuItemId, UserId};
use super::price::Price;

/// A menu item as held by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: MenuItemId,
    pub name: String,
    pub price: Price,
    /// Marketing copy; some items have none.
    pub description: Option<String>,
    /// Menu section, e.g. "Starter", "Main", "Dessert".
    pub category: String,
    /// Manual ordering hint within a category.
    pub order: i32,
}

/// A basket as persisted by the order subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogBasket {
    pub id: BasketId,
    pub user_id: UserId,
    pub menu_items: Vec<MenuItem>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_basket_json_shape() {
        let basket = CatalogBasket {
            id: BasketId::new(1),
            user_id: UserId::new(42),
            menu_items: vec![MenuItem {
                id: MenuItemId::new(1),
                name: "Margherita Pizza".to_string(),
                price: Price::from_minor(1299),
                description: None,
                category: "Main".to_string(),
                order: 0,
            }],
        };

        let value = serde_json::to_value(&basket).unwrap();
        assert_eq!(value["userId"], 42);
        assert_eq!(value["menuItems"][0]["price"], "12.99");
        assert!(value["menuItems"][0]["description"].is_null());
    }
}
