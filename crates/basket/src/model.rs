//! In-memory basket and its derived views.
//!
//! Totals and groupings are recomputed on every call; baskets are small and a
//! cache would need invalidating on every mutation.

use cmsg_core::{BasketId, MenuItemId, Price, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Flat delivery surcharge applied to any non-empty basket.
pub const DELIVERY_FEE: Price = Price::new_unchecked(Decimal::from_parts(200, 0, 0, false, 2));

/// One unit of a catalog item placed in the basket.
///
/// Duplicates are allowed; each represents a separate unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: MenuItemId,
    pub name: String,
    pub price: Price,
    pub description: Option<String>,
}

/// The client-side basket: owner plus an ordered list of line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Basket {
    /// `None` until the basket has been persisted by the order subsystem.
    #[serde(default)]
    pub id: Option<BasketId>,
    pub user_id: UserId,
    #[serde(default)]
    pub menu_items: Vec<LineItem>,
}

impl Basket {
    /// Create an empty basket for an owner.
    #[must_use]
    pub const fn empty(user_id: UserId) -> Self {
        Self {
            id: None,
            user_id,
            menu_items: Vec::new(),
        }
    }

    /// Append a unit.
    pub fn add_item(&mut self, item: LineItem) {
        self.menu_items.push(item);
    }

    /// Remove the most recently added unit with the given catalog id.
    ///
    /// Returns `false` (and leaves the basket untouched) if no unit matches.
    pub fn remove_item(&mut self, id: MenuItemId) -> bool {
        match self.menu_items.iter().rposition(|item| item.id == id) {
            Some(index) => {
                self.menu_items.remove(index);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.menu_items.is_empty()
    }

    /// Number of units (not distinct items).
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.menu_items.len()
    }

    /// Units grouped by catalog id, in order of first appearance.
    ///
    /// The iterator is lazy; clone it to walk the groups again.
    #[must_use]
    pub fn grouped_items(&self) -> GroupedItems<'_> {
        GroupedItems {
            items: &self.menu_items,
            position: 0,
        }
    }

    /// Units grouped by catalog id, ordered by id.
    #[must_use]
    pub fn grouped_items_sorted(&self) -> Vec<GroupedLine<'_>> {
        let mut groups: Vec<_> = self.grouped_items().collect();
        groups.sort_by_key(|group| group.item.id);
        groups
    }

    /// Sum of unit prices.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.menu_items.iter().map(|item| item.price).sum()
    }

    /// [`DELIVERY_FEE`] when the basket has items, zero otherwise.
    #[must_use]
    pub fn delivery_fee(&self) -> Price {
        if self.is_empty() {
            Price::ZERO
        } else {
            DELIVERY_FEE
        }
    }

    #[must_use]
    pub fn total(&self) -> Price {
        self.subtotal() + self.delivery_fee()
    }
}

/// A display aggregation of identical units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupedLine<'a> {
    /// The first unit added with this catalog id.
    pub item: &'a LineItem,
    pub quantity: usize,
}

impl GroupedLine<'_> {
    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.item.price.times(self.quantity)
    }
}

/// Lazy iterator over a basket's [`GroupedLine`]s.
#[derive(Debug, Clone)]
pub struct GroupedItems<'a> {
    items: &'a [LineItem],
    position: usize,
}

impl<'a> Iterator for GroupedItems<'a> {
    type Item = GroupedLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(item) = self.items.get(self.position) {
            let (seen, rest) = self.items.split_at(self.position);
            self.position += 1;
            if seen.iter().any(|earlier| earlier.id == item.id) {
                continue;
            }
            let quantity = rest.iter().filter(|other| other.id == item.id).count();
            return Some(GroupedLine { item, quantity });
        }
        None
    }
}
