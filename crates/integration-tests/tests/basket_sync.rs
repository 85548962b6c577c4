//! Integration tests for keeping basket views consistent.
//!
//! Each test opens one shared storage medium (a browser profile) and one or
//! more browsing contexts (tabs) on it, then checks that views converge on
//! the last write.

#![allow(clippy::unwrap_used)]

use cmsg_basket::{
    Basket, BasketConfig, BrowsingContext, ChangeCause, EchoPolicy, StorageMedium,
};
use cmsg_core::{MenuItemId, UserId};
use cmsg_integration_tests::{
    StaticCatalog, drain_causes, init_tracing, line, menu_item, wait_for_change,
};

const OWNER: UserId = UserId::new(1);

fn config(echo: EchoPolicy) -> BasketConfig {
    BasketConfig {
        echo,
        ..BasketConfig::default()
    }
}

// =============================================================================
// Across Contexts
// =============================================================================

#[tokio::test]
async fn test_write_in_one_tab_reaches_the_other() {
    init_tracing();
    let medium = StorageMedium::in_memory(16);
    let tab_a = BrowsingContext::open(&medium, &BasketConfig::default());
    let tab_b = BrowsingContext::open(&medium, &BasketConfig::default());

    let view_a = tab_a.synchronizer(OWNER, StaticCatalog::empty());
    let view_b = tab_b.synchronizer(OWNER, StaticCatalog::empty());
    view_a.initialize().await;
    view_b.initialize().await;
    let mut b_changes = view_b.changes();

    view_a.add(line(7, "Katsu Curry", 1299)).await;

    let event = wait_for_change(&mut b_changes, ChangeCause::External)
        .await
        .unwrap();
    assert_eq!(event.basket, view_a.basket());
    assert_eq!(view_b.basket(), view_a.basket());
    assert_eq!(view_b.total().to_string(), "14.99");
}

#[tokio::test]
async fn test_last_write_wins_across_tabs() {
    init_tracing();
    let medium = StorageMedium::in_memory(16);
    let tab_a = BrowsingContext::open(&medium, &BasketConfig::default());
    let tab_b = BrowsingContext::open(&medium, &BasketConfig::default());
    let view_a = tab_a.synchronizer(OWNER, StaticCatalog::empty());
    let view_b = tab_b.synchronizer(OWNER, StaticCatalog::empty());
    view_a.initialize().await;
    view_b.initialize().await;
    let mut a_changes = view_a.changes();
    let mut b_changes = view_b.changes();

    view_a.add(line(1, "Ramen", 1100)).await;
    wait_for_change(&mut b_changes, ChangeCause::External)
        .await
        .unwrap();

    view_b.add(line(2, "Gyoza", 550)).await;
    let event = wait_for_change(&mut a_changes, ChangeCause::External)
        .await
        .unwrap();

    assert_eq!(event.basket.item_count(), 2);
    assert_eq!(view_a.basket(), view_b.basket());
}

#[tokio::test]
async fn test_new_tab_restores_from_storage() {
    init_tracing();
    let medium = StorageMedium::in_memory(16);
    let tab_a = BrowsingContext::open(&medium, &BasketConfig::default());
    let view_a = tab_a.synchronizer(OWNER, StaticCatalog::empty());
    view_a.initialize().await;
    view_a.add(line(3, "Edamame", 400)).await;
    view_a.add(line(3, "Edamame", 400)).await;

    let catalog = StaticCatalog::with_items(OWNER, vec![menu_item(9, "Mochi", 350)]);
    let tab_b = BrowsingContext::open(&medium, &BasketConfig::default());
    let view_b = tab_b.synchronizer(OWNER, catalog.clone());
    view_b.initialize().await;

    assert_eq!(view_b.basket(), view_a.basket());
    assert_eq!(view_b.grouped_items().first().map(|(_, quantity)| *quantity), Some(2));
    assert_eq!(catalog.calls(), 0);
}

#[tokio::test]
async fn test_malformed_write_leaves_other_tab_unchanged() {
    init_tracing();
    let medium = StorageMedium::in_memory(16);
    let tab_a = BrowsingContext::open(&medium, &BasketConfig::default());
    let tab_b = BrowsingContext::open(&medium, &BasketConfig::default());
    let view_a = tab_a.synchronizer(OWNER, StaticCatalog::empty());
    view_a.initialize().await;
    view_a.add(line(1, "Ramen", 1100)).await;
    let before = view_a.basket();
    let mut a_changes = view_a.changes();

    let key = tab_b.config().storage_key.clone();
    tab_b.storage().set(&key, "{not json").await.unwrap();
    tab_b.storage().set(&key, "").await.unwrap();
    tab_b.storage().remove(&key).await.unwrap();

    let mut replacement = Basket::empty(OWNER);
    replacement.add_item(line(5, "Udon", 900));
    let payload = serde_json::to_string(&replacement).unwrap();
    tab_b.storage().set(&key, &payload).await.unwrap();

    // Only the well-formed write produces a change.
    let event = wait_for_change(&mut a_changes, ChangeCause::External)
        .await
        .unwrap();
    assert_ne!(event.basket, before);
    assert_eq!(event.basket, replacement);
    assert!(drain_causes(&mut a_changes).is_empty());
}

#[tokio::test]
async fn test_external_payload_with_numeric_prices() {
    init_tracing();
    let medium = StorageMedium::in_memory(16);
    let tab_a = BrowsingContext::open(&medium, &BasketConfig::default());
    let tab_b = BrowsingContext::open(&medium, &BasketConfig::default());
    let view_a = tab_a.synchronizer(OWNER, StaticCatalog::empty());
    view_a.initialize().await;
    let mut a_changes = view_a.changes();

    let payload = serde_json::json!({
        "id": null,
        "userId": 1,
        "menuItems": [
            {"id": 4, "name": "Tea", "price": 2.5, "description": "Green"},
            {"id": 4, "name": "Tea", "price": 2.5, "description": "Green"}
        ]
    });
    let key = tab_b.config().storage_key.clone();
    tab_b
        .storage()
        .set(&key, &payload.to_string())
        .await
        .unwrap();

    wait_for_change(&mut a_changes, ChangeCause::External)
        .await
        .unwrap();
    assert_eq!(view_a.subtotal().to_string(), "5.00");
    assert_eq!(view_a.total().to_string(), "7.00");
}

#[tokio::test]
async fn test_torn_down_view_stops_listening() {
    init_tracing();
    let medium = StorageMedium::in_memory(16);
    let tab_a = BrowsingContext::open(&medium, &BasketConfig::default());
    let tab_b = BrowsingContext::open(&medium, &BasketConfig::default());
    let tab_c = BrowsingContext::open(&medium, &BasketConfig::default());
    let view_a = tab_a.synchronizer(OWNER, StaticCatalog::empty());
    let view_b = tab_b.synchronizer(OWNER, StaticCatalog::empty());
    let view_c = tab_c.synchronizer(OWNER, StaticCatalog::empty());
    for view in [&view_a, &view_b, &view_c] {
        view.initialize().await;
    }
    let mut c_changes = view_c.changes();

    view_a.teardown();
    view_b.add(line(2, "Gyoza", 550)).await;

    wait_for_change(&mut c_changes, ChangeCause::External)
        .await
        .unwrap();
    assert!(view_a.basket().is_empty());
    assert!(!view_a.lifecycle().is_storage_linked());
}

// =============================================================================
// Within One Context
// =============================================================================

#[tokio::test]
async fn test_sibling_views_converge_without_echo() {
    init_tracing();
    let medium = StorageMedium::in_memory(16);
    let tab = BrowsingContext::open(&medium, &config(EchoPolicy::Siblings));
    let header = tab.synchronizer(OWNER, StaticCatalog::empty());
    let page = tab.synchronizer(OWNER, StaticCatalog::empty());
    header.initialize().await;
    page.initialize().await;
    let mut header_changes = header.changes();
    let mut page_changes = page.changes();

    page.add(line(1, "Ramen", 1100)).await;

    // Same-context delivery happens before `add` returns.
    assert_eq!(header.basket(), page.basket());
    assert_eq!(drain_causes(&mut header_changes), vec![ChangeCause::External]);
    assert_eq!(drain_causes(&mut page_changes), vec![ChangeCause::Local]);
}

#[tokio::test]
async fn test_echo_all_delivers_back_to_writer() {
    init_tracing();
    let medium = StorageMedium::in_memory(16);
    let tab = BrowsingContext::open(&medium, &config(EchoPolicy::All));
    let view = tab.synchronizer(OWNER, StaticCatalog::empty());
    view.initialize().await;
    let mut changes = view.changes();

    view.add(line(1, "Ramen", 1100)).await;

    assert_eq!(
        drain_causes(&mut changes),
        vec![ChangeCause::External, ChangeCause::Local]
    );
    assert_eq!(view.basket().item_count(), 1);
}

#[tokio::test]
async fn test_remove_propagates_to_siblings() {
    init_tracing();
    let medium = StorageMedium::in_memory(16);
    let tab = BrowsingContext::open(&medium, &BasketConfig::default());
    let header = tab.synchronizer(OWNER, StaticCatalog::empty());
    let page = tab.synchronizer(OWNER, StaticCatalog::empty());
    header.initialize().await;
    page.initialize().await;

    page.add(line(3, "Edamame", 400)).await;
    page.add(line(3, "Edamame", 400)).await;
    assert!(page.remove(MenuItemId::new(3)).await);
    assert!(!page.remove(MenuItemId::new(99)).await);

    assert_eq!(header.basket().item_count(), 1);
    assert_eq!(header.total().to_string(), "6.00");
}

#[tokio::test]
async fn test_closed_context_keeps_views_in_memory() {
    init_tracing();
    let medium = StorageMedium::in_memory(16);
    let tab = BrowsingContext::open(&medium, &BasketConfig::default());
    let header = tab.synchronizer(OWNER, StaticCatalog::empty());
    let page = tab.synchronizer(OWNER, StaticCatalog::empty());
    header.initialize().await;
    page.initialize().await;

    tab.close();
    page.add(line(1, "Ramen", 1100)).await;

    assert_eq!(page.basket().item_count(), 1);
    assert!(header.basket().is_empty());
}

// =============================================================================
// Catalog Loading
// =============================================================================

#[tokio::test]
async fn test_catalog_basket_maps_into_view() {
    init_tracing();
    let medium = StorageMedium::in_memory(16);
    let tab = BrowsingContext::open(&medium, &BasketConfig::default());
    let catalog = StaticCatalog::with_items(
        OWNER,
        vec![
            menu_item(1, "Katsu Curry", 1299),
            menu_item(2, "Miso Soup", 350),
            menu_item(1, "Katsu Curry", 1299),
        ],
    );
    let view = tab.synchronizer(OWNER, catalog.clone());
    view.initialize().await;

    let basket = view.basket();
    let names: Vec<_> = basket.menu_items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["Katsu Curry", "Miso Soup", "Katsu Curry"]);
    assert!(basket.menu_items.iter().all(|i| i.description.is_none()));
    assert_eq!(view.subtotal().format(tab.config().currency), "£29.48");
    assert_eq!(view.total().format(tab.config().currency), "£31.48");
    assert_eq!(catalog.calls(), 1);
}

#[tokio::test]
async fn test_missing_catalog_basket_starts_empty() {
    init_tracing();
    let medium = StorageMedium::in_memory(16);
    let tab = BrowsingContext::open(&medium, &BasketConfig::default());
    let view = tab.synchronizer(OWNER, StaticCatalog::empty());
    let mut changes = view.changes();

    view.initialize().await;
    view.initialize().await;

    assert!(view.basket().is_empty());
    assert_eq!(view.delivery_fee().to_string(), "0.00");
    assert_eq!(drain_causes(&mut changes), vec![ChangeCause::Initialized]);
}
