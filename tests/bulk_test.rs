// tests/bulk_test.rs — Integration test: bulk sessions with concurrent analysis

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;

use common::{Harness, MemoryStore, MockAnalyzer, MockListing, USER};
use listbot::bot::commands::data;
use listbot::bulk::EditField;
use listbot::infra::config::Config;
use listbot::session::BulkView;

fn ready_store() -> MemoryStore {
    let store = MemoryStore::logged_in(USER);
    store.postal_codes.lock().unwrap().insert(USER, "28001".into());
    store
}

fn bulk(h: &Harness) -> BulkView {
    h.view().bulk.unwrap_or_default()
}

fn slow_harness(store: MemoryStore) -> Harness {
    Harness::with(
        store,
        MockListing::default(),
        MockAnalyzer {
            delay: Duration::from_secs(10),
        },
        Config::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_each_album_becomes_one_item() {
    let h = Harness::new(ready_store());
    h.text("/bulk").await;
    assert!(h.view().bulk.is_some());

    h.photo("a1", Some("g1")).await;
    h.photo("a2", Some("g1")).await;
    // A new album closes the previous one right away.
    h.photo("b1", Some("g2")).await;
    assert_eq!(bulk(&h).total, 1);

    assert!(h.settle(|h| bulk(h).ready == 2).await);
    assert_eq!(h.listing.created_count(), 2);
    let ids: Vec<_> = bulk(&h).drafts.iter().map(|(id, index, _)| (*id, *index)).collect();
    assert_eq!(ids, vec![(0, 0), (1, 1)]);
}

#[tokio::test(start_paused = true)]
async fn test_publish_all_finishes_the_session() {
    let h = Harness::new(ready_store());
    h.text("/bulk").await;
    h.photo("a1", None).await;
    h.photo("b1", None).await;
    assert!(h.settle(|h| bulk(h).ready == 2).await);

    let status = h
        .transport
        .message_with_button(data::BULK_PUBLISH_ALL)
        .expect("publish-all button");
    h.press(status, data::BULK_PUBLISH_ALL).await;

    assert!(h.settle(|h| h.view().bulk.is_none()).await);
    assert_eq!(h.listing.published_count(), 2);
    assert_eq!(
        h.transport.last_text().as_deref(),
        Some("All items are published. Bulk session finished.")
    );
    // Estimated from the comparable prices.
    let patches = h.listing.patches.lock().unwrap().clone();
    assert!(patches.iter().all(|p| p.price == Some(40.0)));
}

#[tokio::test(start_paused = true)]
async fn test_delete_renumbers_and_cancels_analysis() {
    let h = slow_harness(ready_store());
    h.text("/bulk").await;
    h.photo("a1", None).await;
    h.photo("b1", None).await;
    h.photo("c1", None).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(bulk(&h).total, 3);
    assert_eq!(bulk(&h).analyzing, 3);

    h.press(0, &data::bulk_delete(1)).await;
    let drafts = bulk(&h).drafts;
    assert_eq!(
        drafts,
        vec![
            (0, 0, "analyzing".to_string()),
            (2, 1, "analyzing".to_string())
        ]
    );

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(h.settle(|h| bulk(h).ready == 2).await);
    // The cancelled task stopped before creating a remote draft.
    assert_eq!(h.listing.created_count(), 2);
    assert!(h.listing.deleted_ids().is_empty());
    assert_eq!(bulk(&h).total, 2);

    // Deleting an id that is already gone does nothing.
    h.press(0, &data::bulk_delete(1)).await;
    assert_eq!(bulk(&h).total, 2);
}

#[tokio::test(start_paused = true)]
async fn test_deleting_a_finished_item_removes_its_remote_draft() {
    let h = Harness::new(ready_store());
    h.text("/bulk").await;
    h.photo("a1", None).await;
    assert!(h.settle(|h| bulk(h).ready == 1).await);

    h.press(0, &data::bulk_delete(0)).await;
    assert_eq!(bulk(&h).total, 0);
    assert!(h.settle(|h| h.listing.deleted_ids() == vec!["draft-1".to_string()]).await);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_deletes_remote_drafts() {
    let h = Harness::new(ready_store());
    h.text("/bulk").await;
    h.photo("a1", None).await;
    h.photo("b1", None).await;
    assert!(h.settle(|h| bulk(h).ready == 2).await);

    h.text("/cancel").await;
    assert!(h.view().bulk.is_none());
    assert!(h.settle(|h| h.listing.deleted_ids().len() == 2).await);
    assert_eq!(h.listing.published_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_analysing_leaves_nothing_behind() {
    let h = slow_harness(ready_store());
    h.text("/bulk").await;
    h.photo("a1", None).await;
    h.photo("b1", None).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    h.text("/cancel").await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.listing.created_count(), 0);
    assert!(h.view().bulk.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_zero_price_edit_makes_a_giveaway() {
    let h = Harness::new(ready_store());
    h.text("/bulk").await;
    h.photo("a1", None).await;
    assert!(h.settle(|h| bulk(h).ready == 1).await);

    h.press(0, &data::bulk_edit(0, EditField::Price)).await;
    assert_eq!(
        h.transport.last_text().as_deref(),
        Some("Send the price for #1 (0 to give it away)")
    );
    h.text("lots").await;
    h.text("0").await;
    assert!(h.settle(|h| h.transport.texts().iter().any(|t| t.contains("free"))).await);
    assert_eq!(bulk(&h).ready, 1);

    let status = h.transport.message_with_button(data::BULK_PUBLISH_ALL).unwrap();
    h.press(status, data::BULK_PUBLISH_ALL).await;
    assert!(h.settle(|h| h.listing.published_count() == 1).await);
    let patch = h.listing.patches.lock().unwrap().last().cloned().unwrap();
    assert_eq!(patch.giveaway, Some(true));
    assert_eq!(patch.price, Some(0.0));
}

#[tokio::test(start_paused = true)]
async fn test_publish_needs_a_postal_code() {
    let h = Harness::new(MemoryStore::logged_in(USER));
    h.text("/bulk").await;
    h.photo("a1", None).await;
    assert!(h.settle(|h| bulk(h).ready == 1).await);

    h.press(0, data::BULK_PUBLISH_ALL).await;
    assert!(h.transport.last_text().unwrap().contains("/postal"));
    assert_eq!(h.listing.published_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_item_limit_is_enforced() {
    let mut config = Config::default();
    config.bulk.max_drafts = 1;
    let h = Harness::with(ready_store(), MockListing::default(), MockAnalyzer::default(), config);
    h.text("/bulk").await;
    h.photo("a1", None).await;
    h.photo("b1", None).await;
    assert!(h.settle(|h| h.transport.texts().iter().any(|t| t.contains("at most 1"))).await);
    assert_eq!(bulk(&h).total, 1);
}

#[tokio::test(start_paused = true)]
async fn test_bulk_refused_during_single_flow() {
    let h = Harness::new(ready_store());
    h.photo("p1", None).await;
    assert!(h.settle(|h| h.flow_state().is_some()).await);
    h.text("/bulk").await;
    assert!(h.view().bulk.is_none());
    assert!(h.transport.last_text().unwrap().contains("before starting a bulk session"));
}
