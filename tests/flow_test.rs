// tests/flow_test.rs — Integration test: single-listing flow through the registry

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;

use common::{Harness, MemoryStore, MockAnalyzer, MockListing, USER};
use listbot::bot::commands::data;
use listbot::infra::config::Config;
use listbot::integrations::types::{InboundMessage, Update};

async fn draft_awaiting_category(h: &Harness) {
    h.photo("photo-a", None).await;
    assert_eq!(h.flow_state(), None);
    assert!(
        h.settle(|h| h.flow_state().as_deref() == Some("awaiting_category"))
            .await,
        "draft never reached awaiting_category"
    );
}

#[tokio::test(start_paused = true)]
async fn test_photo_to_shipping_question() {
    let h = Harness::new(MemoryStore::logged_in(USER));
    draft_awaiting_category(&h).await;
    assert_eq!(h.listing.created_count(), 1);

    let prompt = h
        .transport
        .message_with_button(&data::category("chairs"))
        .expect("category keyboard");
    h.press(prompt, &data::category("chairs")).await;
    assert_eq!(h.flow_state().as_deref(), Some("awaiting_price"));

    h.text("50€").await;
    assert_eq!(h.flow_state().as_deref(), Some("awaiting_shipping"));

    h.text("maybe").await;
    assert_eq!(h.flow_state().as_deref(), Some("awaiting_shipping"));

    h.text("no").await;
    // No default postal code stored yet.
    assert_eq!(h.flow_state().as_deref(), Some("awaiting_postal_code"));

    h.text("28001").await;
    assert_eq!(h.flow_state().as_deref(), Some("ready_to_publish"));
    assert_eq!(
        h.store.postal_codes.lock().unwrap().get(&USER).map(String::as_str),
        Some("28001")
    );
}

#[tokio::test(start_paused = true)]
async fn test_publish_from_confirmation() {
    let store = MemoryStore::logged_in(USER);
    store.postal_codes.lock().unwrap().insert(USER, "08001".into());
    let h = Harness::new(store);
    draft_awaiting_category(&h).await;

    let prompt = h.transport.message_with_button(&data::category("chairs")).unwrap();
    h.press(prompt, &data::category("chairs")).await;
    h.text("0").await;
    h.text("yes").await;
    assert_eq!(h.flow_state().as_deref(), Some("ready_to_publish"));

    let confirmation = h.transport.message_with_button(data::CONFIRM).unwrap();
    // A button on some other message is stale.
    h.press(confirmation + 100, data::CONFIRM).await;
    assert_eq!(h.listing.published_count(), 0);

    h.press(confirmation, data::CONFIRM).await;
    assert!(h.settle(|h| h.flow_state().is_none()).await);
    assert_eq!(h.listing.published_count(), 1);
    let patch = h.listing.patches.lock().unwrap().last().cloned().unwrap();
    assert_eq!(patch.price, Some(0.0));
    assert_eq!(patch.giveaway, Some(true));
    assert!(h.transport.texts().iter().any(|t| t.contains("Published")));
}

#[tokio::test(start_paused = true)]
async fn test_version_conflict_keeps_draft() {
    let store = MemoryStore::logged_in(USER);
    store.postal_codes.lock().unwrap().insert(USER, "08001".into());
    let h = Harness::new(store);
    *h.listing.conflict_on_publish.lock().unwrap() = true;
    draft_awaiting_category(&h).await;

    let prompt = h.transport.message_with_button(&data::category("chairs")).unwrap();
    h.press(prompt, &data::category("chairs")).await;
    h.text("25").await;
    h.text("no").await;
    let confirmation = h.transport.message_with_button(data::CONFIRM).unwrap();
    h.press(confirmation, data::CONFIRM).await;

    assert!(
        h.settle(|h| h.transport.texts().iter().any(|t| t.contains("changed elsewhere")))
            .await
    );
    assert_eq!(h.flow_state().as_deref(), Some("ready_to_publish"));
    assert_eq!(h.listing.published_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_required_attribute_is_asked() {
    let h = Harness::new(MemoryStore::logged_in(USER));
    draft_awaiting_category(&h).await;

    let prompt = h.transport.message_with_button(&data::category("phones")).unwrap();
    h.press(prompt, &data::category("phones")).await;
    assert_eq!(h.flow_state().as_deref(), Some("awaiting_attribute"));

    let buttons = h
        .transport
        .message_with_button(&data::attribute("condition", "used"))
        .unwrap();
    h.press(buttons, &data::attribute("condition", "used")).await;
    assert_eq!(h.flow_state().as_deref(), Some("awaiting_price"));
}

#[tokio::test(start_paused = true)]
async fn test_album_photos_make_one_draft() {
    let h = Harness::new(MemoryStore::logged_in(USER));
    h.photo("p1", Some("album-1")).await;
    h.photo("p2", Some("album-1")).await;
    h.photo("p3", Some("album-1")).await;
    assert!(h.settle(|h| h.flow_state().is_some()).await);
    assert_eq!(h.listing.created_count(), 1);
    assert!(h
        .transport
        .texts()
        .iter()
        .any(|t| t.contains("Analysing 3 photo(s)")));
}

#[tokio::test(start_paused = true)]
async fn test_bulk_refused_while_album_is_buffered() {
    let h = Harness::new(MemoryStore::logged_in(USER));
    h.photo("photo-a", None).await;
    h.text("/bulk").await;
    assert!(h.view().bulk.is_none());
    assert!(h
        .transport
        .last_text()
        .unwrap()
        .contains("before starting a bulk session"));

    assert!(
        h.settle(|h| h.flow_state().as_deref() == Some("awaiting_category"))
            .await
    );
    assert!(h.view().bulk.is_none());
    assert_eq!(h.listing.created_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_upload_removes_the_remote_draft() {
    let listing = MockListing::default();
    *listing.reject_uploads.lock().unwrap() = true;
    let h = Harness::with(
        MemoryStore::logged_in(USER),
        listing,
        MockAnalyzer::default(),
        Config::default(),
    );
    h.photo("photo-a", None).await;
    assert!(h.settle(|h| h.listing.deleted_ids() == vec!["draft-1".to_string()]).await);
    assert!(
        h.settle(|h| h.transport.texts().iter().any(|t| t.contains("couldn't create")))
            .await
    );
    assert_eq!(h.flow_state(), None);

    // The failed attempt does not block the next one.
    *h.listing.reject_uploads.lock().unwrap() = false;
    h.photo("photo-b", None).await;
    assert!(h.settle(|h| h.flow_state().is_some()).await);
    assert_eq!(h.listing.created_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_draft_expires_after_inactivity() {
    let mut config = Config::default();
    config.timers.draft_expiry_secs = 5;
    let h = Harness::with(
        MemoryStore::logged_in(USER),
        MockListing::default(),
        MockAnalyzer::default(),
        config,
    );
    draft_awaiting_category(&h).await;

    // Activity re-arms the timer; the earlier generation becomes stale.
    tokio::time::sleep(Duration::from_secs(3)).await;
    let prompt = h.transport.message_with_button(&data::category("chairs")).unwrap();
    h.press(prompt, &data::category("chairs")).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.flow_state().as_deref(), Some("awaiting_price"));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(h.settle(|h| h.flow_state().is_none()).await);
    assert!(h.settle(|h| h.listing.deleted_ids() == vec!["draft-1".to_string()]).await);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_discards_remote_draft() {
    let h = Harness::new(MemoryStore::logged_in(USER));
    draft_awaiting_category(&h).await;
    h.text("/cancel").await;
    assert_eq!(h.flow_state(), None);
    assert!(h.settle(|h| !h.listing.deleted_ids().is_empty()).await);
    assert_eq!(h.transport.last_text().as_deref(), Some("Cancelled."));
}

#[tokio::test(start_paused = true)]
async fn test_photos_require_login() {
    let h = Harness::new(MemoryStore::default());
    h.photo("p1", None).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.listing.created_count(), 0);
    assert!(h.transport.last_text().unwrap().contains("/login"));
}

#[tokio::test(start_paused = true)]
async fn test_login_with_sms_step() {
    let h = Harness::new(MemoryStore::default());
    h.text("/login").await;
    assert_eq!(h.view().login_state, "awaiting_email");

    h.text("not-an-email").await;
    assert_eq!(h.view().login_state, "awaiting_email");

    h.text("Me@Example.com").await;
    assert_eq!(h.view().login_state, "awaiting_email_code");
    assert_eq!(*h.auth.codes_requested.lock().unwrap(), vec!["me@example.com".to_string()]);

    h.text("999999").await;
    assert_eq!(h.view().login_state, "awaiting_email_code");

    h.text("222222").await;
    assert_eq!(h.view().login_state, "awaiting_sms_code");

    h.text("333333").await;
    let view = h.view();
    assert_eq!(view.login_state, "none");
    assert!(view.logged_in);
    assert!(h.store.credentials.lock().unwrap().contains_key(&USER));

    h.text("/logout").await;
    assert!(!h.view().logged_in);
    assert!(!h.store.credentials.lock().unwrap().contains_key(&USER));
}

#[tokio::test(start_paused = true)]
async fn test_login_times_out() {
    let h = Harness::new(MemoryStore::default());
    h.text("/login").await;
    tokio::time::sleep(Duration::from_secs(901)).await;
    assert!(h.settle(|h| h.view().login_state == "none").await);
    assert!(h.transport.last_text().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_unlisted_user_gets_no_session() {
    let store = MemoryStore {
        allowed: vec![7],
        ..MemoryStore::default()
    };
    let h = Harness::new(store);
    let accepted = h
        .registry
        .dispatch(Update::Message(InboundMessage::text(USER, USER, 1, "/start")))
        .await
        .unwrap();
    assert!(!accepted);
    assert!(h.registry.is_empty());
    assert!(h.transport.texts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_listings_are_paged_and_cached() {
    let h = Harness::new(MemoryStore::logged_in(USER));
    h.text("/listings").await;
    let first = h.transport.last_text().unwrap();
    assert!(first.contains("Listing 1"));

    let page_msg = h.transport.message_with_button(&data::page(1)).unwrap();
    h.press(page_msg, &data::page(1)).await;
    let second = h.transport.last_text().unwrap();
    assert!(second.contains("Listing 3"));
    assert!(!second.contains("Listing 1"));
}

#[tokio::test(start_paused = true)]
async fn test_template_and_postal_commands() {
    let h = Harness::new(MemoryStore::default());
    h.text("/template Pickup in Madrid").await;
    assert_eq!(
        h.store.templates.lock().unwrap().get(&USER).map(String::as_str),
        Some("Pickup in Madrid")
    );
    h.text("/template off").await;
    assert!(h.store.templates.lock().unwrap().is_empty());

    h.text("/postal 123").await;
    assert!(h.store.postal_codes.lock().unwrap().is_empty());
    h.text("/postal 46001").await;
    assert_eq!(
        h.store.postal_codes.lock().unwrap().get(&USER).map(String::as_str),
        Some("46001")
    );
}
