mod common;

use std::time::Duration;

use common::{harness, recipient};
use serde_json::json;
use tokio::time::timeout;

use comms_backend::dto::inbox_dto::PreferencesUpdate;
use comms_backend::models::broadcast::ChannelKind;
use comms_backend::models::notification::EventKind;
use comms_backend::realtime::ChangeKind;
use comms_backend::services::notify_service::EventDispatch;
use comms_backend::services::template_service::TemplateVars;

async fn notify(h: &common::Harness, recipient_id: uuid::Uuid, title_hint: &str) {
    let mut dispatch = EventDispatch::new(recipient_id, EventKind::MessageReceived);
    dispatch.vars = TemplateVars::new()
        .with("job_title", title_hint)
        .with("company_name", "Société Test");
    dispatch.channels = Some(vec![ChannelKind::InApp]);
    dispatch.metadata = json!({});
    h.state.notify.send(dispatch).await.unwrap();
}

#[tokio::test]
async fn feed_receives_new_notifications_live() {
    let h = harness();
    let user = recipient("Aminata", "Diallo");
    h.memory.add_recipient(user.clone());

    let mut feed = h.state.inbox.open_feed(user.id).await.unwrap();
    assert_eq!(feed.unread_count(), 0);
    assert!(feed.notifications().is_empty());

    notify(&h, user.id, "Comptable").await;

    let event = timeout(Duration::from_secs(1), feed.next_event())
        .await
        .expect("feed event should arrive")
        .expect("stream open");
    assert_eq!(event.kind, ChangeKind::Created);
    assert_eq!(feed.unread_count(), 1);
    assert_eq!(feed.notifications().len(), 1);
    assert!(!feed.notifications()[0].read);
}

#[tokio::test]
async fn feed_is_scoped_to_its_recipient() {
    let h = harness();
    let mine = recipient("Boubacar", "Bah");
    let other = recipient("Cellou", "Barry");
    h.memory.add_recipient(mine.clone());
    h.memory.add_recipient(other.clone());

    let mut feed = h.state.inbox.open_feed(mine.id).await.unwrap();
    notify(&h, other.id, "Magasinier").await;
    notify(&h, mine.id, "Caissier").await;

    let event = timeout(Duration::from_secs(1), feed.next_event())
        .await
        .unwrap()
        .unwrap();
    // The other recipient's notification never surfaces here.
    assert_eq!(event.notification.recipient_id, mine.id);
    assert_eq!(feed.notifications().len(), 1);
}

#[tokio::test]
async fn optimistic_mark_read_survives_its_own_echo() {
    let h = harness();
    let user = recipient("Fatou", "Sow");
    h.memory.add_recipient(user.clone());

    let mut feed = h.state.inbox.open_feed(user.id).await.unwrap();
    notify(&h, user.id, "Vendeuse").await;
    timeout(Duration::from_secs(1), feed.next_event())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(feed.unread_count(), 1);

    let id = feed.notifications()[0].id;
    feed.mark_read(id).await.unwrap();
    assert_eq!(feed.unread_count(), 0);
    assert!(feed.notifications()[0].read);

    // The persisted update comes back over the feed; the counter must not
    // dip below zero.
    let echo = timeout(Duration::from_secs(1), feed.next_event())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echo.kind, ChangeKind::Updated);
    assert_eq!(feed.unread_count(), 0);

    // Marking an already-read item is a no-op.
    feed.mark_read(id).await.unwrap();
    assert_eq!(feed.unread_count(), 0);
    assert_eq!(h.state.inbox.unread_count(user.id).await.unwrap(), 0);
}

#[tokio::test]
async fn mark_all_read_resets_the_counter() {
    let h = harness();
    let user = recipient("Ibrahima", "Sylla");
    h.memory.add_recipient(user.clone());

    for i in 0..4 {
        notify(&h, user.id, &format!("Poste {}", i)).await;
    }
    let mut feed = h.state.inbox.open_feed(user.id).await.unwrap();
    assert_eq!(feed.unread_count(), 4);

    feed.mark_all_read().await.unwrap();
    assert_eq!(feed.unread_count(), 0);
    assert!(feed.notifications().iter().all(|n| n.read));
    assert_eq!(h.state.inbox.unread_count(user.id).await.unwrap(), 0);
}

#[tokio::test]
async fn delete_decrements_only_for_unread_items() {
    let h = harness();
    let user = recipient("Mariam", "Conde");
    h.memory.add_recipient(user.clone());

    notify(&h, user.id, "Poste A").await;
    notify(&h, user.id, "Poste B").await;
    let mut feed = h.state.inbox.open_feed(user.id).await.unwrap();
    assert_eq!(feed.unread_count(), 2);

    let first = feed.notifications()[0].id;
    let second = feed.notifications()[1].id;

    feed.mark_read(first).await.unwrap();
    assert_eq!(feed.unread_count(), 1);

    // Deleting a read item leaves the counter alone.
    feed.delete(first).await.unwrap();
    assert_eq!(feed.unread_count(), 1);
    assert_eq!(feed.notifications().len(), 1);

    // Deleting an unread item decrements.
    feed.delete(second).await.unwrap();
    assert_eq!(feed.unread_count(), 0);
    assert!(feed.notifications().is_empty());
    assert_eq!(h.state.inbox.unread_count(user.id).await.unwrap(), 0);
}

#[tokio::test]
async fn cache_is_capped_at_the_window() {
    let h = harness();
    let user = recipient("Sekou", "Toure");
    h.memory.add_recipient(user.clone());

    let mut feed = h.state.inbox.open_feed(user.id).await.unwrap();
    for i in 0..55 {
        notify(&h, user.id, &format!("Poste {}", i)).await;
    }
    for _ in 0..55 {
        timeout(Duration::from_secs(1), feed.next_event())
            .await
            .unwrap()
            .unwrap();
    }
    assert_eq!(feed.notifications().len(), 50);
    // The counter still reflects everything unread, cached or not.
    assert_eq!(feed.unread_count(), 55);
}

#[tokio::test]
async fn preferences_are_created_lazily_with_defaults() {
    let h = harness();
    let user = recipient("Hawa", "Keita");
    h.memory.add_recipient(user.clone());

    let prefs = h.state.inbox.preferences(user.id).await.unwrap();
    assert!(prefs.email_enabled);
    assert!(prefs.promotions);
    assert!(prefs.announcements);

    let updated = h
        .state
        .inbox
        .update_preferences(
            user.id,
            PreferencesUpdate {
                promotions: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!updated.promotions);
    assert!(updated.email_enabled);

    let reloaded = h.state.inbox.preferences(user.id).await.unwrap();
    assert!(!reloaded.promotions);
}

#[tokio::test]
async fn another_sessions_update_reaches_the_feed() {
    let h = harness();
    let user = recipient("Nene", "Balde");
    h.memory.add_recipient(user.clone());

    notify(&h, user.id, "Poste X").await;
    let mut feed = h.state.inbox.open_feed(user.id).await.unwrap();
    assert_eq!(feed.unread_count(), 1);
    let id = feed.notifications()[0].id;

    // A different session (service-level call) marks it read.
    h.state.inbox.mark_read(user.id, id).await.unwrap();

    let event = timeout(Duration::from_secs(1), feed.next_event())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.kind, ChangeKind::Updated);
    assert!(event.notification.read);
    assert_eq!(feed.unread_count(), 0);
    assert!(feed.notifications()[0].read);
}
