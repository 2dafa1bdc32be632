mod common;

use common::{harness, recipient, ACTOR, MAX_RETRIES};

use comms_backend::dto::broadcast_dto::CreateBroadcastPayload;
use comms_backend::models::broadcast::{
    AudienceFilter, BroadcastKind, BroadcastStatus, ChannelPlan,
};
use comms_backend::models::message::{exclusion, MessageStatus};
use comms_backend::models::notification::NotificationPreferences;

fn in_app_payload(kind: BroadcastKind) -> CreateBroadcastPayload {
    CreateBroadcastPayload {
        title: "Campagne de test".to_string(),
        kind,
        description: Some("Bienvenue sur la plateforme".to_string()),
        audience: AudienceFilter::default(),
        channels: vec![ChannelPlan::InApp {
            subject: Some("Bonjour {{prenom}}".to_string()),
            body: "Bonjour {{prenom}} {{nom}}, {{message}}".to_string(),
            template_id: None,
        }],
    }
}

#[tokio::test]
async fn fan_out_with_preference_exclusion() {
    let h = harness();
    let a = recipient("Aminata", "Diallo");
    let b = recipient("Boubacar", "Bah");
    let c = recipient("Cellou", "Barry");
    h.memory.add_recipient(a.clone());
    h.memory.add_recipient(b.clone());
    h.memory.add_recipient(c.clone());

    // c has opted out of promotional broadcasts.
    let mut prefs = NotificationPreferences::default_for(c.id);
    prefs.promotions = false;
    h.state.stores.preferences.upsert(&prefs).await.unwrap();

    let broadcast = h
        .state
        .broadcasts
        .create(ACTOR, in_app_payload(BroadcastKind::Promotion))
        .await
        .unwrap();
    assert_eq!(broadcast.estimated_audience, 3);

    h.state
        .broadcasts
        .begin_sending(ACTOR, broadcast.id)
        .await
        .unwrap();
    let summary = h.state.dispatch.run(broadcast.id, ACTOR).await.unwrap();
    assert_eq!(summary.sent, 2);
    assert_eq!(summary.excluded, 1);
    assert_eq!(summary.failed, 0);

    let updated = h.state.broadcasts.get(broadcast.id).await.unwrap();
    assert_eq!(updated.status, BroadcastStatus::Completed);
    assert_eq!(updated.total_recipients, 3);
    assert_eq!(updated.total_sent, 2);
    assert_eq!(updated.total_excluded, 1);
    assert_eq!(updated.total_failed, 0);
    assert!(updated.completed_at.is_some());

    let messages = h
        .state
        .stores
        .messages
        .list_for_broadcast(broadcast.id, None, None)
        .await
        .unwrap();
    assert_eq!(messages.len(), 3);
    let excluded: Vec<_> = messages
        .iter()
        .filter(|m| m.status == MessageStatus::Excluded)
        .collect();
    assert_eq!(excluded.len(), 1);
    assert_eq!(excluded[0].recipient_id, c.id);
    assert_eq!(
        excluded[0].exclusion_reason.as_deref(),
        Some(exclusion::PREFERENCE_DISABLED)
    );

    // The two delivered recipients got rendered in-app notifications.
    let inbox_a = h.state.inbox.list(a.id, 10).await.unwrap();
    assert_eq!(inbox_a.len(), 1);
    assert_eq!(inbox_a[0].title, "Bonjour Aminata");
    assert_eq!(
        inbox_a[0].message,
        "Bonjour Aminata Diallo, Bienvenue sur la plateforme"
    );
    assert!(h.state.inbox.list(c.id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_contact_is_excluded_not_failed() {
    let h = harness();
    let mut no_email = recipient("Fatou", "Sow");
    no_email.email = None;
    let with_email = recipient("Ibrahima", "Sylla");
    h.memory.add_recipient(no_email.clone());
    h.memory.add_recipient(with_email.clone());

    let payload = CreateBroadcastPayload {
        title: "Mise à jour".to_string(),
        kind: BroadcastKind::SystemInfo,
        description: None,
        audience: AudienceFilter::default(),
        channels: vec![ChannelPlan::Email {
            subject: "Information".to_string(),
            body: "Bonjour {{prenom}}, votre profil évolue.".to_string(),
            template_id: None,
        }],
    };
    let broadcast = h.state.broadcasts.create(ACTOR, payload).await.unwrap();
    h.state
        .broadcasts
        .begin_sending(ACTOR, broadcast.id)
        .await
        .unwrap();
    let summary = h.state.dispatch.run(broadcast.id, ACTOR).await.unwrap();
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.excluded, 1);

    let excluded = h
        .state
        .stores
        .messages
        .list_for_broadcast(broadcast.id, Some(MessageStatus::Excluded), None)
        .await
        .unwrap();
    assert_eq!(excluded.len(), 1);
    assert_eq!(excluded[0].recipient_id, no_email.id);
    assert_eq!(
        excluded[0].exclusion_reason.as_deref(),
        Some(exclusion::MISSING_CONTACT)
    );
    assert_eq!(h.email.delivered(), 1);
}

#[tokio::test]
async fn one_recipients_failure_never_blocks_the_rest() {
    let h = harness();
    let ok1 = recipient("Mariam", "Conde");
    let doomed = recipient("Sekou", "Toure");
    let ok2 = recipient("Ousmane", "Camara");
    h.memory.add_recipient(ok1.clone());
    h.memory.add_recipient(doomed.clone());
    h.memory.add_recipient(ok2.clone());
    h.email.fail_for(doomed.id);

    let payload = CreateBroadcastPayload {
        title: "Maintenance".to_string(),
        kind: BroadcastKind::MaintenanceAlert,
        description: None,
        audience: AudienceFilter::default(),
        channels: vec![ChannelPlan::Email {
            subject: "Maintenance prévue".to_string(),
            body: "Le service sera interrompu dimanche.".to_string(),
            template_id: None,
        }],
    };
    let broadcast = h.state.broadcasts.create(ACTOR, payload).await.unwrap();
    h.state
        .broadcasts
        .begin_sending(ACTOR, broadcast.id)
        .await
        .unwrap();
    let summary = h.state.dispatch.run(broadcast.id, ACTOR).await.unwrap();
    assert_eq!(summary.sent, 2);
    assert_eq!(summary.failed, 1);

    let updated = h.state.broadcasts.get(broadcast.id).await.unwrap();
    // Individual failures never fail the broadcast itself.
    assert_eq!(updated.status, BroadcastStatus::Completed);
    assert_eq!(
        updated.total_sent + updated.total_failed + updated.total_excluded,
        updated.total_recipients
    );

    let failed = h
        .state
        .stores
        .messages
        .list_for_broadcast(broadcast.id, Some(MessageStatus::Failed), None)
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].recipient_id, doomed.id);
    // One initial attempt plus the configured retries, all recorded.
    assert_eq!(failed[0].retry_count, (MAX_RETRIES + 1) as i32);
    assert!(failed[0].error_message.is_some());
}

#[tokio::test]
async fn transient_failures_are_retried_to_success() {
    let h = harness();
    let r = recipient("Hawa", "Keita");
    h.memory.add_recipient(r.clone());
    h.email.fail_next(2);

    let payload = CreateBroadcastPayload {
        title: "Relance".to_string(),
        kind: BroadcastKind::SystemInfo,
        description: None,
        audience: AudienceFilter::default(),
        channels: vec![ChannelPlan::Email {
            subject: "Relance".to_string(),
            body: "Une information importante vous attend.".to_string(),
            template_id: None,
        }],
    };
    let broadcast = h.state.broadcasts.create(ACTOR, payload).await.unwrap();
    h.state
        .broadcasts
        .begin_sending(ACTOR, broadcast.id)
        .await
        .unwrap();
    let summary = h.state.dispatch.run(broadcast.id, ACTOR).await.unwrap();
    assert_eq!(summary.sent, 1);

    let sent = h
        .state
        .stores
        .messages
        .list_for_broadcast(broadcast.id, Some(MessageStatus::Sent), None)
        .await
        .unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].retry_count, 2);
    assert!(sent[0].sent_at.is_some());
}

#[tokio::test]
async fn redispatch_creates_no_duplicate_messages() {
    let h = harness();
    for i in 0..5 {
        h.memory
            .add_recipient(recipient(&format!("User{}", i), "Test"));
    }

    let broadcast = h
        .state
        .broadcasts
        .create(ACTOR, in_app_payload(BroadcastKind::SystemInfo))
        .await
        .unwrap();
    h.state
        .broadcasts
        .begin_sending(ACTOR, broadcast.id)
        .await
        .unwrap();
    h.state.dispatch.run(broadcast.id, ACTOR).await.unwrap();

    let first = h
        .state
        .stores
        .messages
        .list_for_broadcast(broadcast.id, None, None)
        .await
        .unwrap();
    assert_eq!(first.len(), 5);
    let counters_before = h.state.broadcasts.get(broadcast.id).await.unwrap();

    // Repair pass over the completed broadcast: nothing new, nothing
    // recounted.
    let summary = h.state.dispatch.run(broadcast.id, ACTOR).await.unwrap();
    assert_eq!(summary.sent, 0);
    assert_eq!(summary.skipped, 5);

    let second = h
        .state
        .stores
        .messages
        .list_for_broadcast(broadcast.id, None, None)
        .await
        .unwrap();
    assert_eq!(second.len(), 5);
    let counters_after = h.state.broadcasts.get(broadcast.id).await.unwrap();
    assert_eq!(counters_after.total_sent, counters_before.total_sent);
    assert_eq!(counters_after.status, BroadcastStatus::Completed);
}

#[tokio::test]
async fn multi_channel_recipient_counts_once() {
    let h = harness();
    let r = recipient("Nene", "Balde");
    h.memory.add_recipient(r.clone());

    let payload = CreateBroadcastPayload {
        title: "Double canal".to_string(),
        kind: BroadcastKind::ImportantNotice,
        description: Some("Lisez ceci".to_string()),
        audience: AudienceFilter::default(),
        channels: vec![
            ChannelPlan::InApp {
                subject: None,
                body: "{{message}}".to_string(),
                template_id: None,
            },
            ChannelPlan::Sms {
                body: "{{message}}".to_string(),
                template_id: None,
            },
        ],
    };
    let broadcast = h.state.broadcasts.create(ACTOR, payload).await.unwrap();
    h.state
        .broadcasts
        .begin_sending(ACTOR, broadcast.id)
        .await
        .unwrap();
    h.state.dispatch.run(broadcast.id, ACTOR).await.unwrap();

    let updated = h.state.broadcasts.get(broadcast.id).await.unwrap();
    // Two messages, one recipient: the counters track recipients.
    assert_eq!(updated.total_recipients, 1);
    assert_eq!(updated.total_sent, 1);
    let messages = h
        .state
        .stores
        .messages
        .list_for_broadcast(broadcast.id, None, None)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.status == MessageStatus::Sent));
    assert_eq!(h.sms.delivered(), 1);
}

#[tokio::test]
async fn dispatch_rejects_non_sending_broadcast() {
    let h = harness();
    h.memory.add_recipient(recipient("Aissatou", "Diaby"));
    let broadcast = h
        .state
        .broadcasts
        .create(ACTOR, in_app_payload(BroadcastKind::SystemInfo))
        .await
        .unwrap();

    let err = h.state.dispatch.run(broadcast.id, ACTOR).await.unwrap_err();
    assert!(matches!(err, comms_backend::error::Error::Conflict(_)));
    assert!(h
        .state
        .stores
        .messages
        .list_for_broadcast(broadcast.id, None, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn email_channel_respects_email_gate() {
    let h = harness();
    let r = recipient("Mamadou", "Barry");
    h.memory.add_recipient(r.clone());
    let mut prefs = NotificationPreferences::default_for(r.id);
    prefs.email_enabled = false;
    h.state.stores.preferences.upsert(&prefs).await.unwrap();

    let payload = CreateBroadcastPayload {
        title: "Newsletter".to_string(),
        kind: BroadcastKind::SystemInfo,
        description: None,
        audience: AudienceFilter::default(),
        channels: vec![ChannelPlan::Email {
            subject: "Actualités".to_string(),
            body: "Les nouveautés de la semaine.".to_string(),
            template_id: None,
        }],
    };
    let broadcast = h.state.broadcasts.create(ACTOR, payload).await.unwrap();
    h.state
        .broadcasts
        .begin_sending(ACTOR, broadcast.id)
        .await
        .unwrap();
    let summary = h.state.dispatch.run(broadcast.id, ACTOR).await.unwrap();
    assert_eq!(summary.excluded, 1);
    assert_eq!(h.email.delivered(), 0);
}
