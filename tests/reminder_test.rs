mod common;

use chrono::{Duration, Utc};
use common::{harness, harness_without_adapters, interview, recipient};

use comms_backend::models::interview::Modality;
use comms_backend::models::reminder::{ReminderKind, ReminderStatus};

#[tokio::test]
async fn scheduling_creates_both_firing_times() {
    let h = harness();
    let candidate = recipient("Aminata", "Diallo");
    h.memory.add_recipient(candidate.clone());

    let at = Utc::now() + Duration::hours(48);
    let snapshot = interview(candidate.id, at, Modality::Visio);
    let reminders = h
        .state
        .reminders
        .schedule_for_interview(&snapshot)
        .await
        .unwrap();

    assert_eq!(reminders.len(), 2);
    let day_before = reminders
        .iter()
        .find(|r| r.kind == ReminderKind::DayBefore)
        .unwrap();
    let two_hours = reminders
        .iter()
        .find(|r| r.kind == ReminderKind::TwoHours)
        .unwrap();
    assert_eq!(day_before.scheduled_for, at - Duration::hours(24));
    assert_eq!(two_hours.scheduled_for, at - Duration::hours(2));
    assert!(reminders.iter().all(|r| r.status == ReminderStatus::Pending));
}

#[tokio::test]
async fn rescheduling_replaces_pending_instead_of_duplicating() {
    let h = harness();
    let candidate = recipient("Boubacar", "Bah");
    h.memory.add_recipient(candidate.clone());

    let mut snapshot = interview(candidate.id, Utc::now() + Duration::hours(30), Modality::Visio);
    h.state
        .reminders
        .schedule_for_interview(&snapshot)
        .await
        .unwrap();

    // The interview moves; firing times must move with it, without leaving
    // stale pending rows behind.
    let new_at = Utc::now() + Duration::hours(72);
    snapshot.scheduled_at = new_at;
    h.state
        .reminders
        .schedule_for_interview(&snapshot)
        .await
        .unwrap();

    let all = h
        .state
        .stores
        .reminders
        .list_for_interview(snapshot.id)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    for kind in ReminderKind::ALL {
        let of_kind: Vec<_> = all.iter().filter(|r| r.kind == kind).collect();
        assert_eq!(of_kind.len(), 1);
        assert_eq!(of_kind[0].status, ReminderStatus::Pending);
        assert_eq!(of_kind[0].scheduled_for, new_at - kind.lead_time());
    }
}

#[tokio::test]
async fn sweep_sends_only_what_is_due() {
    let h = harness();
    let candidate = recipient("Cellou", "Barry");
    h.memory.add_recipient(candidate.clone());

    // Interview at T = now + 25h: the 24h reminder is due at now + 1h, the
    // 2h reminder at now + 23h.
    let now = Utc::now();
    let snapshot = interview(candidate.id, now + Duration::hours(25), Modality::Visio);
    h.state
        .reminders
        .schedule_for_interview(&snapshot)
        .await
        .unwrap();

    // Nothing due yet.
    let early = h.state.reminders.sweep(now, 100).await.unwrap();
    assert_eq!(early.claimed, 0);

    // Sweep at T - 23h: exactly the 24h reminder fires.
    let summary = h
        .state
        .reminders
        .sweep(now + Duration::hours(2), 100)
        .await
        .unwrap();
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.failed, 0);

    let all = h
        .state
        .stores
        .reminders
        .list_for_interview(snapshot.id)
        .await
        .unwrap();
    let day_before = all.iter().find(|r| r.kind == ReminderKind::DayBefore).unwrap();
    let two_hours = all.iter().find(|r| r.kind == ReminderKind::TwoHours).unwrap();
    assert_eq!(day_before.status, ReminderStatus::Sent);
    assert!(day_before.sent_at.is_some());
    assert_eq!(two_hours.status, ReminderStatus::Pending);

    // The candidate got the rendered reminder in their inbox.
    let inbox = h.state.inbox.list(candidate.id, 10).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert!(inbox[0].title.contains("demain"));
    assert!(inbox[0].message.contains("Développeur Backend"));
    // Visio interview: the video block renders, the location block does not.
    assert!(inbox[0].message.contains("https://meet.example.com/abc"));
    assert!(!inbox[0].message.contains("Lieu :"));
}

#[tokio::test]
async fn overlapping_sweeps_never_double_send() {
    let h = harness();
    let candidate = recipient("Fatou", "Sow");
    h.memory.add_recipient(candidate.clone());

    let now = Utc::now();
    let snapshot = interview(candidate.id, now + Duration::hours(1), Modality::Telephone);
    h.state
        .reminders
        .schedule_for_interview(&snapshot)
        .await
        .unwrap();

    // Both reminders are already due (the 24h one long overdue). Two sweeps
    // race; claims must not overlap.
    let sweep_at = now + Duration::minutes(30);
    let (a, b) = tokio::join!(
        h.state.reminders.sweep(sweep_at, 100),
        h.state.reminders.sweep(sweep_at, 100)
    );
    let total_claimed = a.unwrap().claimed + b.unwrap().claimed;
    assert_eq!(total_claimed, 2);

    // Each reminder produced exactly one in-app notification.
    let inbox = h.state.inbox.list(candidate.id, 10).await.unwrap();
    assert_eq!(inbox.len(), 2);
}

#[tokio::test]
async fn long_overdue_reminders_still_fire_once() {
    let h = harness();
    let candidate = recipient("Ibrahima", "Sylla");
    h.memory.add_recipient(candidate.clone());

    // The sweep was down for days; the interview is in one hour.
    let now = Utc::now();
    let snapshot = interview(candidate.id, now + Duration::hours(1), Modality::Presentiel);
    h.state
        .reminders
        .schedule_for_interview(&snapshot)
        .await
        .unwrap();

    let summary = h.state.reminders.sweep(now, 100).await.unwrap();
    assert_eq!(summary.claimed, 2);
    assert_eq!(summary.sent, 2);

    let again = h.state.reminders.sweep(now, 100).await.unwrap();
    assert_eq!(again.claimed, 0);
}

#[tokio::test]
async fn failed_delivery_marks_the_reminder_failed_with_error() {
    let h = harness_without_adapters();
    let candidate = recipient("Mariam", "Conde");
    h.memory.add_recipient(candidate.clone());

    let now = Utc::now();
    let snapshot = interview(candidate.id, now + Duration::hours(1), Modality::Visio);
    h.state
        .reminders
        .schedule_for_interview(&snapshot)
        .await
        .unwrap();

    let summary = h.state.reminders.sweep(now, 100).await.unwrap();
    assert_eq!(summary.claimed, 2);
    assert_eq!(summary.failed, 2);

    let all = h
        .state
        .stores
        .reminders
        .list_for_interview(snapshot.id)
        .await
        .unwrap();
    assert!(all.iter().all(|r| r.status == ReminderStatus::Failed));
    assert!(all.iter().all(|r| r.error_message.is_some()));

    // Not retried automatically: the next sweep leaves failed rows alone.
    let again = h.state.reminders.sweep(now + Duration::hours(1), 100).await.unwrap();
    assert_eq!(again.claimed, 0);
}

#[tokio::test]
async fn canceling_an_interview_drops_pending_reminders() {
    let h = harness();
    let candidate = recipient("Sekou", "Toure");
    h.memory.add_recipient(candidate.clone());

    let snapshot = interview(candidate.id, Utc::now() + Duration::hours(48), Modality::Visio);
    h.state
        .reminders
        .schedule_for_interview(&snapshot)
        .await
        .unwrap();

    let dropped = h
        .state
        .reminders
        .cancel_for_interview(snapshot.id)
        .await
        .unwrap();
    assert_eq!(dropped, 2);
    assert!(h
        .state
        .stores
        .reminders
        .list_for_interview(snapshot.id)
        .await
        .unwrap()
        .is_empty());
}
