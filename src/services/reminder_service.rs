//! Interview reminder scheduling and the recurring sweep that promotes due
//! reminders into transactional sends. Claiming happens before any delivery
//! attempt, so overlapping sweeps never double-send; a reminder that fails to
//! go out is marked `failed` and left for a manual resend rather than being
//! retried into someone's phone.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::models::interview::InterviewSnapshot;
use crate::models::notification::EventKind;
use crate::models::reminder::{InterviewReminder, ReminderKind};
use crate::services::notify_service::{EventOutcome, NotifyService};
use crate::store::Stores;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepSummary {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ReminderService {
    stores: Stores,
    notify: NotifyService,
}

impl ReminderService {
    pub fn new(stores: Stores, notify: NotifyService) -> Self {
        Self { stores, notify }
    }

    /// Computes the T-24h and T-2h firing times for an interview and persists
    /// them as pending reminders. Re-scheduling replaces any pending reminder
    /// of the same kind instead of duplicating it.
    pub async fn schedule_for_interview(
        &self,
        snapshot: &InterviewSnapshot,
    ) -> Result<Vec<InterviewReminder>> {
        self.stores.interviews.upsert(snapshot).await?;
        let mut scheduled = Vec::with_capacity(ReminderKind::ALL.len());
        for kind in ReminderKind::ALL {
            let reminder = InterviewReminder::pending(snapshot.id, kind, snapshot.scheduled_at);
            self.stores.reminders.replace_pending(&reminder).await?;
            scheduled.push(reminder);
        }
        Ok(scheduled)
    }

    /// Drops pending reminders for a canceled interview; sent history stays.
    pub async fn cancel_for_interview(&self, interview_id: Uuid) -> Result<u64> {
        self.stores.reminders.cancel_pending(interview_id).await
    }

    /// One sweep pass: claim everything due, then deliver each. A reminder
    /// that waited out a long outage is still due and fires once.
    pub async fn sweep(&self, now: DateTime<Utc>, limit: i64) -> Result<SweepSummary> {
        let claimed = self.stores.reminders.claim_due(now, limit).await?;
        let mut summary = SweepSummary {
            claimed: claimed.len(),
            ..Default::default()
        };
        for reminder in claimed {
            match self.fire(&reminder).await {
                Ok(outcome) if outcome.delivered() => summary.sent += 1,
                Ok(_) => {
                    summary.failed += 1;
                    self.stores
                        .reminders
                        .mark_failed(reminder.id, "delivery failed on every channel")
                        .await?;
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(reminder = %reminder.id, error = %e, "reminder send errored");
                    self.stores
                        .reminders
                        .mark_failed(reminder.id, &e.to_string())
                        .await?;
                }
            }
        }
        if summary.claimed > 0 {
            tracing::info!(
                claimed = summary.claimed,
                sent = summary.sent,
                failed = summary.failed,
                "reminder sweep finished"
            );
        }
        Ok(summary)
    }

    async fn fire(&self, reminder: &InterviewReminder) -> Result<EventOutcome> {
        let interview = self.stores.interviews.fetch(reminder.interview_id).await?;
        let kind: EventKind = reminder.kind.event_kind();
        self.notify
            .send_interview_event(&interview, kind, None, None)
            .await
    }
}
