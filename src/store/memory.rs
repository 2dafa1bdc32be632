//! In-memory store backing tests and database-less runs. Every repo trait is
//! implemented over mutex-guarded maps with the same semantics the Postgres
//! store provides (CAS transitions, idempotent inserts, atomic claims).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::broadcast::{AudienceFilter, Broadcast, BroadcastStatus, ChannelKind};
use crate::models::comm_log::{CommLog, CorrelationEntry};
use crate::models::interview::InterviewSnapshot;
use crate::models::message::{Message, MessageStats, MessageStatus};
use crate::models::notification::{Notification, NotificationPreferences};
use crate::models::recipient::Recipient;
use crate::models::reminder::{InterviewReminder, ReminderStatus};
use crate::models::template::Template;
use crate::store::{
    BroadcastRepo, CommLogRepo, CorrelationRepo, InsertOutcome, InterviewRepo, MessageRepo,
    NotificationRepo, PreferenceRepo, ReminderRepo, Stores, TemplateRepo, TransitionStamp,
    UserDirectory,
};

#[derive(Default)]
struct Inner {
    broadcasts: Mutex<HashMap<Uuid, Broadcast>>,
    messages: Mutex<Vec<Message>>,
    templates: Mutex<HashMap<Uuid, Template>>,
    comm_logs: Mutex<Vec<CommLog>>,
    correlations: Mutex<Vec<CorrelationEntry>>,
    notifications: Mutex<Vec<Notification>>,
    preferences: Mutex<HashMap<Uuid, NotificationPreferences>>,
    reminders: Mutex<Vec<InterviewReminder>>,
    interviews: Mutex<HashMap<Uuid, InterviewSnapshot>>,
    recipients: Mutex<Vec<Recipient>>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stores(&self) -> Stores {
        let this = Arc::new(self.clone());
        Stores {
            broadcasts: this.clone(),
            messages: this.clone(),
            templates: this.clone(),
            comm_logs: this.clone(),
            correlations: this.clone(),
            notifications: this.clone(),
            preferences: this.clone(),
            reminders: this.clone(),
            interviews: this.clone(),
            users: this,
        }
    }

    /// Seeds a user-directory row; the directory is read-only for the engine
    /// itself.
    pub fn add_recipient(&self, recipient: Recipient) {
        self.inner.recipients.lock().unwrap().push(recipient);
    }

    pub fn add_template(&self, template: Template) {
        self.inner
            .templates
            .lock()
            .unwrap()
            .insert(template.id, template);
    }
}

#[async_trait]
impl BroadcastRepo for MemoryStore {
    async fn insert(&self, broadcast: &Broadcast) -> Result<()> {
        self.inner
            .broadcasts
            .lock()
            .unwrap()
            .insert(broadcast.id, broadcast.clone());
        Ok(())
    }

    async fn update(&self, broadcast: &Broadcast) -> Result<()> {
        let mut map = self.inner.broadcasts.lock().unwrap();
        match map.get_mut(&broadcast.id) {
            Some(existing) => {
                *existing = broadcast.clone();
                Ok(())
            }
            None => Err(Error::NotFound("Broadcast not found".to_string())),
        }
    }

    async fn fetch(&self, id: Uuid) -> Result<Broadcast> {
        self.inner
            .broadcasts
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound("Broadcast not found".to_string()))
    }

    async fn list(&self, status: Option<BroadcastStatus>, limit: i64) -> Result<Vec<Broadcast>> {
        let map = self.inner.broadcasts.lock().unwrap();
        let mut rows: Vec<Broadcast> = map
            .values()
            .filter(|b| status.map_or(true, |s| b.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn cas_status(
        &self,
        id: Uuid,
        expected: &[BroadcastStatus],
        stamp: TransitionStamp,
    ) -> Result<Option<Broadcast>> {
        let mut map = self.inner.broadcasts.lock().unwrap();
        let Some(b) = map.get_mut(&id) else {
            return Err(Error::NotFound("Broadcast not found".to_string()));
        };
        if !expected.contains(&b.status) {
            return Ok(None);
        }
        b.status = stamp.to;
        if stamp.scheduled_at.is_some() {
            b.scheduled_at = stamp.scheduled_at;
        }
        if stamp.started_at.is_some() {
            b.started_at = stamp.started_at;
        }
        if stamp.completed_at.is_some() {
            b.completed_at = stamp.completed_at;
        }
        b.updated_by = stamp.actor;
        b.updated_at = Utc::now();
        Ok(Some(b.clone()))
    }

    async fn due_scheduled(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Broadcast>> {
        let map = self.inner.broadcasts.lock().unwrap();
        let mut rows: Vec<Broadcast> = map
            .values()
            .filter(|b| {
                b.status == BroadcastStatus::Scheduled
                    && b.scheduled_at.map_or(false, |at| at <= now)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|b| b.scheduled_at);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn set_total_recipients(&self, id: Uuid, total: i64) -> Result<()> {
        let mut map = self.inner.broadcasts.lock().unwrap();
        if let Some(b) = map.get_mut(&id) {
            b.total_recipients = total;
        }
        Ok(())
    }

    async fn add_counters(&self, id: Uuid, sent: i64, failed: i64, excluded: i64) -> Result<()> {
        let mut map = self.inner.broadcasts.lock().unwrap();
        if let Some(b) = map.get_mut(&id) {
            b.total_sent += sent;
            b.total_failed += failed;
            b.total_excluded += excluded;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageRepo for MemoryStore {
    async fn try_insert(&self, message: &Message) -> Result<InsertOutcome> {
        let mut rows = self.inner.messages.lock().unwrap();
        if let Some(existing) = rows.iter().find(|m| {
            m.broadcast_id == message.broadcast_id
                && m.broadcast_id.is_some()
                && m.recipient_id == message.recipient_id
                && m.channel == message.channel
        }) {
            return Ok(InsertOutcome::Exists(existing.clone()));
        }
        rows.push(message.clone());
        Ok(InsertOutcome::Inserted(message.clone()))
    }

    async fn insert(&self, message: &Message) -> Result<()> {
        self.inner.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn mark_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut rows = self.inner.messages.lock().unwrap();
        if let Some(m) = rows.iter_mut().find(|m| m.id == id) {
            m.status = MessageStatus::Sent;
            m.sent_at = Some(at);
        }
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, error: &str, terminal: bool) -> Result<i32> {
        let mut rows = self.inner.messages.lock().unwrap();
        let Some(m) = rows.iter_mut().find(|m| m.id == id) else {
            return Err(Error::NotFound("Message not found".to_string()));
        };
        m.retry_count += 1;
        m.error_message = Some(error.to_string());
        if terminal {
            m.status = MessageStatus::Failed;
        }
        Ok(m.retry_count)
    }

    async fn list_for_broadcast(
        &self,
        broadcast_id: Uuid,
        status: Option<MessageStatus>,
        channel: Option<ChannelKind>,
    ) -> Result<Vec<Message>> {
        let rows = self.inner.messages.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|m| m.broadcast_id == Some(broadcast_id))
            .filter(|m| status.map_or(true, |s| m.status == s))
            .filter(|m| channel.map_or(true, |c| m.channel == c))
            .cloned()
            .collect())
    }

    async fn stats_for_broadcast(&self, broadcast_id: Uuid) -> Result<MessageStats> {
        let rows = self.inner.messages.lock().unwrap();
        let mut stats = MessageStats::default();
        for m in rows.iter().filter(|m| m.broadcast_id == Some(broadcast_id)) {
            stats.total += 1;
            *stats
                .by_status
                .entry(m.status.as_str().to_string())
                .or_insert(0) += 1;
            *stats
                .by_channel
                .entry(m.channel.as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(stats)
    }
}

#[async_trait]
impl TemplateRepo for MemoryStore {
    async fn insert(&self, template: &Template) -> Result<()> {
        self.inner
            .templates
            .lock()
            .unwrap()
            .insert(template.id, template.clone());
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Template> {
        self.inner
            .templates
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound("Template not found".to_string()))
    }

    async fn list_active(&self, channel: Option<ChannelKind>) -> Result<Vec<Template>> {
        let map = self.inner.templates.lock().unwrap();
        let mut rows: Vec<Template> = map
            .values()
            .filter(|t| t.is_active)
            .filter(|t| channel.map_or(true, |c| t.channel == c))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}

#[async_trait]
impl CommLogRepo for MemoryStore {
    async fn append(&self, entry: &CommLog) -> Result<()> {
        self.inner.comm_logs.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn list(&self, broadcast_id: Option<Uuid>, limit: i64) -> Result<Vec<CommLog>> {
        let rows = self.inner.comm_logs.lock().unwrap();
        let mut out: Vec<CommLog> = rows
            .iter()
            .filter(|l| broadcast_id.map_or(true, |id| l.broadcast_id == Some(id)))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }
}

#[async_trait]
impl CorrelationRepo for MemoryStore {
    async fn append(&self, entry: &CorrelationEntry) -> Result<()> {
        self.inner.correlations.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn for_application(&self, application_id: Uuid) -> Result<Vec<CorrelationEntry>> {
        let rows = self.inner.correlations.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|e| e.application_id == Some(application_id))
            .cloned()
            .collect())
    }

    async fn for_interview(&self, interview_id: Uuid) -> Result<Vec<CorrelationEntry>> {
        let rows = self.inner.correlations.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|e| e.interview_id == Some(interview_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationRepo for MemoryStore {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        self.inner
            .notifications
            .lock()
            .unwrap()
            .push(notification.clone());
        Ok(())
    }

    async fn list_recent(&self, recipient_id: Uuid, limit: i64) -> Result<Vec<Notification>> {
        let rows = self.inner.notifications.lock().unwrap();
        let mut out: Vec<Notification> = rows
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64> {
        let rows = self.inner.notifications.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
            .count() as i64)
    }

    async fn mark_read(&self, id: Uuid, recipient_id: Uuid) -> Result<Option<Notification>> {
        let mut rows = self.inner.notifications.lock().unwrap();
        match rows
            .iter_mut()
            .find(|n| n.id == id && n.recipient_id == recipient_id)
        {
            Some(n) => {
                n.read = true;
                Ok(Some(n.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64> {
        let mut rows = self.inner.notifications.lock().unwrap();
        let mut updated = 0;
        for n in rows
            .iter_mut()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
        {
            n.read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete(&self, id: Uuid, recipient_id: Uuid) -> Result<Option<Notification>> {
        let mut rows = self.inner.notifications.lock().unwrap();
        let pos = rows
            .iter()
            .position(|n| n.id == id && n.recipient_id == recipient_id);
        Ok(pos.map(|i| rows.remove(i)))
    }
}

#[async_trait]
impl PreferenceRepo for MemoryStore {
    async fn fetch(&self, recipient_id: Uuid) -> Result<Option<NotificationPreferences>> {
        Ok(self
            .inner
            .preferences
            .lock()
            .unwrap()
            .get(&recipient_id)
            .cloned())
    }

    async fn upsert(&self, prefs: &NotificationPreferences) -> Result<()> {
        self.inner
            .preferences
            .lock()
            .unwrap()
            .insert(prefs.recipient_id, prefs.clone());
        Ok(())
    }
}

#[async_trait]
impl ReminderRepo for MemoryStore {
    async fn replace_pending(&self, reminder: &InterviewReminder) -> Result<()> {
        let mut rows = self.inner.reminders.lock().unwrap();
        rows.retain(|r| {
            !(r.interview_id == reminder.interview_id
                && r.kind == reminder.kind
                && r.status == ReminderStatus::Pending)
        });
        rows.push(reminder.clone());
        Ok(())
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<InterviewReminder>> {
        let mut rows = self.inner.reminders.lock().unwrap();
        let mut claimed = Vec::new();
        let mut due: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == ReminderStatus::Pending && r.scheduled_for <= now)
            .map(|(i, _)| i)
            .collect();
        due.sort_by_key(|&i| rows[i].scheduled_for);
        for i in due.into_iter().take(limit.max(0) as usize) {
            let r = &mut rows[i];
            r.status = ReminderStatus::Sent;
            r.sent_at = Some(now);
            claimed.push(r.clone());
        }
        Ok(claimed)
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let mut rows = self.inner.reminders.lock().unwrap();
        if let Some(r) = rows.iter_mut().find(|r| r.id == id) {
            r.status = ReminderStatus::Failed;
            r.sent_at = None;
            r.error_message = Some(error.to_string());
        }
        Ok(())
    }

    async fn cancel_pending(&self, interview_id: Uuid) -> Result<u64> {
        let mut rows = self.inner.reminders.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| {
            !(r.interview_id == interview_id && r.status == ReminderStatus::Pending)
        });
        Ok((before - rows.len()) as u64)
    }

    async fn list_for_interview(&self, interview_id: Uuid) -> Result<Vec<InterviewReminder>> {
        let rows = self.inner.reminders.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|r| r.interview_id == interview_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl InterviewRepo for MemoryStore {
    async fn upsert(&self, snapshot: &InterviewSnapshot) -> Result<()> {
        self.inner
            .interviews
            .lock()
            .unwrap()
            .insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<InterviewSnapshot> {
        self.inner
            .interviews
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound("Interview not found".to_string()))
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn count(&self, filter: &AudienceFilter) -> Result<i64> {
        let rows = self.inner.recipients.lock().unwrap();
        Ok(rows.iter().filter(|r| filter.matches(r)).count() as i64)
    }

    async fn page(
        &self,
        filter: &AudienceFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Recipient>> {
        let rows = self.inner.recipients.lock().unwrap();
        let mut matched: Vec<Recipient> =
            rows.iter().filter(|r| filter.matches(r)).cloned().collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matched
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn fetch(&self, id: Uuid) -> Result<Recipient> {
        let rows = self.inner.recipients.lock().unwrap();
        rows.iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound("Recipient not found".to_string()))
    }
}
