use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::broadcast::{AudienceFilter, Broadcast, BroadcastStatus, ChannelKind};
use crate::models::comm_log::{CommLog, CorrelationEntry};
use crate::models::interview::InterviewSnapshot;
use crate::models::message::{Message, MessageStats, MessageStatus};
use crate::models::notification::{Notification, NotificationPreferences};
use crate::models::recipient::Recipient;
use crate::models::reminder::InterviewReminder;
use crate::models::template::Template;

pub mod memory;
pub mod postgres;

/// Timestamps applied alongside a compare-and-set status change.
#[derive(Debug, Clone)]
pub struct TransitionStamp {
    pub to: BroadcastStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub actor: Uuid,
}

impl TransitionStamp {
    pub fn to(status: BroadcastStatus, actor: Uuid) -> Self {
        Self {
            to: status,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            actor,
        }
    }
}

#[async_trait]
pub trait BroadcastRepo: Send + Sync {
    async fn insert(&self, broadcast: &Broadcast) -> Result<()>;
    /// Draft-time content edits. Status and counters are not touched here.
    async fn update(&self, broadcast: &Broadcast) -> Result<()>;
    async fn fetch(&self, id: Uuid) -> Result<Broadcast>;
    async fn list(&self, status: Option<BroadcastStatus>, limit: i64) -> Result<Vec<Broadcast>>;
    /// Atomically moves the broadcast to `stamp.to` if its current status is
    /// one of `expected`. Returns the updated row, or None when the
    /// precondition failed (caller decides whether that is a conflict).
    async fn cas_status(
        &self,
        id: Uuid,
        expected: &[BroadcastStatus],
        stamp: TransitionStamp,
    ) -> Result<Option<Broadcast>>;
    async fn due_scheduled(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Broadcast>>;
    async fn set_total_recipients(&self, id: Uuid, total: i64) -> Result<()>;
    /// Atomic counter increments; called concurrently by delivery tasks.
    async fn add_counters(&self, id: Uuid, sent: i64, failed: i64, excluded: i64) -> Result<()>;
}

/// Result of an idempotent message insert at the
/// (broadcast, recipient, channel) key.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(Message),
    Exists(Message),
}

#[async_trait]
pub trait MessageRepo: Send + Sync {
    /// Insert keyed by (broadcast, recipient, channel); yields the existing
    /// row instead of duplicating when the pair was already produced.
    async fn try_insert(&self, message: &Message) -> Result<InsertOutcome>;
    /// Unkeyed insert for transactional sends.
    async fn insert(&self, message: &Message) -> Result<()>;
    async fn mark_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
    /// Records a delivery failure: bumps retry_count, stores the error, and
    /// moves the message to `failed` when `terminal`.
    async fn record_failure(&self, id: Uuid, error: &str, terminal: bool) -> Result<i32>;
    async fn list_for_broadcast(
        &self,
        broadcast_id: Uuid,
        status: Option<MessageStatus>,
        channel: Option<ChannelKind>,
    ) -> Result<Vec<Message>>;
    async fn stats_for_broadcast(&self, broadcast_id: Uuid) -> Result<MessageStats>;
}

#[async_trait]
pub trait TemplateRepo: Send + Sync {
    async fn insert(&self, template: &Template) -> Result<()>;
    async fn fetch(&self, id: Uuid) -> Result<Template>;
    async fn list_active(&self, channel: Option<ChannelKind>) -> Result<Vec<Template>>;
}

#[async_trait]
pub trait CommLogRepo: Send + Sync {
    async fn append(&self, entry: &CommLog) -> Result<()>;
    async fn list(&self, broadcast_id: Option<Uuid>, limit: i64) -> Result<Vec<CommLog>>;
}

#[async_trait]
pub trait CorrelationRepo: Send + Sync {
    async fn append(&self, entry: &CorrelationEntry) -> Result<()>;
    async fn for_application(&self, application_id: Uuid) -> Result<Vec<CorrelationEntry>>;
    async fn for_interview(&self, interview_id: Uuid) -> Result<Vec<CorrelationEntry>>;
}

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<()>;
    async fn list_recent(&self, recipient_id: Uuid, limit: i64) -> Result<Vec<Notification>>;
    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64>;
    /// Marks one notification read, scoped to its owner. Returns the updated
    /// row, or None when it does not exist or belongs to someone else.
    async fn mark_read(&self, id: Uuid, recipient_id: Uuid) -> Result<Option<Notification>>;
    async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64>;
    /// Removes one notification, scoped to its owner; returns the removed row.
    async fn delete(&self, id: Uuid, recipient_id: Uuid) -> Result<Option<Notification>>;
}

#[async_trait]
pub trait PreferenceRepo: Send + Sync {
    async fn fetch(&self, recipient_id: Uuid) -> Result<Option<NotificationPreferences>>;
    async fn upsert(&self, prefs: &NotificationPreferences) -> Result<()>;
}

#[async_trait]
pub trait ReminderRepo: Send + Sync {
    /// Replaces any pending reminder of the same (interview, kind); never
    /// duplicates.
    async fn replace_pending(&self, reminder: &InterviewReminder) -> Result<()>;
    /// Atomically claims due pending reminders by moving them to `sent`
    /// before any delivery is attempted, so overlapping sweeps cannot pick
    /// the same row twice. The claimed rows are returned.
    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<InterviewReminder>>;
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()>;
    async fn cancel_pending(&self, interview_id: Uuid) -> Result<u64>;
    async fn list_for_interview(&self, interview_id: Uuid) -> Result<Vec<InterviewReminder>>;
}

#[async_trait]
pub trait InterviewRepo: Send + Sync {
    async fn upsert(&self, snapshot: &InterviewSnapshot) -> Result<()>;
    async fn fetch(&self, id: Uuid) -> Result<InterviewSnapshot>;
}

/// Read-only queries against the user/profile store.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn count(&self, filter: &AudienceFilter) -> Result<i64>;
    async fn page(&self, filter: &AudienceFilter, offset: i64, limit: i64)
        -> Result<Vec<Recipient>>;
    async fn fetch(&self, id: Uuid) -> Result<Recipient>;
}

/// Bundle of every repository the engine depends on. Cloning is cheap; all
/// fields are shared handles.
#[derive(Clone)]
pub struct Stores {
    pub broadcasts: Arc<dyn BroadcastRepo>,
    pub messages: Arc<dyn MessageRepo>,
    pub templates: Arc<dyn TemplateRepo>,
    pub comm_logs: Arc<dyn CommLogRepo>,
    pub correlations: Arc<dyn CorrelationRepo>,
    pub notifications: Arc<dyn NotificationRepo>,
    pub preferences: Arc<dyn PreferenceRepo>,
    pub reminders: Arc<dyn ReminderRepo>,
    pub interviews: Arc<dyn InterviewRepo>,
    pub users: Arc<dyn UserDirectory>,
}
