//! Postgres-backed store. All queries are runtime-checked; enum-typed model
//! fields are kept as TEXT columns and converted at the row boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::broadcast::{
    AudienceFilter, Broadcast, BroadcastKind, BroadcastStatus, ChannelKind, ChannelPlan,
};
use crate::models::comm_log::{CommLog, CorrelationEntry, LogAction};
use crate::models::interview::{InterviewSnapshot, Modality};
use crate::models::message::{Message, MessageStats, MessageStatus};
use crate::models::notification::{Notification, NotificationPreferences};
use crate::models::recipient::Recipient;
use crate::models::reminder::{InterviewReminder, ReminderKind, ReminderStatus};
use crate::models::template::Template;
use crate::store::{
    BroadcastRepo, CommLogRepo, CorrelationRepo, InsertOutcome, InterviewRepo, MessageRepo,
    NotificationRepo, PreferenceRepo, ReminderRepo, Stores, TemplateRepo, TransitionStamp,
    UserDirectory,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn stores(pool: PgPool) -> Stores {
        let this = Arc::new(Self::new(pool));
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
}

fn bad_column(column: &str, value: &str) -> Error {
    Error::Internal(format!("Unexpected {} value in store: {}", column, value))
}

#[derive(sqlx::FromRow)]
struct BroadcastRow {
    id: Uuid,
    title: String,
    kind: String,
    description: Option<String>,
    audience: JsonValue,
    estimated_audience: i64,
    channels: JsonValue,
    status: String,
    scheduled_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    total_recipients: i64,
    total_sent: i64,
    total_failed: i64,
    total_excluded: i64,
    created_by: Uuid,
    updated_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BroadcastRow> for Broadcast {
    type Error = Error;

    fn try_from(row: BroadcastRow) -> Result<Self> {
        Ok(Broadcast {
            id: row.id,
            title: row.title,
            kind: BroadcastKind::parse(&row.kind).ok_or_else(|| bad_column("kind", &row.kind))?,
            description: row.description,
            audience: serde_json::from_value(row.audience)?,
            estimated_audience: row.estimated_audience,
            channels: serde_json::from_value::<Vec<ChannelPlan>>(row.channels)?,
            status: BroadcastStatus::parse(&row.status)
                .ok_or_else(|| bad_column("status", &row.status))?,
            scheduled_at: row.scheduled_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            total_recipients: row.total_recipients,
            total_sent: row.total_sent,
            total_failed: row.total_failed,
            total_excluded: row.total_excluded,
            created_by: row.created_by,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const BROADCAST_COLUMNS: &str = "id, title, kind, description, audience, estimated_audience, \
     channels, status, scheduled_at, started_at, completed_at, total_recipients, total_sent, \
     total_failed, total_excluded, created_by, updated_by, created_at, updated_at";

#[async_trait]
impl BroadcastRepo for PgStore {
    async fn insert(&self, b: &Broadcast) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO broadcasts
                (id, title, kind, description, audience, estimated_audience, channels, status,
                 scheduled_at, started_at, completed_at, total_recipients, total_sent,
                 total_failed, total_excluded, created_by, updated_by, created_at, updated_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
            "#,
        )
        .bind(b.id)
        .bind(&b.title)
        .bind(b.kind.as_str())
        .bind(&b.description)
        .bind(serde_json::to_value(&b.audience)?)
        .bind(b.estimated_audience)
        .bind(serde_json::to_value(&b.channels)?)
        .bind(b.status.as_str())
        .bind(b.scheduled_at)
        .bind(b.started_at)
        .bind(b.completed_at)
        .bind(b.total_recipients)
        .bind(b.total_sent)
        .bind(b.total_failed)
        .bind(b.total_excluded)
        .bind(b.created_by)
        .bind(b.updated_by)
        .bind(b.created_at)
        .bind(b.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, b: &Broadcast) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE broadcasts
            SET title = $2, kind = $3, description = $4, audience = $5,
                estimated_audience = $6, channels = $7, updated_by = $8, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(b.id)
        .bind(&b.title)
        .bind(b.kind.as_str())
        .bind(&b.description)
        .bind(serde_json::to_value(&b.audience)?)
        .bind(b.estimated_audience)
        .bind(serde_json::to_value(&b.channels)?)
        .bind(b.updated_by)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Broadcast not found".to_string()));
        }
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Broadcast> {
        let row = sqlx::query_as::<_, BroadcastRow>(&format!(
            "SELECT {} FROM broadcasts WHERE id = $1",
            BROADCAST_COLUMNS
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn list(&self, status: Option<BroadcastStatus>, limit: i64) -> Result<Vec<Broadcast>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, BroadcastRow>(&format!(
                    "SELECT {} FROM broadcasts WHERE status = $1 ORDER BY created_at DESC LIMIT $2",
                    BROADCAST_COLUMNS
                ))
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, BroadcastRow>(&format!(
                    "SELECT {} FROM broadcasts ORDER BY created_at DESC LIMIT $1",
                    BROADCAST_COLUMNS
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn cas_status(
        &self,
        id: Uuid,
        expected: &[BroadcastStatus],
        stamp: TransitionStamp,
    ) -> Result<Option<Broadcast>> {
        let expected: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();
        let row = sqlx::query_as::<_, BroadcastRow>(&format!(
            r#"
            UPDATE broadcasts
            SET status = $2,
                scheduled_at = COALESCE($3, scheduled_at),
                started_at = COALESCE($4, started_at),
                completed_at = COALESCE($5, completed_at),
                updated_by = $6,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($7)
            RETURNING {}
            "#,
            BROADCAST_COLUMNS
        ))
        .bind(id)
        .bind(stamp.to.as_str())
        .bind(stamp.scheduled_at)
        .bind(stamp.started_at)
        .bind(stamp.completed_at)
        .bind(stamp.actor)
        .bind(&expected)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn due_scheduled(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Broadcast>> {
        let rows = sqlx::query_as::<_, BroadcastRow>(&format!(
            r#"
            SELECT {} FROM broadcasts
            WHERE status = 'scheduled' AND scheduled_at <= $1
            ORDER BY scheduled_at ASC
            LIMIT $2
            "#,
            BROADCAST_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_total_recipients(&self, id: Uuid, total: i64) -> Result<()> {
        sqlx::query("UPDATE broadcasts SET total_recipients = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(total)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_counters(&self, id: Uuid, sent: i64, failed: i64, excluded: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE broadcasts
            SET total_sent = total_sent + $2,
                total_failed = total_failed + $3,
                total_excluded = total_excluded + $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(sent)
        .bind(failed)
        .bind(excluded)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    broadcast_id: Option<Uuid>,
    recipient_id: Uuid,
    channel: String,
    subject: Option<String>,
    body: String,
    status: String,
    exclusion_reason: Option<String>,
    retry_count: i32,
    error_message: Option<String>,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: row.id,
            broadcast_id: row.broadcast_id,
            recipient_id: row.recipient_id,
            channel: ChannelKind::parse(&row.channel)
                .ok_or_else(|| bad_column("channel", &row.channel))?,
            subject: row.subject,
            body: row.body,
            status: MessageStatus::parse(&row.status)
                .ok_or_else(|| bad_column("status", &row.status))?,
            exclusion_reason: row.exclusion_reason,
            retry_count: row.retry_count,
            error_message: row.error_message,
            sent_at: row.sent_at,
            created_at: row.created_at,
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, broadcast_id, recipient_id, channel, subject, body, status, \
     exclusion_reason, retry_count, error_message, sent_at, created_at";

#[async_trait]
impl MessageRepo for PgStore {
    async fn try_insert(&self, m: &Message) -> Result<InsertOutcome> {
        let insert = format!(
            r#"
            INSERT INTO messages
                (id, broadcast_id, recipient_id, channel, subject, body, status,
                 exclusion_reason, retry_count, error_message, sent_at, created_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
            ON CONFLICT (broadcast_id, recipient_id, channel)
                WHERE broadcast_id IS NOT NULL
                DO NOTHING
            RETURNING {}
            "#,
            MESSAGE_COLUMNS
        );
        let inserted = sqlx::query_as::<_, MessageRow>(&insert)
            .bind(m.id)
            .bind(m.broadcast_id)
            .bind(m.recipient_id)
            .bind(m.channel.as_str())
            .bind(&m.subject)
            .bind(&m.body)
            .bind(m.status.as_str())
            .bind(&m.exclusion_reason)
            .bind(m.retry_count)
            .bind(&m.error_message)
            .bind(m.sent_at)
            .bind(m.created_at)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = inserted {
            return Ok(InsertOutcome::Inserted(row.try_into()?));
        }
        let existing = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {} FROM messages
            WHERE broadcast_id = $1 AND recipient_id = $2 AND channel = $3
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(m.broadcast_id)
        .bind(m.recipient_id)
        .bind(m.channel.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(InsertOutcome::Exists(existing.try_into()?))
    }

    async fn insert(&self, m: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages
                (id, broadcast_id, recipient_id, channel, subject, body, status,
                 exclusion_reason, retry_count, error_message, sent_at, created_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
            "#,
        )
        .bind(m.id)
        .bind(m.broadcast_id)
        .bind(m.recipient_id)
        .bind(m.channel.as_str())
        .bind(&m.subject)
        .bind(&m.body)
        .bind(m.status.as_str())
        .bind(&m.exclusion_reason)
        .bind(m.retry_count)
        .bind(&m.error_message)
        .bind(m.sent_at)
        .bind(m.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE messages SET status = 'sent', sent_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, error: &str, terminal: bool) -> Result<i32> {
        let row = sqlx::query(
            r#"
            UPDATE messages
            SET retry_count = retry_count + 1,
                error_message = $2,
                status = CASE WHEN $3 THEN 'failed' ELSE status END
            WHERE id = $1
            RETURNING retry_count
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(terminal)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("retry_count")?)
    }

    async fn list_for_broadcast(
        &self,
        broadcast_id: Uuid,
        status: Option<MessageStatus>,
        channel: Option<ChannelKind>,
    ) -> Result<Vec<Message>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM messages WHERE broadcast_id = ",
            MESSAGE_COLUMNS
        ));
        qb.push_bind(broadcast_id);
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(channel) = channel {
            qb.push(" AND channel = ").push_bind(channel.as_str());
        }
        qb.push(" ORDER BY created_at ASC");
        let rows = qb.build_query_as::<MessageRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn stats_for_broadcast(&self, broadcast_id: Uuid) -> Result<MessageStats> {
        let rows = sqlx::query(
            r#"
            SELECT channel, status, COUNT(*) AS count
            FROM messages
            WHERE broadcast_id = $1
            GROUP BY channel, status
            "#,
        )
        .bind(broadcast_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = MessageStats::default();
        for row in rows {
            let channel: String = row.try_get("channel")?;
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            stats.total += count;
            *stats.by_status.entry(status).or_insert(0) += count;
            *stats.by_channel.entry(channel).or_insert(0) += count;
        }
        Ok(stats)
    }
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    name: String,
    channel: String,
    subject: Option<String>,
    body: String,
    variables: Vec<String>,
    is_active: bool,
    category: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for Template {
    type Error = Error;

    fn try_from(row: TemplateRow) -> Result<Self> {
        Ok(Template {
            id: row.id,
            name: row.name,
            channel: ChannelKind::parse(&row.channel)
                .ok_or_else(|| bad_column("channel", &row.channel))?,
            subject: row.subject,
            body: row.body,
            variables: row.variables,
            is_active: row.is_active,
            category: row.category,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl TemplateRepo for PgStore {
    async fn insert(&self, t: &Template) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO templates
                (id, name, channel, subject, body, variables, is_active, category,
                 created_at, updated_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
            "#,
        )
        .bind(t.id)
        .bind(&t.name)
        .bind(t.channel.as_str())
        .bind(&t.subject)
        .bind(&t.body)
        .bind(&t.variables)
        .bind(t.is_active)
        .bind(&t.category)
        .bind(t.created_at)
        .bind(t.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Template> {
        let row = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT id, name, channel, subject, body, variables, is_active, category,
                   created_at, updated_at
            FROM templates WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn list_active(&self, channel: Option<ChannelKind>) -> Result<Vec<Template>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, name, channel, subject, body, variables, is_active, category, \
             created_at, updated_at FROM templates WHERE is_active = TRUE",
        );
        if let Some(channel) = channel {
            qb.push(" AND channel = ").push_bind(channel.as_str());
        }
        qb.push(" ORDER BY name ASC");
        let rows = qb.build_query_as::<TemplateRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct CommLogRow {
    id: Uuid,
    broadcast_id: Option<Uuid>,
    action: String,
    details: JsonValue,
    actor_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CommLogRow> for CommLog {
    type Error = Error;

    fn try_from(row: CommLogRow) -> Result<Self> {
        Ok(CommLog {
            id: row.id,
            broadcast_id: row.broadcast_id,
            action: LogAction::parse(&row.action)
                .ok_or_else(|| bad_column("action", &row.action))?,
            details: row.details,
            actor_id: row.actor_id,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl CommLogRepo for PgStore {
    async fn append(&self, entry: &CommLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO comm_logs (id, broadcast_id, action, details, actor_id, created_at)
            VALUES ($1,$2,$3,$4,$5,$6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.broadcast_id)
        .bind(entry.action.as_str())
        .bind(&entry.details)
        .bind(entry.actor_id)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, broadcast_id: Option<Uuid>, limit: i64) -> Result<Vec<CommLog>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, broadcast_id, action, details, actor_id, created_at FROM comm_logs",
        );
        if let Some(id) = broadcast_id {
            qb.push(" WHERE broadcast_id = ").push_bind(id);
        }
        qb.push(" ORDER BY created_at DESC LIMIT ").push_bind(limit);
        let rows = qb.build_query_as::<CommLogRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct CorrelationRow {
    id: Uuid,
    application_id: Option<Uuid>,
    interview_id: Option<Uuid>,
    sender_id: Option<Uuid>,
    recipient_id: Uuid,
    event: String,
    channel: String,
    subject: Option<String>,
    body: String,
    delivered: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<CorrelationRow> for CorrelationEntry {
    type Error = Error;

    fn try_from(row: CorrelationRow) -> Result<Self> {
        Ok(CorrelationEntry {
            id: row.id,
            application_id: row.application_id,
            interview_id: row.interview_id,
            sender_id: row.sender_id,
            recipient_id: row.recipient_id,
            event: row.event,
            channel: ChannelKind::parse(&row.channel)
                .ok_or_else(|| bad_column("channel", &row.channel))?,
            subject: row.subject,
            body: row.body,
            delivered: row.delivered,
            created_at: row.created_at,
        })
    }
}

const CORRELATION_COLUMNS: &str = "id, application_id, interview_id, sender_id, recipient_id, \
     event, channel, subject, body, delivered, created_at";

#[async_trait]
impl CorrelationRepo for PgStore {
    async fn append(&self, entry: &CorrelationEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO correlation_logs
                (id, application_id, interview_id, sender_id, recipient_id, event, channel,
                 subject, body, delivered, created_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            "#,
        )
        .bind(entry.id)
        .bind(entry.application_id)
        .bind(entry.interview_id)
        .bind(entry.sender_id)
        .bind(entry.recipient_id)
        .bind(&entry.event)
        .bind(entry.channel.as_str())
        .bind(&entry.subject)
        .bind(&entry.body)
        .bind(entry.delivered)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn for_application(&self, application_id: Uuid) -> Result<Vec<CorrelationEntry>> {
        let rows = sqlx::query_as::<_, CorrelationRow>(&format!(
            "SELECT {} FROM correlation_logs WHERE application_id = $1 ORDER BY created_at DESC",
            CORRELATION_COLUMNS
        ))
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn for_interview(&self, interview_id: Uuid) -> Result<Vec<CorrelationEntry>> {
        let rows = sqlx::query_as::<_, CorrelationRow>(&format!(
            "SELECT {} FROM correlation_logs WHERE interview_id = $1 ORDER BY created_at DESC",
            CORRELATION_COLUMNS
        ))
        .bind(interview_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    recipient_id: Uuid,
    kind: String,
    title: String,
    message: String,
    link: Option<String>,
    read: bool,
    metadata: JsonValue,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.id,
            recipient_id: row.recipient_id,
            kind: row.kind,
            title: row.title,
            message: row.message,
            link: row.link,
            read: row.read,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, kind, title, message, link, read, metadata, created_at";

#[async_trait]
impl NotificationRepo for PgStore {
    async fn insert(&self, n: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, recipient_id, kind, title, message, link, read, metadata, created_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            "#,
        )
        .bind(n.id)
        .bind(n.recipient_id)
        .bind(&n.kind)
        .bind(&n.title)
        .bind(&n.message)
        .bind(&n.link)
        .bind(n.read)
        .bind(&n.metadata)
        .bind(n.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_recent(&self, recipient_id: Uuid, limit: i64) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            SELECT {} FROM notifications
            WHERE recipient_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            NOTIFICATION_COLUMNS
        ))
        .bind(recipient_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND read = FALSE",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    async fn mark_read(&self, id: Uuid, recipient_id: Uuid) -> Result<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            UPDATE notifications SET read = TRUE
            WHERE id = $1 AND recipient_id = $2
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE recipient_id = $1 AND read = FALSE",
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: Uuid, recipient_id: Uuid) -> Result<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            DELETE FROM notifications
            WHERE id = $1 AND recipient_id = $2
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }
}

#[derive(sqlx::FromRow)]
struct PreferencesRow {
    recipient_id: Uuid,
    email_enabled: bool,
    push_enabled: bool,
    announcements: bool,
    promotions: bool,
    application_updates: bool,
    message_alerts: bool,
    interview_alerts: bool,
    updated_at: DateTime<Utc>,
}

impl From<PreferencesRow> for NotificationPreferences {
    fn from(row: PreferencesRow) -> Self {
        NotificationPreferences {
            recipient_id: row.recipient_id,
            email_enabled: row.email_enabled,
            push_enabled: row.push_enabled,
            announcements: row.announcements,
            promotions: row.promotions,
            application_updates: row.application_updates,
            message_alerts: row.message_alerts,
            interview_alerts: row.interview_alerts,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl PreferenceRepo for PgStore {
    async fn fetch(&self, recipient_id: Uuid) -> Result<Option<NotificationPreferences>> {
        let row = sqlx::query_as::<_, PreferencesRow>(
            r#"
            SELECT recipient_id, email_enabled, push_enabled, announcements, promotions,
                   application_updates, message_alerts, interview_alerts, updated_at
            FROM notification_preferences WHERE recipient_id = $1
            "#,
        )
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn upsert(&self, p: &NotificationPreferences) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_preferences
                (recipient_id, email_enabled, push_enabled, announcements, promotions,
                 application_updates, message_alerts, interview_alerts, updated_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            ON CONFLICT (recipient_id) DO UPDATE SET
                email_enabled = EXCLUDED.email_enabled,
                push_enabled = EXCLUDED.push_enabled,
                announcements = EXCLUDED.announcements,
                promotions = EXCLUDED.promotions,
                application_updates = EXCLUDED.application_updates,
                message_alerts = EXCLUDED.message_alerts,
                interview_alerts = EXCLUDED.interview_alerts,
                updated_at = NOW()
            "#,
        )
        .bind(p.recipient_id)
        .bind(p.email_enabled)
        .bind(p.push_enabled)
        .bind(p.announcements)
        .bind(p.promotions)
        .bind(p.application_updates)
        .bind(p.message_alerts)
        .bind(p.interview_alerts)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ReminderRow {
    id: Uuid,
    interview_id: Uuid,
    kind: String,
    scheduled_for: DateTime<Utc>,
    status: String,
    sent_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReminderRow> for InterviewReminder {
    type Error = Error;

    fn try_from(row: ReminderRow) -> Result<Self> {
        Ok(InterviewReminder {
            id: row.id,
            interview_id: row.interview_id,
            kind: ReminderKind::parse(&row.kind).ok_or_else(|| bad_column("kind", &row.kind))?,
            scheduled_for: row.scheduled_for,
            status: ReminderStatus::parse(&row.status)
                .ok_or_else(|| bad_column("status", &row.status))?,
            sent_at: row.sent_at,
            error_message: row.error_message,
            created_at: row.created_at,
        })
    }
}

const REMINDER_COLUMNS: &str =
    "id, interview_id, kind, scheduled_for, status, sent_at, error_message, created_at";

#[async_trait]
impl ReminderRepo for PgStore {
    async fn replace_pending(&self, r: &InterviewReminder) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO interview_reminders
                (id, interview_id, kind, scheduled_for, status, sent_at, error_message, created_at)
            VALUES ($1,$2,$3,$4,'pending',NULL,NULL,$5)
            ON CONFLICT (interview_id, kind) WHERE status = 'pending'
                DO UPDATE SET scheduled_for = EXCLUDED.scheduled_for, created_at = EXCLUDED.created_at
            "#,
        )
        .bind(r.id)
        .bind(r.interview_id)
        .bind(r.kind.as_str())
        .bind(r.scheduled_for)
        .bind(r.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<InterviewReminder>> {
        let rows = sqlx::query_as::<_, ReminderRow>(&format!(
            r#"
            UPDATE interview_reminders SET status = 'sent', sent_at = $1
            WHERE id IN (
                SELECT id FROM interview_reminders
                WHERE status = 'pending' AND scheduled_for <= $1
                ORDER BY scheduled_for ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            REMINDER_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE interview_reminders
            SET status = 'failed', sent_at = NULL, error_message = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel_pending(&self, interview_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM interview_reminders WHERE interview_id = $1 AND status = 'pending'",
        )
        .bind(interview_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_for_interview(&self, interview_id: Uuid) -> Result<Vec<InterviewReminder>> {
        let rows = sqlx::query_as::<_, ReminderRow>(&format!(
            "SELECT {} FROM interview_reminders WHERE interview_id = $1 ORDER BY scheduled_for ASC",
            REMINDER_COLUMNS
        ))
        .bind(interview_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct InterviewRow {
    id: Uuid,
    application_id: Uuid,
    candidate_id: Uuid,
    job_title: String,
    company_name: String,
    scheduled_at: DateTime<Utc>,
    modality: String,
    location_or_link: Option<String>,
    notes: Option<String>,
}

impl TryFrom<InterviewRow> for InterviewSnapshot {
    type Error = Error;

    fn try_from(row: InterviewRow) -> Result<Self> {
        Ok(InterviewSnapshot {
            id: row.id,
            application_id: row.application_id,
            candidate_id: row.candidate_id,
            job_title: row.job_title,
            company_name: row.company_name,
            scheduled_at: row.scheduled_at,
            modality: Modality::parse(&row.modality)
                .ok_or_else(|| bad_column("modality", &row.modality))?,
            location_or_link: row.location_or_link,
            notes: row.notes,
        })
    }
}

#[async_trait]
impl InterviewRepo for PgStore {
    async fn upsert(&self, s: &InterviewSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO interview_snapshots
                (id, application_id, candidate_id, job_title, company_name, scheduled_at,
                 modality, location_or_link, notes)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            ON CONFLICT (id) DO UPDATE SET
                scheduled_at = EXCLUDED.scheduled_at,
                modality = EXCLUDED.modality,
                location_or_link = EXCLUDED.location_or_link,
                notes = EXCLUDED.notes
            "#,
        )
        .bind(s.id)
        .bind(s.application_id)
        .bind(s.candidate_id)
        .bind(&s.job_title)
        .bind(&s.company_name)
        .bind(s.scheduled_at)
        .bind(s.modality.as_str())
        .bind(&s.location_or_link)
        .bind(&s.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<InterviewSnapshot> {
        let row = sqlx::query_as::<_, InterviewRow>(
            r#"
            SELECT id, application_id, candidate_id, job_title, company_name, scheduled_at,
                   modality, location_or_link, notes
            FROM interview_snapshots WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    email: Option<String>,
    phone: Option<String>,
    role: String,
    language: Option<String>,
    country: Option<String>,
    region: Option<String>,
    city: Option<String>,
    profile_completion: i32,
    created_at: DateTime<Utc>,
}

impl From<ProfileRow> for Recipient {
    fn from(row: ProfileRow) -> Self {
        Recipient {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            role: row.role,
            language: row.language,
            country: row.country,
            region: row.region,
            city: row.city,
            profile_completion: row.profile_completion,
            created_at: row.created_at,
        }
    }
}

const PROFILE_COLUMNS: &str = "id, first_name, last_name, email, phone, role, language, \
     country, region, city, profile_completion, created_at";

fn push_filter(qb: &mut QueryBuilder<Postgres>, filter: &AudienceFilter) {
    if !filter.roles.is_empty() {
        qb.push(" AND role = ANY(").push_bind(filter.roles.clone()).push(")");
    }
    if let Some(min) = filter.min_completion {
        qb.push(" AND profile_completion >= ").push_bind(min);
    }
    if let Some(ref country) = filter.country {
        qb.push(" AND country = ").push_bind(country.clone());
    }
    if let Some(ref region) = filter.region {
        qb.push(" AND region = ").push_bind(region.clone());
    }
    if let Some(ref city) = filter.city {
        qb.push(" AND city = ").push_bind(city.clone());
    }
    if let Some(from) = filter.created_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
    if let Some(ref language) = filter.language {
        qb.push(" AND language = ").push_bind(language.clone());
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn count(&self, filter: &AudienceFilter) -> Result<i64> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) AS count FROM profiles WHERE TRUE");
        push_filter(&mut qb, filter);
        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.try_get("count")?)
    }

    async fn page(
        &self,
        filter: &AudienceFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Recipient>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM profiles WHERE TRUE",
            PROFILE_COLUMNS
        ));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at ASC, id ASC OFFSET ")
            .push_bind(offset)
            .push(" LIMIT ")
            .push_bind(limit);
        let rows = qb.build_query_as::<ProfileRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn fetch(&self, id: Uuid) -> Result<Recipient> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {} FROM profiles WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }
}
