//! Lifecycle controller for admin broadcasts: authoring, the status state
//! machine, scheduling guards, and the append-only audit trail.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::dto::broadcast_dto::{
    CreateBroadcastPayload, CreateTemplatePayload, UpdateBroadcastPayload,
};
use crate::error::{Error, Result};
use crate::models::broadcast::{Broadcast, BroadcastStatus, ChannelKind};
use crate::models::comm_log::{CommLog, LogAction};
use crate::models::message::MessageStats;
use crate::models::template::Template;
use crate::services::audience_service::AudienceService;
use crate::services::template_service;
use crate::store::{Stores, TransitionStamp};

/// Actor recorded for transitions driven by background sweeps rather than an
/// operator.
pub const SYSTEM_ACTOR: Uuid = Uuid::nil();

#[derive(Clone)]
pub struct BroadcastService {
    stores: Stores,
    audience: AudienceService,
}

impl BroadcastService {
    pub fn new(stores: Stores, audience: AudienceService) -> Self {
        Self { stores, audience }
    }

    pub async fn create(&self, actor: Uuid, payload: CreateBroadcastPayload) -> Result<Broadcast> {
        for plan in &payload.channels {
            template_service::validate_plan(plan)?;
        }
        let estimated = self.audience.count(&payload.audience).await?;
        let now = Utc::now();
        let broadcast = Broadcast {
            id: Uuid::new_v4(),
            title: payload.title,
            kind: payload.kind,
            description: payload.description,
            audience: payload.audience,
            estimated_audience: estimated,
            channels: payload.channels,
            status: BroadcastStatus::Draft,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            total_recipients: 0,
            total_sent: 0,
            total_failed: 0,
            total_excluded: 0,
            created_by: actor,
            updated_by: actor,
            created_at: now,
            updated_at: now,
        };
        self.stores.broadcasts.insert(&broadcast).await?;
        self.log(&broadcast, LogAction::Create, Some(actor), json!({})).await?;
        Ok(broadcast)
    }

    /// Draft-only content edits. The audience estimate is recomputed
    /// synchronously whenever the filter changes, so the operator always
    /// sees a live count before committing to send.
    pub async fn update(
        &self,
        actor: Uuid,
        id: Uuid,
        payload: UpdateBroadcastPayload,
    ) -> Result<Broadcast> {
        let mut broadcast = self.stores.broadcasts.fetch(id).await?;
        if broadcast.status != BroadcastStatus::Draft {
            return Err(Error::Conflict(format!(
                "only draft broadcasts can be edited (status: {})",
                broadcast.status.as_str()
            )));
        }

        if let Some(title) = payload.title {
            broadcast.title = title;
        }
        if let Some(kind) = payload.kind {
            broadcast.kind = kind;
        }
        if let Some(description) = payload.description {
            broadcast.description = Some(description);
        }
        if let Some(channels) = payload.channels {
            for plan in &channels {
                template_service::validate_plan(plan)?;
            }
            broadcast.channels = channels;
        }
        if let Some(audience) = payload.audience {
            if audience != broadcast.audience {
                broadcast.estimated_audience = self.audience.count(&audience).await?;
            }
            broadcast.audience = audience;
        }
        broadcast.updated_by = actor;
        broadcast.updated_at = Utc::now();

        self.stores.broadcasts.update(&broadcast).await?;
        self.log(&broadcast, LogAction::Update, Some(actor), json!({})).await?;
        Ok(broadcast)
    }

    /// Schedules a future send. The time must be strictly in the future;
    /// scheduling again while still `scheduled` moves the time.
    pub async fn schedule(
        &self,
        actor: Uuid,
        id: Uuid,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Broadcast> {
        if scheduled_at <= Utc::now() {
            return Err(Error::BadRequest(
                "scheduled_at must be in the future".to_string(),
            ));
        }
        let broadcast = self.stores.broadcasts.fetch(id).await?;
        self.require_channels(&broadcast)?;

        let stamp = TransitionStamp {
            to: BroadcastStatus::Scheduled,
            scheduled_at: Some(scheduled_at),
            started_at: None,
            completed_at: None,
            actor,
        };
        let updated = self
            .stores
            .broadcasts
            .cas_status(
                id,
                &[BroadcastStatus::Draft, BroadcastStatus::Scheduled],
                stamp,
            )
            .await?
            .ok_or_else(|| conflict(&broadcast, BroadcastStatus::Scheduled))?;
        self.log(
            &updated,
            LogAction::Schedule,
            Some(actor),
            json!({ "scheduled_at": scheduled_at, "from": broadcast.status.as_str() }),
        )
        .await?;
        Ok(updated)
    }

    /// Moves the broadcast into `sending`. The fan-out itself is the
    /// dispatcher's job; this only claims the status and stamps the start.
    pub async fn begin_sending(&self, actor: Uuid, id: Uuid) -> Result<Broadcast> {
        let broadcast = self.stores.broadcasts.fetch(id).await?;
        self.require_channels(&broadcast)?;

        let stamp = TransitionStamp {
            to: BroadcastStatus::Sending,
            scheduled_at: None,
            started_at: Some(Utc::now()),
            completed_at: None,
            actor,
        };
        let updated = self
            .stores
            .broadcasts
            .cas_status(
                id,
                &[BroadcastStatus::Draft, BroadcastStatus::Scheduled],
                stamp,
            )
            .await?
            .ok_or_else(|| conflict(&broadcast, BroadcastStatus::Sending))?;
        self.log(
            &updated,
            LogAction::Send,
            Some(actor),
            json!({ "from": broadcast.status.as_str() }),
        )
        .await?;
        Ok(updated)
    }

    /// Cancels a broadcast that has not started sending. A send in progress
    /// runs to completion; there is no mid-flight abort.
    pub async fn cancel(&self, actor: Uuid, id: Uuid) -> Result<Broadcast> {
        let broadcast = self.stores.broadcasts.fetch(id).await?;
        let stamp = TransitionStamp::to(BroadcastStatus::Canceled, actor);
        let updated = self
            .stores
            .broadcasts
            .cas_status(
                id,
                &[BroadcastStatus::Draft, BroadcastStatus::Scheduled],
                stamp,
            )
            .await?
            .ok_or_else(|| conflict(&broadcast, BroadcastStatus::Canceled))?;
        self.log(
            &updated,
            LogAction::Cancel,
            Some(actor),
            json!({ "from": broadcast.status.as_str() }),
        )
        .await?;
        Ok(updated)
    }

    /// Terminal transition once every produced message is settled.
    pub async fn mark_completed(&self, actor: Uuid, id: Uuid) -> Result<Broadcast> {
        let broadcast = self.stores.broadcasts.fetch(id).await?;
        let stamp = TransitionStamp {
            to: BroadcastStatus::Completed,
            scheduled_at: None,
            started_at: None,
            completed_at: Some(Utc::now()),
            actor,
        };
        let updated = self
            .stores
            .broadcasts
            .cas_status(id, &[BroadcastStatus::Sending], stamp)
            .await?
            .ok_or_else(|| conflict(&broadcast, BroadcastStatus::Completed))?;
        self.log(
            &updated,
            LogAction::Complete,
            Some(actor),
            json!({
                "from": broadcast.status.as_str(),
                "total_recipients": updated.total_recipients,
                "total_sent": updated.total_sent,
                "total_failed": updated.total_failed,
                "total_excluded": updated.total_excluded,
            }),
        )
        .await?;
        Ok(updated)
    }

    /// Records an aborted dispatch. Individual message failures never land
    /// here; only the dispatch process itself dying does.
    pub async fn mark_failed(&self, actor: Uuid, id: Uuid, reason: &str) -> Result<Broadcast> {
        let broadcast = self.stores.broadcasts.fetch(id).await?;
        let stamp = TransitionStamp {
            to: BroadcastStatus::Failed,
            scheduled_at: None,
            started_at: None,
            completed_at: Some(Utc::now()),
            actor,
        };
        let updated = self
            .stores
            .broadcasts
            .cas_status(id, &[BroadcastStatus::Sending], stamp)
            .await?
            .ok_or_else(|| conflict(&broadcast, BroadcastStatus::Failed))?;
        self.log(
            &updated,
            LogAction::Fail,
            Some(actor),
            json!({ "reason": reason, "from": broadcast.status.as_str() }),
        )
        .await?;
        Ok(updated)
    }

    /// Promotes scheduled broadcasts whose time has arrived. Returns the
    /// broadcasts now in `sending`, ready for dispatch.
    pub async fn promote_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Broadcast>> {
        let due = self.stores.broadcasts.due_scheduled(now, limit).await?;
        let mut promoted = Vec::new();
        for broadcast in due {
            let stamp = TransitionStamp {
                to: BroadcastStatus::Sending,
                scheduled_at: None,
                started_at: Some(now),
                completed_at: None,
                actor: SYSTEM_ACTOR,
            };
            // A concurrent cancel or operator send-now loses the race here;
            // skipping is the right outcome for both.
            if let Some(updated) = self
                .stores
                .broadcasts
                .cas_status(broadcast.id, &[BroadcastStatus::Scheduled], stamp)
                .await?
            {
                self.log(
                    &updated,
                    LogAction::Send,
                    None,
                    json!({ "scheduled": true, "from": "scheduled" }),
                )
                .await?;
                promoted.push(updated);
            }
        }
        Ok(promoted)
    }

    pub async fn get(&self, id: Uuid) -> Result<Broadcast> {
        self.stores.broadcasts.fetch(id).await
    }

    pub async fn list(
        &self,
        status: Option<BroadcastStatus>,
        limit: i64,
    ) -> Result<Vec<Broadcast>> {
        self.stores.broadcasts.list(status, limit).await
    }

    pub async fn stats(&self, id: Uuid) -> Result<MessageStats> {
        self.stores.messages.stats_for_broadcast(id).await
    }

    pub async fn logs(&self, broadcast_id: Option<Uuid>, limit: i64) -> Result<Vec<CommLog>> {
        self.stores.comm_logs.list(broadcast_id, limit).await
    }

    /// Authors a reusable template. The variable list is derived from the
    /// body here; broadcasts copy template text at authoring time, so later
    /// template edits never reach them.
    pub async fn create_template(&self, payload: CreateTemplatePayload) -> Result<Template> {
        template_service::validate_structure(&payload.body)?;
        if payload.channel == ChannelKind::Email
            && payload.subject.as_deref().map_or(true, |s| s.trim().is_empty())
        {
            return Err(Error::Template("Email subject is required".to_string()));
        }
        let now = Utc::now();
        let template = Template {
            id: Uuid::new_v4(),
            name: payload.name,
            channel: payload.channel,
            subject: payload.subject,
            variables: template_service::extract_variables(&payload.body),
            body: payload.body,
            is_active: true,
            category: payload.category,
            created_at: now,
            updated_at: now,
        };
        self.stores.templates.insert(&template).await?;
        Ok(template)
    }

    fn require_channels(&self, broadcast: &Broadcast) -> Result<()> {
        if broadcast.channels.is_empty() {
            return Err(Error::BadRequest(
                "broadcast has no channel content".to_string(),
            ));
        }
        Ok(())
    }

    async fn log(
        &self,
        broadcast: &Broadcast,
        action: LogAction,
        actor: Option<Uuid>,
        extra: serde_json::Value,
    ) -> Result<()> {
        let mut details = json!({
            "title": broadcast.title,
            "type": broadcast.kind.as_str(),
            "status": broadcast.status.as_str(),
            "estimated_audience": broadcast.estimated_audience,
        });
        if let (Some(obj), Some(extra)) = (details.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }
        let entry = CommLog::new(Some(broadcast.id), action, details, actor);
        self.stores.comm_logs.append(&entry).await
    }
}

fn conflict(broadcast: &Broadcast, to: BroadcastStatus) -> Error {
    Error::Conflict(format!(
        "cannot move broadcast from {} to {}",
        broadcast.status.as_str(),
        to.as_str()
    ))
}
