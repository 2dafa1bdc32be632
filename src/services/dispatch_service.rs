//! Message fan-out for broadcasts in `sending`: paged audience iteration,
//! bounded-concurrency delivery, per-recipient exclusion rules, and idempotent
//! message production at the (broadcast, recipient, channel) key.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::channels::{ChannelRegistry, Envelope};
use crate::error::{Error, Result};
use crate::models::broadcast::{Broadcast, BroadcastStatus, ChannelKind, ChannelPlan};
use crate::models::message::{exclusion, Message};
use crate::models::notification::NotificationPreferences;
use crate::models::recipient::Recipient;
use crate::services::broadcast_service::BroadcastService;
use crate::services::template_service::{render, TemplateVars};
use crate::store::{InsertOutcome, Stores};

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Delivery attempts beyond the first before a message goes terminal.
    pub max_retries: u32,
    /// Upper bound on concurrently processed recipients.
    pub concurrency: usize,
    /// Audience page size; audiences are never loaded wholesale.
    pub page_size: i64,
    pub webapp_url: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DispatchSummary {
    pub recipients: i64,
    pub sent: i64,
    pub failed: i64,
    pub excluded: i64,
    pub skipped: i64,
}

/// Aggregate result for one recipient across every enabled channel. A
/// recipient counts once toward the broadcast's counters, whichever channels
/// were involved.
enum RecipientOutcome {
    Sent,
    Failed,
    Excluded,
    Skipped,
}

enum ChannelOutcome {
    Sent,
    Failed,
    Excluded,
    AlreadyHandled,
}

#[derive(Clone)]
pub struct DispatchService {
    stores: Stores,
    channels: ChannelRegistry,
    lifecycle: BroadcastService,
    settings: DispatchSettings,
}

impl DispatchService {
    pub fn new(
        stores: Stores,
        channels: ChannelRegistry,
        lifecycle: BroadcastService,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            stores,
            channels,
            lifecycle,
            settings,
        }
    }

    /// Fans a `sending` broadcast out to its audience. Re-running is safe:
    /// pairs that already hold a terminal message are skipped, and a
    /// `completed` broadcast can be re-dispatched as a no-op repair pass.
    pub async fn run(&self, broadcast_id: Uuid, actor: Uuid) -> Result<DispatchSummary> {
        let broadcast = self.stores.broadcasts.fetch(broadcast_id).await?;
        let resumable = matches!(
            broadcast.status,
            BroadcastStatus::Sending | BroadcastStatus::Completed
        );
        if !resumable {
            return Err(Error::Conflict(format!(
                "broadcast is not dispatchable (status: {})",
                broadcast.status.as_str()
            )));
        }
        let finalize = broadcast.status == BroadcastStatus::Sending;

        let total = match self.stores.users.count(&broadcast.audience).await {
            Ok(total) => total,
            Err(e) => return self.abort(broadcast_id, actor, finalize, e).await,
        };
        self.stores
            .broadcasts
            .set_total_recipients(broadcast_id, total)
            .await?;

        tracing::info!(
            broadcast_id = %broadcast_id,
            recipients = total,
            channels = broadcast.channels.len(),
            "dispatching broadcast"
        );

        let broadcast = Arc::new(broadcast);
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut summary = DispatchSummary {
            recipients: total,
            ..Default::default()
        };

        let mut offset = 0;
        loop {
            let page = match self
                .stores
                .users
                .page(&broadcast.audience, offset, self.settings.page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => return self.abort(broadcast_id, actor, finalize, e).await,
            };
            if page.is_empty() {
                break;
            }
            offset += page.len() as i64;

            let mut tasks = JoinSet::new();
            for recipient in page {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::Internal(e.to_string()))?;
                let this = self.clone();
                let broadcast = broadcast.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    this.deliver_recipient(&broadcast, recipient).await
                });
            }
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(RecipientOutcome::Sent) => summary.sent += 1,
                    Ok(RecipientOutcome::Failed) => summary.failed += 1,
                    Ok(RecipientOutcome::Excluded) => summary.excluded += 1,
                    Ok(RecipientOutcome::Skipped) => summary.skipped += 1,
                    Err(e) => {
                        tracing::error!(error = ?e, "dispatch worker panicked");
                        summary.failed += 1;
                    }
                }
            }
        }

        if finalize {
            self.lifecycle
                .mark_completed(actor, broadcast_id)
                .await?;
        }
        tracing::info!(
            broadcast_id = %broadcast_id,
            sent = summary.sent,
            failed = summary.failed,
            excluded = summary.excluded,
            skipped = summary.skipped,
            "broadcast dispatch finished"
        );
        Ok(summary)
    }

    /// Audience resolution died; the dispatch itself is the failure, not any
    /// individual message.
    async fn abort(
        &self,
        broadcast_id: Uuid,
        actor: Uuid,
        finalize: bool,
        cause: Error,
    ) -> Result<DispatchSummary> {
        tracing::error!(broadcast_id = %broadcast_id, error = %cause, "dispatch aborted");
        if finalize {
            let _ = self
                .lifecycle
                .mark_failed(actor, broadcast_id, &cause.to_string())
                .await;
        }
        Err(cause)
    }

    /// One recipient, every enabled channel. Never returns an error: a
    /// recipient's troubles stay its own and are folded into its outcome.
    async fn deliver_recipient(&self, broadcast: &Broadcast, recipient: Recipient) -> RecipientOutcome {
        let prefs = match self.stores.preferences.fetch(recipient.id).await {
            Ok(Some(prefs)) => prefs,
            Ok(None) => NotificationPreferences::default_for(recipient.id),
            Err(e) => {
                tracing::warn!(recipient = %recipient.id, error = %e, "preference lookup failed, using defaults");
                NotificationPreferences::default_for(recipient.id)
            }
        };

        let mut any_sent = false;
        let mut any_failed = false;
        let mut any_excluded = false;
        for plan in &broadcast.channels {
            match self
                .deliver_channel(broadcast, &recipient, &prefs, plan)
                .await
            {
                ChannelOutcome::Sent => any_sent = true,
                ChannelOutcome::Failed => any_failed = true,
                ChannelOutcome::Excluded => any_excluded = true,
                ChannelOutcome::AlreadyHandled => {}
            }
        }

        let outcome = if any_sent {
            RecipientOutcome::Sent
        } else if any_failed {
            RecipientOutcome::Failed
        } else if any_excluded {
            RecipientOutcome::Excluded
        } else {
            // Every channel was settled by an earlier run; the recipient was
            // already counted then.
            return RecipientOutcome::Skipped;
        };

        let (sent, failed, excluded) = match outcome {
            RecipientOutcome::Sent => (1, 0, 0),
            RecipientOutcome::Failed => (0, 1, 0),
            RecipientOutcome::Excluded => (0, 0, 1),
            RecipientOutcome::Skipped => (0, 0, 0),
        };
        if let Err(e) = self
            .stores
            .broadcasts
            .add_counters(broadcast.id, sent, failed, excluded)
            .await
        {
            tracing::error!(broadcast_id = %broadcast.id, error = %e, "counter update failed");
        }
        outcome
    }

    async fn deliver_channel(
        &self,
        broadcast: &Broadcast,
        recipient: &Recipient,
        prefs: &NotificationPreferences,
        plan: &ChannelPlan,
    ) -> ChannelOutcome {
        let kind = plan.kind();

        let exclusion_reason = if kind.contact_address(recipient).is_none() {
            Some(exclusion::MISSING_CONTACT)
        } else if !prefs.allows_broadcast(broadcast.kind)
            || (kind == ChannelKind::Email && !prefs.email_enabled)
        {
            Some(exclusion::PREFERENCE_DISABLED)
        } else {
            None
        };

        if let Some(reason) = exclusion_reason {
            let message = Message::excluded(Some(broadcast.id), recipient.id, kind, reason);
            return match self.stores.messages.try_insert(&message).await {
                Ok(InsertOutcome::Inserted(_)) => ChannelOutcome::Excluded,
                Ok(InsertOutcome::Exists(_)) => ChannelOutcome::AlreadyHandled,
                Err(e) => {
                    tracing::error!(recipient = %recipient.id, channel = %kind, error = %e, "exclusion write failed");
                    ChannelOutcome::Failed
                }
            };
        }

        let vars = self.broadcast_vars(broadcast, recipient);
        let subject = plan.subject().map(|s| render(s, &vars));
        let body = render(plan.body(), &vars);

        let message = Message::pending(
            Some(broadcast.id),
            recipient.id,
            kind,
            subject.clone(),
            body.clone(),
        );
        let message = match self.stores.messages.try_insert(&message).await {
            Ok(InsertOutcome::Inserted(m)) => m,
            Ok(InsertOutcome::Exists(existing)) => {
                if existing.status.is_terminal() {
                    return ChannelOutcome::AlreadyHandled;
                }
                // A pending row from an interrupted run; pick it back up.
                existing
            }
            Err(e) => {
                tracing::error!(recipient = %recipient.id, channel = %kind, error = %e, "message insert failed");
                return ChannelOutcome::Failed;
            }
        };

        let Some(adapter) = self.channels.get(kind) else {
            let _ = self
                .stores
                .messages
                .record_failure(message.id, "no adapter registered for channel", true)
                .await;
            return ChannelOutcome::Failed;
        };

        let envelope = Envelope {
            recipient: recipient.clone(),
            kind: broadcast.kind.as_str().to_string(),
            subject,
            body,
            link: Some(self.settings.webapp_url.clone()),
            metadata: json!({ "broadcast_id": broadcast.id }),
        };

        let mut attempts = message.retry_count as u32;
        loop {
            match adapter.deliver(&envelope).await {
                Ok(()) => {
                    if let Err(e) = self.stores.messages.mark_sent(message.id, Utc::now()).await {
                        tracing::error!(message = %message.id, error = %e, "mark_sent failed");
                    }
                    return ChannelOutcome::Sent;
                }
                Err(err) => {
                    attempts += 1;
                    let terminal = attempts > self.settings.max_retries;
                    if let Err(e) = self
                        .stores
                        .messages
                        .record_failure(message.id, &err.0, terminal)
                        .await
                    {
                        tracing::error!(message = %message.id, error = %e, "failure record failed");
                        return ChannelOutcome::Failed;
                    }
                    if terminal {
                        tracing::warn!(
                            message = %message.id,
                            channel = %kind,
                            attempts,
                            "delivery gave up after retry ceiling"
                        );
                        return ChannelOutcome::Failed;
                    }
                }
            }
        }
    }

    /// Fixed variable vocabulary for broadcast templates.
    fn broadcast_vars(&self, broadcast: &Broadcast, recipient: &Recipient) -> TemplateVars {
        TemplateVars::new()
            .with("prenom", recipient.first_name.as_str())
            .with("nom", recipient.last_name.as_str())
            .with("role", recipient.role.as_str())
            .with("lien", self.settings.webapp_url.as_str())
            .with(
                "message",
                broadcast.description.clone().unwrap_or_default(),
            )
            .with("date", Utc::now().format("%d/%m/%Y").to_string())
    }
}
