use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::channels::{ChannelAdapter, DeliveryError, DeliveryResult, Envelope};
use crate::models::broadcast::ChannelKind;
use crate::models::notification::Notification;
use crate::realtime::{ChangeHub, ChangeKind};
use crate::store::NotificationRepo;

/// The in-app channel writes an inbox row and pushes it onto the change
/// feed; there is no external transport to fail independently.
#[derive(Clone)]
pub struct InAppChannel {
    notifications: Arc<dyn NotificationRepo>,
    hub: ChangeHub,
}

impl InAppChannel {
    pub fn new(notifications: Arc<dyn NotificationRepo>, hub: ChangeHub) -> Self {
        Self { notifications, hub }
    }
}

#[async_trait]
impl ChannelAdapter for InAppChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::InApp
    }

    async fn deliver(&self, envelope: &Envelope) -> DeliveryResult {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id: envelope.recipient.id,
            kind: envelope.kind.clone(),
            title: envelope
                .subject
                .clone()
                .unwrap_or_else(|| envelope.kind.clone()),
            message: envelope.body.clone(),
            link: envelope.link.clone(),
            read: false,
            metadata: envelope.metadata.clone(),
            created_at: Utc::now(),
        };
        self.notifications
            .insert(&notification)
            .await
            .map_err(|e| DeliveryError(e.to_string()))?;
        self.hub.publish(ChangeKind::Created, notification);
        Ok(())
    }
}
