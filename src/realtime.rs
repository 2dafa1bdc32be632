//! In-process change feed for in-app notifications. The inbox feed depends
//! only on the `Subscriber` trait, so a backend-specific push mechanism can
//! replace `ChangeHub` without touching the feed logic.

use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::notification::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A row-level change to one recipient's notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub notification: Notification,
}

impl ChangeEvent {
    pub fn recipient_id(&self) -> Uuid {
        self.notification.recipient_id
    }
}

pub trait Subscriber: Send + Sync {
    /// Stream of changes scoped to one recipient. Subscribing before reading
    /// the initial snapshot is what keeps the feed gap-free.
    fn subscribe(&self, recipient_id: Uuid) -> BoxStream<'static, ChangeEvent>;
}

/// Fan-out hub over a tokio broadcast channel. Publishing never blocks; a
/// lagging subscriber skips missed events rather than stalling senders.
#[derive(Clone)]
pub struct ChangeHub {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, kind: ChangeKind, notification: Notification) {
        let _ = self.tx.send(ChangeEvent { kind, notification });
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Subscriber for ChangeHub {
    fn subscribe(&self, recipient_id: Uuid) -> BoxStream<'static, ChangeEvent> {
        let rx = self.tx.subscribe();
        futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .filter(move |event| futures::future::ready(event.recipient_id() == recipient_id))
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn notification(recipient_id: Uuid) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient_id,
            kind: "message".to_string(),
            title: "Titre".to_string(),
            message: "Corps".to_string(),
            link: None,
            read: false,
            metadata: json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn subscription_filters_by_recipient() {
        tokio_test::block_on(async {
            let hub = ChangeHub::new(16);
            let mine = Uuid::new_v4();
            let other = Uuid::new_v4();
            let mut stream = hub.subscribe(mine);

            hub.publish(ChangeKind::Created, notification(other));
            hub.publish(ChangeKind::Created, notification(mine));

            let event = stream.next().await.expect("event");
            assert_eq!(event.recipient_id(), mine);
            assert_eq!(event.kind, ChangeKind::Created);
        });
    }
}
