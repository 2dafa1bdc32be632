//! Recipient-side inbox: a realtime-fed local cache of recent notifications,
//! an unread counter, and the preference record gating future dispatches.

use futures::stream::{BoxStream, StreamExt};
use uuid::Uuid;

use crate::dto::inbox_dto::PreferencesUpdate;
use crate::error::Result;
use crate::models::notification::{Notification, NotificationPreferences};
use crate::realtime::{ChangeEvent, ChangeHub, ChangeKind, Subscriber};
use crate::store::Stores;

#[derive(Clone)]
pub struct InboxService {
    stores: Stores,
    hub: ChangeHub,
    window: usize,
}

impl InboxService {
    pub fn new(stores: Stores, hub: ChangeHub, window: usize) -> Self {
        Self { stores, hub, window }
    }

    /// Opens a live feed for one recipient. The subscription is taken before
    /// the initial snapshot is read, so no event can fall into the gap.
    pub async fn open_feed(&self, recipient_id: Uuid) -> Result<InboxFeed> {
        let stream = self.hub.subscribe(recipient_id);
        let items = self
            .stores
            .notifications
            .list_recent(recipient_id, self.window as i64)
            .await?;
        let unread = self.stores.notifications.unread_count(recipient_id).await?;
        Ok(InboxFeed {
            recipient_id,
            window: self.window,
            service: self.clone(),
            stream,
            items,
            unread,
        })
    }

    pub async fn list(&self, recipient_id: Uuid, limit: i64) -> Result<Vec<Notification>> {
        self.stores.notifications.list_recent(recipient_id, limit).await
    }

    pub async fn unread_count(&self, recipient_id: Uuid) -> Result<i64> {
        self.stores.notifications.unread_count(recipient_id).await
    }

    pub async fn mark_read(&self, recipient_id: Uuid, id: Uuid) -> Result<Option<Notification>> {
        let updated = self.stores.notifications.mark_read(id, recipient_id).await?;
        if let Some(ref n) = updated {
            self.hub.publish(ChangeKind::Updated, n.clone());
        }
        Ok(updated)
    }

    pub async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64> {
        // Snapshot the unread rows first so their updates can be pushed to
        // live feeds after the bulk write.
        let recent = self
            .stores
            .notifications
            .list_recent(recipient_id, self.window as i64)
            .await?;
        let updated = self.stores.notifications.mark_all_read(recipient_id).await?;
        for mut n in recent.into_iter().filter(|n| !n.read) {
            n.read = true;
            self.hub.publish(ChangeKind::Updated, n);
        }
        Ok(updated)
    }

    pub async fn delete(&self, recipient_id: Uuid, id: Uuid) -> Result<Option<Notification>> {
        let removed = self.stores.notifications.delete(id, recipient_id).await?;
        if let Some(ref n) = removed {
            self.hub.publish(ChangeKind::Deleted, n.clone());
        }
        Ok(removed)
    }

    /// Preferences are created lazily with every gate open the first time a
    /// recipient touches them.
    pub async fn preferences(&self, recipient_id: Uuid) -> Result<NotificationPreferences> {
        if let Some(prefs) = self.stores.preferences.fetch(recipient_id).await? {
            return Ok(prefs);
        }
        let prefs = NotificationPreferences::default_for(recipient_id);
        self.stores.preferences.upsert(&prefs).await?;
        Ok(prefs)
    }

    /// Toggles apply to future dispatches only; messages already produced are
    /// untouched.
    pub async fn update_preferences(
        &self,
        recipient_id: Uuid,
        update: PreferencesUpdate,
    ) -> Result<NotificationPreferences> {
        let mut prefs = self.preferences(recipient_id).await?;
        update.apply(&mut prefs);
        self.stores.preferences.upsert(&prefs).await?;
        Ok(prefs)
    }
}

/// One recipient's live inbox: bounded most-recent-first cache plus unread
/// counter, updated optimistically by local actions and incrementally by
/// change events.
pub struct InboxFeed {
    recipient_id: Uuid,
    window: usize,
    service: InboxService,
    stream: BoxStream<'static, ChangeEvent>,
    items: Vec<Notification>,
    unread: i64,
}

impl InboxFeed {
    pub fn recipient_id(&self) -> Uuid {
        self.recipient_id
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread_count(&self) -> i64 {
        self.unread
    }

    /// Waits for the next change event and folds it into the cache.
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        let event = self.stream.next().await?;
        self.apply(&event);
        Some(event)
    }

    fn apply(&mut self, event: &ChangeEvent) {
        match event.kind {
            ChangeKind::Created => {
                if self.items.iter().any(|n| n.id == event.notification.id) {
                    return;
                }
                if !event.notification.read {
                    self.unread += 1;
                }
                self.items.insert(0, event.notification.clone());
                self.items
                    .sort_by(|a, b| b.created_at.cmp(&a.created_at));
                self.items.truncate(self.window);
            }
            ChangeKind::Updated => {
                if let Some(cached) = self
                    .items
                    .iter_mut()
                    .find(|n| n.id == event.notification.id)
                {
                    if !cached.read && event.notification.read {
                        self.unread = (self.unread - 1).max(0);
                    }
                    *cached = event.notification.clone();
                }
            }
            ChangeKind::Deleted => {
                if let Some(pos) = self
                    .items
                    .iter()
                    .position(|n| n.id == event.notification.id)
                {
                    if !self.items[pos].read {
                        self.unread = (self.unread - 1).max(0);
                    }
                    self.items.remove(pos);
                }
            }
        }
    }

    /// Optimistic mark-as-read: the cache and counter move first, then the
    /// change is persisted. The echoed change event is a no-op because the
    /// cached item is already read.
    pub async fn mark_read(&mut self, id: Uuid) -> Result<()> {
        if let Some(cached) = self.items.iter_mut().find(|n| n.id == id) {
            if !cached.read {
                cached.read = true;
                self.unread = (self.unread - 1).max(0);
            }
        }
        self.service.mark_read(self.recipient_id, id).await?;
        Ok(())
    }

    pub async fn mark_all_read(&mut self) -> Result<()> {
        for n in &mut self.items {
            n.read = true;
        }
        self.unread = 0;
        self.service.mark_all_read(self.recipient_id).await?;
        Ok(())
    }

    pub async fn delete(&mut self, id: Uuid) -> Result<()> {
        if let Some(pos) = self.items.iter().position(|n| n.id == id) {
            if !self.items[pos].read {
                self.unread = (self.unread - 1).max(0);
            }
            self.items.remove(pos);
        }
        self.service.delete(self.recipient_id, id).await?;
        Ok(())
    }
}
