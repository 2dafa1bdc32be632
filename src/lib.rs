pub mod channels;
pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod services;
pub mod store;

use std::sync::Arc;

use crate::channels::{ChannelRegistry, GatewayChannel, InAppChannel};
use crate::realtime::ChangeHub;
use crate::services::{
    audience_service::AudienceService, broadcast_service::BroadcastService,
    dispatch_service::{DispatchService, DispatchSettings}, inbox_service::InboxService,
    notify_service::NotifyService, reminder_service::ReminderService,
};
use crate::store::Stores;
use sqlx::PgPool;

/// Engine-wide tunables, sourced from config in the binary and set directly
/// by tests.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub delivery_max_retries: u32,
    pub fanout_concurrency: usize,
    pub audience_page_size: i64,
    pub inbox_window: usize,
    pub webapp_url: String,
}

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub hub: ChangeHub,
    pub audience: AudienceService,
    pub broadcasts: BroadcastService,
    pub dispatch: DispatchService,
    pub notify: NotifyService,
    pub reminders: ReminderService,
    pub inbox: InboxService,
}

impl AppState {
    /// Wires the services over any store bundle and adapter registry.
    pub fn build(
        stores: Stores,
        hub: ChangeHub,
        channels: ChannelRegistry,
        settings: EngineSettings,
    ) -> Self {
        let audience = AudienceService::new(stores.users.clone());
        let broadcasts = BroadcastService::new(stores.clone(), audience.clone());
        let dispatch = DispatchService::new(
            stores.clone(),
            channels.clone(),
            broadcasts.clone(),
            DispatchSettings {
                max_retries: settings.delivery_max_retries,
                concurrency: settings.fanout_concurrency,
                page_size: settings.audience_page_size,
                webapp_url: settings.webapp_url.clone(),
            },
        );
        let notify = NotifyService::new(stores.clone(), channels, settings.webapp_url.clone());
        let reminders = ReminderService::new(stores.clone(), notify.clone());
        let inbox = InboxService::new(stores.clone(), hub.clone(), settings.inbox_window);
        Self {
            stores,
            hub,
            audience,
            broadcasts,
            dispatch,
            notify,
            reminders,
            inbox,
        }
    }

    /// Production wiring: Postgres stores plus the configured channel
    /// adapters (in-app always; external gateways only when configured).
    pub fn postgres(pool: PgPool) -> Self {
        let config = crate::config::get_config();
        let stores = crate::store::postgres::PgStore::stores(pool);
        let hub = ChangeHub::default();

        let mut registry = ChannelRegistry::new()
            .register(Arc::new(InAppChannel::new(stores.notifications.clone(), hub.clone())));
        if let Some(ref url) = config.email_gateway_url {
            registry = registry.register(Arc::new(GatewayChannel::email(
                url.clone(),
                config.gateway_secret.clone(),
            )));
        }
        if let Some(ref url) = config.sms_gateway_url {
            registry = registry.register(Arc::new(GatewayChannel::sms(
                url.clone(),
                config.gateway_secret.clone(),
            )));
        }
        if let Some(ref url) = config.whatsapp_gateway_url {
            registry = registry.register(Arc::new(GatewayChannel::whatsapp(
                url.clone(),
                config.gateway_secret.clone(),
            )));
        }

        let settings = EngineSettings {
            delivery_max_retries: config.delivery_max_retries,
            fanout_concurrency: config.fanout_concurrency,
            audience_page_size: config.audience_page_size,
            inbox_window: config.inbox_window,
            webapp_url: config.webapp_url.clone(),
        };
        Self::build(stores, hub, registry, settings)
    }
}
