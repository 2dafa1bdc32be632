//! Delivery channel adapters. One adapter per channel kind; the dispatcher
//! and the notify service talk to the `ChannelAdapter` trait only, so real
//! transports can replace the stubs without touching dispatch logic.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::broadcast::ChannelKind;
use crate::models::recipient::Recipient;

pub mod gateway;
pub mod in_app;

pub use gateway::GatewayChannel;
pub use in_app::InAppChannel;

/// One rendered message on its way to one recipient over one channel.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub recipient: Recipient,
    pub kind: String,
    pub subject: Option<String>,
    pub body: String,
    pub link: Option<String>,
    pub metadata: JsonValue,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DeliveryError(pub String);

pub type DeliveryResult = std::result::Result<(), DeliveryError>;

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn deliver(&self, envelope: &Envelope) -> DeliveryResult;
}

/// Adapter lookup by channel kind.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    adapters: HashMap<ChannelKind, Arc<dyn ChannelAdapter>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn get(&self, kind: ChannelKind) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(&kind).cloned()
    }
}
