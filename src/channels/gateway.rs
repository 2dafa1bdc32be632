use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::channels::{ChannelAdapter, DeliveryError, DeliveryResult, Envelope};
use crate::models::broadcast::ChannelKind;

/// External-transport stub: posts the rendered message as JSON to a
/// configured gateway with a shared-secret header and treats any 2xx as
/// delivered. The gateway's own protocol (SMTP, SMS, WhatsApp API) stays
/// behind that URL.
#[derive(Clone)]
pub struct GatewayChannel {
    kind: ChannelKind,
    client: Client,
    target_url: String,
    secret: String,
}

impl GatewayChannel {
    pub fn new(kind: ChannelKind, target_url: String, secret: String) -> Self {
        Self {
            kind,
            client: Client::new(),
            target_url,
            secret,
        }
    }

    pub fn email(target_url: String, secret: String) -> Self {
        Self::new(ChannelKind::Email, target_url, secret)
    }

    pub fn sms(target_url: String, secret: String) -> Self {
        Self::new(ChannelKind::Sms, target_url, secret)
    }

    pub fn whatsapp(target_url: String, secret: String) -> Self {
        Self::new(ChannelKind::Whatsapp, target_url, secret)
    }
}

#[async_trait]
impl ChannelAdapter for GatewayChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn deliver(&self, envelope: &Envelope) -> DeliveryResult {
        let Some(address) = self.kind.contact_address(&envelope.recipient) else {
            return Err(DeliveryError(format!(
                "recipient has no {} address",
                self.kind
            )));
        };

        let payload = json!({
            "to": address,
            "subject": envelope.subject,
            "body": envelope.body,
            "kind": envelope.kind,
        });

        let response = self
            .client
            .post(&self.target_url)
            .header("X-Gateway-Secret", &self.secret)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(DeliveryError(format!(
                "gateway returned {}",
                response.status()
            )))
        }
    }
}
