use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::recipient::Recipient;

/// Delivery medium for one rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    #[serde(rename = "notification")]
    InApp,
    Email,
    Sms,
    Whatsapp,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::InApp => "notification",
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
            ChannelKind::Whatsapp => "whatsapp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "notification" => Some(ChannelKind::InApp),
            "email" => Some(ChannelKind::Email),
            "sms" => Some(ChannelKind::Sms),
            "whatsapp" => Some(ChannelKind::Whatsapp),
            _ => None,
        }
    }

    /// The contact field a recipient must have for this channel to be usable.
    pub fn contact_address(&self, recipient: &Recipient) -> Option<String> {
        match self {
            ChannelKind::InApp => Some(recipient.id.to_string()),
            ChannelKind::Email => recipient.email.clone(),
            ChannelKind::Sms | ChannelKind::Whatsapp => recipient.phone.clone(),
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastStatus {
    Draft,
    Scheduled,
    Sending,
    Completed,
    Failed,
    Canceled,
}

impl BroadcastStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastStatus::Draft => "draft",
            BroadcastStatus::Scheduled => "scheduled",
            BroadcastStatus::Sending => "sending",
            BroadcastStatus::Completed => "completed",
            BroadcastStatus::Failed => "failed",
            BroadcastStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(BroadcastStatus::Draft),
            "scheduled" => Some(BroadcastStatus::Scheduled),
            "sending" => Some(BroadcastStatus::Sending),
            "completed" => Some(BroadcastStatus::Completed),
            "failed" => Some(BroadcastStatus::Failed),
            "canceled" => Some(BroadcastStatus::Canceled),
            _ => None,
        }
    }

    /// Legal lifecycle edges. A send in progress cannot be aborted, so
    /// `Sending` never leads back to `Canceled`.
    pub fn can_transition(self, to: BroadcastStatus) -> bool {
        use BroadcastStatus::*;
        matches!(
            (self, to),
            (Draft, Scheduled)
                | (Draft, Sending)
                | (Scheduled, Sending)
                | (Sending, Completed)
                | (Sending, Failed)
                | (Draft, Canceled)
                | (Scheduled, Canceled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastKind {
    SystemInfo,
    ImportantNotice,
    Promotion,
    MaintenanceAlert,
    Institutional,
}

impl BroadcastKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastKind::SystemInfo => "system_info",
            BroadcastKind::ImportantNotice => "important_notice",
            BroadcastKind::Promotion => "promotion",
            BroadcastKind::MaintenanceAlert => "maintenance_alert",
            BroadcastKind::Institutional => "institutional",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system_info" => Some(BroadcastKind::SystemInfo),
            "important_notice" => Some(BroadcastKind::ImportantNotice),
            "promotion" => Some(BroadcastKind::Promotion),
            "maintenance_alert" => Some(BroadcastKind::MaintenanceAlert),
            "institutional" => Some(BroadcastKind::Institutional),
            _ => None,
        }
    }

    /// Operational traffic is delivered regardless of category preferences.
    pub fn bypasses_preferences(&self) -> bool {
        matches!(
            self,
            BroadcastKind::ImportantNotice | BroadcastKind::MaintenanceAlert
        )
    }
}

/// Declarative audience filter. Unset fields impose no constraint; all set
/// fields are AND-combined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudienceFilter {
    #[serde(default)]
    pub roles: Vec<String>,
    pub min_completion: Option<i32>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub language: Option<String>,
}

impl AudienceFilter {
    pub fn matches(&self, r: &Recipient) -> bool {
        if !self.roles.is_empty() && !self.roles.iter().any(|role| role == &r.role) {
            return false;
        }
        if let Some(min) = self.min_completion {
            if r.profile_completion < min {
                return false;
            }
        }
        if let Some(ref country) = self.country {
            if r.country.as_deref() != Some(country.as_str()) {
                return false;
            }
        }
        if let Some(ref region) = self.region {
            if r.region.as_deref() != Some(region.as_str()) {
                return false;
            }
        }
        if let Some(ref city) = self.city {
            if r.city.as_deref() != Some(city.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.created_from {
            if r.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.created_to {
            if r.created_at > to {
                return false;
            }
        }
        if let Some(ref language) = self.language {
            if r.language.as_deref() != Some(language.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Authored content for one channel of a broadcast. Presence in the
/// broadcast's channel list is what "enabled" means; each variant carries
/// exactly the fields its channel requires, so a missing email subject is a
/// shape error rather than a runtime check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum ChannelPlan {
    Email {
        subject: String,
        body: String,
        template_id: Option<Uuid>,
    },
    Sms {
        body: String,
        template_id: Option<Uuid>,
    },
    Whatsapp {
        body: String,
        template_id: Option<Uuid>,
    },
    #[serde(rename = "notification")]
    InApp {
        subject: Option<String>,
        body: String,
        template_id: Option<Uuid>,
    },
}

impl ChannelPlan {
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelPlan::Email { .. } => ChannelKind::Email,
            ChannelPlan::Sms { .. } => ChannelKind::Sms,
            ChannelPlan::Whatsapp { .. } => ChannelKind::Whatsapp,
            ChannelPlan::InApp { .. } => ChannelKind::InApp,
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match self {
            ChannelPlan::Email { subject, .. } => Some(subject.as_str()),
            ChannelPlan::InApp { subject, .. } => subject.as_deref(),
            _ => None,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            ChannelPlan::Email { body, .. }
            | ChannelPlan::Sms { body, .. }
            | ChannelPlan::Whatsapp { body, .. }
            | ChannelPlan::InApp { body, .. } => body.as_str(),
        }
    }

    pub fn template_id(&self) -> Option<Uuid> {
        match self {
            ChannelPlan::Email { template_id, .. }
            | ChannelPlan::Sms { template_id, .. }
            | ChannelPlan::Whatsapp { template_id, .. }
            | ChannelPlan::InApp { template_id, .. } => *template_id,
        }
    }
}

/// An admin-authored multi-recipient communication and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broadcast {
    pub id: Uuid,
    pub title: String,
    pub kind: BroadcastKind,
    pub description: Option<String>,
    pub audience: AudienceFilter,
    pub estimated_audience: i64,
    pub channels: Vec<ChannelPlan>,
    pub status: BroadcastStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_recipients: i64,
    pub total_sent: i64,
    pub total_failed: i64,
    pub total_excluded: i64,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Broadcast {
    pub fn plan_for(&self, kind: ChannelKind) -> Option<&ChannelPlan> {
        self.channels.iter().find(|p| p.kind() == kind)
    }
}
