use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::broadcast::ChannelKind;

pub mod exclusion {
    pub const MISSING_CONTACT: &str = "missing contact";
    pub const PREFERENCE_DISABLED: &str = "preference disabled";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
    Excluded,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sent => "sent",
            MessageStatus::Failed => "failed",
            MessageStatus::Excluded => "excluded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MessageStatus::Pending),
            "sent" => Some(MessageStatus::Sent),
            "failed" => Some(MessageStatus::Failed),
            "excluded" => Some(MessageStatus::Excluded),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Pending)
    }
}

/// One rendered delivery attempt for one (recipient, channel) pair.
/// `broadcast_id` is None for transactional sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub broadcast_id: Option<Uuid>,
    pub recipient_id: Uuid,
    pub channel: ChannelKind,
    pub subject: Option<String>,
    pub body: String,
    pub status: MessageStatus,
    pub exclusion_reason: Option<String>,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn pending(
        broadcast_id: Option<Uuid>,
        recipient_id: Uuid,
        channel: ChannelKind,
        subject: Option<String>,
        body: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            broadcast_id,
            recipient_id,
            channel,
            subject,
            body,
            status: MessageStatus::Pending,
            exclusion_reason: None,
            retry_count: 0,
            error_message: None,
            sent_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn excluded(
        broadcast_id: Option<Uuid>,
        recipient_id: Uuid,
        channel: ChannelKind,
        reason: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            broadcast_id,
            recipient_id,
            channel,
            subject: None,
            body: String::new(),
            status: MessageStatus::Excluded,
            exclusion_reason: Some(reason.to_string()),
            retry_count: 0,
            error_message: None,
            sent_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Aggregated message counts for one broadcast.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageStats {
    pub total: i64,
    pub by_status: HashMap<String, i64>,
    pub by_channel: HashMap<String, i64>,
}
