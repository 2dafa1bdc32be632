use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::broadcast::ChannelKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Create,
    Update,
    Send,
    Cancel,
    Schedule,
    Complete,
    Fail,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogAction::Create => "create",
            LogAction::Update => "update",
            LogAction::Send => "send",
            LogAction::Cancel => "cancel",
            LogAction::Schedule => "schedule",
            LogAction::Complete => "complete",
            LogAction::Fail => "fail",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(LogAction::Create),
            "update" => Some(LogAction::Update),
            "send" => Some(LogAction::Send),
            "cancel" => Some(LogAction::Cancel),
            "schedule" => Some(LogAction::Schedule),
            "complete" => Some(LogAction::Complete),
            "fail" => Some(LogAction::Fail),
            _ => None,
        }
    }
}

/// Append-only audit trail for broadcast lifecycle actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommLog {
    pub id: Uuid,
    pub broadcast_id: Option<Uuid>,
    pub action: LogAction,
    pub details: JsonValue,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl CommLog {
    pub fn new(
        broadcast_id: Option<Uuid>,
        action: LogAction,
        details: JsonValue,
        actor_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            broadcast_id,
            action,
            details,
            actor_id,
            created_at: Utc::now(),
        }
    }
}

/// Per-case communication history: every transactional send tied to an
/// application or interview lands here so the full exchange can be
/// reconstructed later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationEntry {
    pub id: Uuid,
    pub application_id: Option<Uuid>,
    pub interview_id: Option<Uuid>,
    pub sender_id: Option<Uuid>,
    pub recipient_id: Uuid,
    pub event: String,
    pub channel: ChannelKind,
    pub subject: Option<String>,
    pub body: String,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
}
