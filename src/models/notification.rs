use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::broadcast::BroadcastKind;

/// Registry of transactional event kinds. Each kind has a default template
/// and channel set owned by the notify service; callers never supply content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    InterviewScheduled,
    InterviewReminder24h,
    InterviewReminder2h,
    InterviewCancelled,
    InterviewRescheduled,
    ApplicationStatusUpdate,
    MessageReceived,
    JobClosed,
    CreditsValidated,
    CreditsRejected,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::InterviewScheduled => "interview_scheduled",
            EventKind::InterviewReminder24h => "interview_reminder_24h",
            EventKind::InterviewReminder2h => "interview_reminder_2h",
            EventKind::InterviewCancelled => "interview_cancelled",
            EventKind::InterviewRescheduled => "interview_rescheduled",
            EventKind::ApplicationStatusUpdate => "application_status_update",
            EventKind::MessageReceived => "message_received",
            EventKind::JobClosed => "job_closed",
            EventKind::CreditsValidated => "credits_validated",
            EventKind::CreditsRejected => "credits_rejected",
        }
    }

    pub fn is_interview(&self) -> bool {
        matches!(
            self,
            EventKind::InterviewScheduled
                | EventKind::InterviewReminder24h
                | EventKind::InterviewReminder2h
                | EventKind::InterviewCancelled
                | EventKind::InterviewRescheduled
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "interview_scheduled" => Some(EventKind::InterviewScheduled),
            "interview_reminder_24h" => Some(EventKind::InterviewReminder24h),
            "interview_reminder_2h" => Some(EventKind::InterviewReminder2h),
            "interview_cancelled" => Some(EventKind::InterviewCancelled),
            "interview_rescheduled" => Some(EventKind::InterviewRescheduled),
            "application_status_update" => Some(EventKind::ApplicationStatusUpdate),
            "message_received" => Some(EventKind::MessageReceived),
            "job_closed" => Some(EventKind::JobClosed),
            "credits_validated" => Some(EventKind::CreditsValidated),
            "credits_rejected" => Some(EventKind::CreditsRejected),
            _ => None,
        }
    }
}

/// An in-app inbox entry, owned by its recipient once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub read: bool,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Per-recipient delivery gates. One record per recipient, created lazily
/// with every gate open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub recipient_id: Uuid,
    pub email_enabled: bool,
    pub push_enabled: bool,
    pub announcements: bool,
    pub promotions: bool,
    pub application_updates: bool,
    pub message_alerts: bool,
    pub interview_alerts: bool,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreferences {
    pub fn default_for(recipient_id: Uuid) -> Self {
        Self {
            recipient_id,
            email_enabled: true,
            push_enabled: true,
            announcements: true,
            promotions: true,
            application_updates: true,
            message_alerts: true,
            interview_alerts: true,
            updated_at: Utc::now(),
        }
    }

    /// Category gate for an admin broadcast. Operational kinds bypass gates.
    pub fn allows_broadcast(&self, kind: BroadcastKind) -> bool {
        if kind.bypasses_preferences() {
            return true;
        }
        match kind {
            BroadcastKind::Promotion => self.promotions,
            BroadcastKind::SystemInfo | BroadcastKind::Institutional => self.announcements,
            _ => true,
        }
    }
}
