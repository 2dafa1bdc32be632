use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::notification::EventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderKind {
    #[serde(rename = "24h")]
    DayBefore,
    #[serde(rename = "2h")]
    TwoHours,
}

impl ReminderKind {
    pub const ALL: [ReminderKind; 2] = [ReminderKind::DayBefore, ReminderKind::TwoHours];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::DayBefore => "24h",
            ReminderKind::TwoHours => "2h",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "24h" => Some(ReminderKind::DayBefore),
            "2h" => Some(ReminderKind::TwoHours),
            _ => None,
        }
    }

    /// Lead time before the interview at which this reminder fires.
    pub fn lead_time(&self) -> Duration {
        match self {
            ReminderKind::DayBefore => Duration::hours(24),
            ReminderKind::TwoHours => Duration::hours(2),
        }
    }

    pub fn event_kind(&self) -> EventKind {
        match self {
            ReminderKind::DayBefore => EventKind::InterviewReminder24h,
            ReminderKind::TwoHours => EventKind::InterviewReminder2h,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    Sent,
    Failed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Sent => "sent",
            ReminderStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReminderStatus::Pending),
            "sent" => Some(ReminderStatus::Sent),
            "failed" => Some(ReminderStatus::Failed),
            _ => None,
        }
    }
}

/// A future reminder for one interview. At most one pending reminder of a
/// given kind exists per interview; rescheduling replaces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewReminder {
    pub id: Uuid,
    pub interview_id: Uuid,
    pub kind: ReminderKind,
    pub scheduled_for: DateTime<Utc>,
    pub status: ReminderStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InterviewReminder {
    pub fn pending(interview_id: Uuid, kind: ReminderKind, interview_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            interview_id,
            kind,
            scheduled_for: interview_at - kind.lead_time(),
            status: ReminderStatus::Pending,
            sent_at: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}
