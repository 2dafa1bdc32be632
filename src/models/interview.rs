use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How an interview is held. Exactly one modality applies, which is what
/// keeps the template's modality flags mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Visio,
    Presentiel,
    Telephone,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Visio => "visio",
            Modality::Presentiel => "presentiel",
            Modality::Telephone => "telephone",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "visio" => Some(Modality::Visio),
            "presentiel" => Some(Modality::Presentiel),
            "telephone" => Some(Modality::Telephone),
            _ => None,
        }
    }
}

/// Snapshot of an interview as carried by its domain event. Reminder sweeps
/// fire long after the event, so the engine keeps the details it will need
/// to render reminder templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSnapshot {
    pub id: Uuid,
    pub application_id: Uuid,
    pub candidate_id: Uuid,
    pub job_title: String,
    pub company_name: String,
    pub scheduled_at: DateTime<Utc>,
    pub modality: Modality,
    pub location_or_link: Option<String>,
    pub notes: Option<String>,
}
