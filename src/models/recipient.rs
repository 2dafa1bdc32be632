use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A row from the read-only user directory, carrying the contact fields and
/// profile attributes that audience filters and template variables use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub language: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub profile_completion: i32,
    pub created_at: DateTime<Utc>,
}

impl Recipient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Compact shape returned by audience previews.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientSummary {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub role: String,
    pub profile_completion: i32,
}

impl From<&Recipient> for RecipientSummary {
    fn from(r: &Recipient) -> Self {
        Self {
            id: r.id,
            full_name: r.full_name(),
            email: r.email.clone(),
            role: r.role.clone(),
            profile_completion: r.profile_completion,
        }
    }
}
