use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::broadcast::ChannelKind;

/// Operator-authored reusable content. Referenced by id while authoring a
/// broadcast; the rendered text is copied into the channel plan, so later
/// template edits never alter broadcasts already authored from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub channel: ChannelKind,
    pub subject: Option<String>,
    pub body: String,
    pub variables: Vec<String>,
    pub is_active: bool,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
