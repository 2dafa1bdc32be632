use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::models::broadcast::{AudienceFilter, BroadcastKind, ChannelKind, ChannelPlan};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBroadcastPayload {
    #[validate(length(min = 1))]
    pub title: String,
    pub kind: BroadcastKind,
    pub description: Option<String>,
    #[serde(default)]
    pub audience: AudienceFilter,
    #[serde(default)]
    pub channels: Vec<ChannelPlan>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateBroadcastPayload {
    #[validate(length(min = 1))]
    pub title: Option<String>,
    pub kind: Option<BroadcastKind>,
    pub description: Option<String>,
    pub audience: Option<AudienceFilter>,
    pub channels: Option<Vec<ChannelPlan>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulePayload {
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTemplatePayload {
    #[validate(length(min = 1))]
    pub name: String,
    pub channel: ChannelKind,
    pub subject: Option<String>,
    #[validate(length(min = 1))]
    pub body: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AudiencePreviewPayload {
    #[serde(default)]
    pub filter: AudienceFilter,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
}
