use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::models::interview::{InterviewSnapshot, Modality};

/// Wrapper every domain-event emitter posts: an event name plus its payload.
#[derive(Debug, Deserialize)]
pub struct EventEnvelope<T> {
    pub event: String,
    #[serde(flatten)]
    pub payload: T,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InterviewEventPayload {
    pub interview_id: Uuid,
    pub application_id: Uuid,
    pub candidate_id: Uuid,
    #[validate(length(min = 1))]
    pub job_title: String,
    #[validate(length(min = 1))]
    pub company_name: String,
    pub scheduled_at: DateTime<Utc>,
    pub modality: Modality,
    pub location_or_link: Option<String>,
    pub notes: Option<String>,
}

impl From<&InterviewEventPayload> for InterviewSnapshot {
    fn from(p: &InterviewEventPayload) -> Self {
        InterviewSnapshot {
            id: p.interview_id,
            application_id: p.application_id,
            candidate_id: p.candidate_id,
            job_title: p.job_title.clone(),
            company_name: p.company_name.clone(),
            scheduled_at: p.scheduled_at,
            modality: p.modality,
            location_or_link: p.location_or_link.clone(),
            notes: p.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterviewCancelPayload {
    pub interview_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ApplicationStatusPayload {
    pub application_id: Uuid,
    pub candidate_id: Uuid,
    #[validate(length(min = 1))]
    pub job_title: String,
    pub company_name: String,
    #[validate(length(min = 1))]
    pub new_status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageReceivedPayload {
    pub application_id: Uuid,
    pub candidate_id: Uuid,
    pub job_title: String,
    pub company_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobClosedTarget {
    pub candidate_id: Uuid,
    pub application_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct JobClosedPayload {
    #[validate(length(min = 1))]
    pub job_title: String,
    pub company_name: String,
    pub targets: Vec<JobClosedTarget>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreditDecisionPayload {
    pub recipient_id: Uuid,
    #[validate(length(min = 1))]
    pub payment_reference: String,
    pub price_amount: i64,
    pub currency: String,
    pub credits_amount: i64,
    pub new_balance: Option<i64>,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
}
