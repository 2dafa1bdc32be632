//! Domain-event ingestion. Emitters (application tracking, interview
//! scheduling, credit review) post here with a shared secret; each event maps
//! to a fixed transactional notification and, for interviews, to reminder
//! scheduling.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;
use subtle::ConstantTimeEq;
use validator::Validate;

use crate::config::get_config;
use crate::dto::event_dto::{
    ApplicationStatusPayload, CreditDecisionPayload, EventEnvelope, InterviewCancelPayload,
    InterviewEventPayload, JobClosedPayload, MessageReceivedPayload,
};
use crate::error::{Error, Result};
use crate::models::interview::InterviewSnapshot;
use crate::models::notification::EventKind;
use crate::services::notify_service::{CreditEventDetails, EventDispatch};
use crate::services::template_service::TemplateVars;
use crate::AppState;

fn verify_secret(headers: &axum::http::HeaderMap) -> Result<()> {
    let Some(secret_hdr) = headers.get("x-event-secret") else {
        return Err(Error::Unauthorized("missing_event_secret".into()));
    };
    let provided = secret_hdr
        .to_str()
        .map_err(|_| Error::Unauthorized("invalid_secret_header".into()))?;
    let expected = &get_config().event_secret;
    if ConstantTimeEq::ct_eq(provided.as_bytes(), expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(Error::Unauthorized("invalid_event_secret".into()))
    }
}

fn expect_event(envelope_event: &str, expected: &str) -> Result<()> {
    if envelope_event != expected {
        return Err(Error::BadRequest("unexpected_event".to_string()));
    }
    Ok(())
}

pub async fn handle_interview_scheduled(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(envelope): Json<EventEnvelope<InterviewEventPayload>>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    verify_secret(&headers)?;
    expect_event(&envelope.event, "interview_scheduled")?;
    envelope.payload.validate()?;

    let snapshot = InterviewSnapshot::from(&envelope.payload);
    let reminders = state.reminders.schedule_for_interview(&snapshot).await?;
    let outcome = state
        .notify
        .send_interview_event(&snapshot, EventKind::InterviewScheduled, None, None)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "delivered": outcome.delivered(),
            "channels": outcome.results,
            "reminders_scheduled": reminders.len(),
        })),
    ))
}

pub async fn handle_interview_rescheduled(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(envelope): Json<EventEnvelope<InterviewEventPayload>>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    verify_secret(&headers)?;
    expect_event(&envelope.event, "interview_rescheduled")?;
    envelope.payload.validate()?;

    let snapshot = InterviewSnapshot::from(&envelope.payload);
    // Replaces pending reminders against the new time; never duplicates.
    let reminders = state.reminders.schedule_for_interview(&snapshot).await?;
    let outcome = state
        .notify
        .send_interview_event(&snapshot, EventKind::InterviewRescheduled, None, None)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "delivered": outcome.delivered(),
            "channels": outcome.results,
            "reminders_scheduled": reminders.len(),
        })),
    ))
}

pub async fn handle_interview_canceled(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(envelope): Json<EventEnvelope<InterviewCancelPayload>>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    verify_secret(&headers)?;
    expect_event(&envelope.event, "interview_canceled")?;

    let interview = state
        .stores
        .interviews
        .fetch(envelope.payload.interview_id)
        .await?;
    let dropped = state
        .reminders
        .cancel_for_interview(interview.id)
        .await?;

    let extra = TemplateVars::new()
        .with_flag("if_reason", envelope.payload.reason.is_some())
        .with(
            "cancellation_reason",
            envelope.payload.reason.clone().unwrap_or_default(),
        );
    let outcome = state
        .notify
        .send_interview_event(&interview, EventKind::InterviewCancelled, Some(extra), None)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "delivered": outcome.delivered(),
            "channels": outcome.results,
            "reminders_dropped": dropped,
        })),
    ))
}

pub async fn handle_application_status(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(envelope): Json<EventEnvelope<ApplicationStatusPayload>>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    verify_secret(&headers)?;
    expect_event(&envelope.event, "application_status_update")?;
    envelope.payload.validate()?;

    let payload = envelope.payload;
    let mut dispatch = EventDispatch::new(payload.candidate_id, EventKind::ApplicationStatusUpdate);
    dispatch.vars = TemplateVars::new()
        .with("job_title", payload.job_title.as_str())
        .with("company_name", payload.company_name.as_str())
        .with("new_status", payload.new_status.as_str());
    dispatch.metadata = json!({ "application_id": payload.application_id });
    dispatch.application_id = Some(payload.application_id);
    let outcome = state.notify.send(dispatch).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "delivered": outcome.delivered(), "channels": outcome.results })),
    ))
}

pub async fn handle_message_received(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(envelope): Json<EventEnvelope<MessageReceivedPayload>>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    verify_secret(&headers)?;
    expect_event(&envelope.event, "message_received")?;

    let payload = envelope.payload;
    let mut dispatch = EventDispatch::new(payload.candidate_id, EventKind::MessageReceived);
    dispatch.vars = TemplateVars::new()
        .with("job_title", payload.job_title.as_str())
        .with("company_name", payload.company_name.as_str());
    dispatch.metadata = json!({ "application_id": payload.application_id });
    dispatch.application_id = Some(payload.application_id);
    let outcome = state.notify.send(dispatch).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "delivered": outcome.delivered(), "channels": outcome.results })),
    ))
}

/// One closure event fans out to every applicant of the job.
pub async fn handle_job_closed(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(envelope): Json<EventEnvelope<JobClosedPayload>>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    verify_secret(&headers)?;
    expect_event(&envelope.event, "job_closed")?;
    envelope.payload.validate()?;

    let payload = envelope.payload;
    let mut delivered = 0usize;
    let mut failed = 0usize;
    for target in &payload.targets {
        let mut dispatch = EventDispatch::new(target.candidate_id, EventKind::JobClosed);
        dispatch.vars = TemplateVars::new()
            .with("job_title", payload.job_title.as_str())
            .with("company_name", payload.company_name.as_str());
        dispatch.metadata = json!({ "application_id": target.application_id });
        dispatch.application_id = Some(target.application_id);
        match state.notify.send(dispatch).await {
            Ok(outcome) if outcome.delivered() => delivered += 1,
            Ok(_) | Err(_) => failed += 1,
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "delivered": delivered, "failed": failed })),
    ))
}

pub async fn handle_credit_decision(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(envelope): Json<EventEnvelope<CreditDecisionPayload>>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    verify_secret(&headers)?;
    let kind = match envelope.event.as_str() {
        "credit_purchase_validated" => EventKind::CreditsValidated,
        "credit_purchase_rejected" => EventKind::CreditsRejected,
        _ => return Err(Error::BadRequest("unexpected_event".to_string())),
    };
    envelope.payload.validate()?;

    let payload = envelope.payload;
    let details = CreditEventDetails {
        payment_reference: payload.payment_reference,
        price_amount: payload.price_amount,
        currency: payload.currency,
        credits_amount: payload.credits_amount,
        new_balance: payload.new_balance,
        admin_notes: payload.admin_notes,
        rejection_reason: payload.rejection_reason,
    };
    let outcome = state
        .notify
        .send_credit_event(payload.recipient_id, kind, details, None)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "delivered": outcome.delivered(), "channels": outcome.results })),
    ))
}
