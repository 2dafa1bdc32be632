mod common;

use chrono::{Duration, Utc};
use common::{harness, harness_without_adapters, interview, recipient};
use serde_json::json;

use comms_backend::error::Error;
use comms_backend::models::broadcast::ChannelKind;
use comms_backend::models::interview::Modality;
use comms_backend::models::notification::EventKind;
use comms_backend::services::notify_service::{CreditEventDetails, EventDispatch};
use comms_backend::services::template_service::TemplateVars;
use uuid::Uuid;

#[tokio::test]
async fn default_channels_fan_out_with_per_channel_results() {
    let h = harness();
    let candidate = recipient("Aminata", "Diallo");
    h.memory.add_recipient(candidate.clone());
    let application_id = Uuid::new_v4();

    let mut dispatch = EventDispatch::new(candidate.id, EventKind::ApplicationStatusUpdate);
    dispatch.vars = TemplateVars::new()
        .with("job_title", "Comptable")
        .with("company_name", "Guinée Télécom")
        .with("new_status", "Présélectionné");
    dispatch.application_id = Some(application_id);
    let outcome = h.state.notify.send(dispatch).await.unwrap();

    // Registry default for status updates: in-app + email.
    assert!(outcome.delivered());
    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.results.iter().all(|r| r.delivered));

    let inbox = h.state.inbox.list(candidate.id, 10).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].title, "Mise à jour de votre candidature - Comptable");
    assert!(inbox[0].message.contains("Bonjour Aminata Diallo"));
    assert!(inbox[0].message.contains("Présélectionné"));
    assert_eq!(h.email.delivered(), 1);

    // The exchange is reconstructable from the correlation log.
    let history = h
        .state
        .stores
        .correlations
        .for_application(application_id)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|e| e.delivered));
    assert!(history
        .iter()
        .any(|e| e.channel == ChannelKind::InApp));
}

#[tokio::test]
async fn partial_failure_still_succeeds_overall() {
    let h = harness();
    let candidate = recipient("Boubacar", "Bah");
    h.memory.add_recipient(candidate.clone());
    h.email.fail_for(candidate.id);

    let mut dispatch = EventDispatch::new(candidate.id, EventKind::ApplicationStatusUpdate);
    dispatch.vars = TemplateVars::new()
        .with("job_title", "Logisticien")
        .with("company_name", "Port Autonome")
        .with("new_status", "Retenu");
    let outcome = h.state.notify.send(dispatch).await.unwrap();

    assert!(outcome.delivered());
    let email = outcome
        .results
        .iter()
        .find(|r| r.channel == ChannelKind::Email)
        .unwrap();
    assert!(!email.delivered);
    assert!(email.error.is_some());
    let in_app = outcome
        .results
        .iter()
        .find(|r| r.channel == ChannelKind::InApp)
        .unwrap();
    assert!(in_app.delivered);
}

#[tokio::test]
async fn total_failure_reports_no_delivery() {
    let h = harness_without_adapters();
    let candidate = recipient("Cellou", "Barry");
    h.memory.add_recipient(candidate.clone());

    let mut dispatch = EventDispatch::new(candidate.id, EventKind::JobClosed);
    dispatch.vars = TemplateVars::new()
        .with("job_title", "Chauffeur")
        .with("company_name", "Transco");
    let outcome = h.state.notify.send(dispatch).await.unwrap();

    assert!(!outcome.delivered());
    assert!(outcome.results.iter().all(|r| !r.delivered));

    // Failed transactional sends are terminal failed messages.
    let messages = h
        .state
        .stores
        .messages
        .list_for_broadcast(Uuid::nil(), None, None)
        .await
        .unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn interview_events_require_exactly_one_modality_flag() {
    let h = harness();
    let candidate = recipient("Fatou", "Sow");
    h.memory.add_recipient(candidate.clone());

    let mut none_set = EventDispatch::new(candidate.id, EventKind::InterviewScheduled);
    none_set.vars = TemplateVars::new().with("job_title", "Analyste");
    let err = h.state.notify.send(none_set).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));

    let mut two_set = EventDispatch::new(candidate.id, EventKind::InterviewScheduled);
    two_set.vars = TemplateVars::new()
        .with_flag("if_visio", true)
        .with_flag("if_presentiel", true);
    let err = h.state.notify.send(two_set).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn interview_event_renders_the_selected_modality_block() {
    let h = harness();
    let candidate = recipient("Ibrahima", "Sylla");
    h.memory.add_recipient(candidate.clone());

    let mut snapshot = interview(
        candidate.id,
        Utc::now() + Duration::hours(24),
        Modality::Presentiel,
    );
    snapshot.location_or_link = Some("Immeuble Kaloum, 3e étage".to_string());
    snapshot.notes = Some("Apporter une pièce d'identité".to_string());

    let outcome = h
        .state
        .notify
        .send_interview_event(&snapshot, EventKind::InterviewScheduled, None, None)
        .await
        .unwrap();
    assert!(outcome.delivered());

    let inbox = h.state.inbox.list(candidate.id, 10).await.unwrap();
    assert_eq!(inbox.len(), 1);
    let body = &inbox[0].message;
    assert!(body.contains("Présentiel"));
    assert!(body.contains("Immeuble Kaloum, 3e étage"));
    assert!(!body.contains("Visioconférence"));
    assert!(!body.contains("téléphonique"));
    // The notes block rendered because notes exist.
    assert!(body.contains("Apporter une pièce d'identité"));

    let history = h
        .state
        .stores
        .correlations
        .for_interview(snapshot.id)
        .await
        .unwrap();
    assert!(!history.is_empty());
}

#[tokio::test]
async fn credit_decisions_format_amounts_and_optional_blocks() {
    let h = harness();
    let buyer = recipient("Mariam", "Conde");
    h.memory.add_recipient(buyer.clone());

    let details = CreditEventDetails {
        payment_reference: "PAY-2026-0042".to_string(),
        price_amount: 150000,
        currency: "GNF".to_string(),
        credits_amount: 500,
        new_balance: Some(1250),
        admin_notes: None,
        rejection_reason: None,
    };
    let outcome = h
        .state
        .notify
        .send_credit_event(buyer.id, EventKind::CreditsValidated, details, None)
        .await
        .unwrap();
    assert!(outcome.delivered());

    let inbox = h.state.inbox.list(buyer.id, 10).await.unwrap();
    assert_eq!(inbox.len(), 1);
    let body = &inbox[0].message;
    assert!(body.contains("150 000 GNF"));
    assert!(body.contains("1 250"));
    assert!(body.contains("PAY-2026-0042"));
    // No admin note: the optional block is stripped entirely.
    assert!(!body.contains("Note de l'administrateur"));

    let details = CreditEventDetails {
        payment_reference: "PAY-2026-0043".to_string(),
        price_amount: 80000,
        currency: "GNF".to_string(),
        credits_amount: 200,
        new_balance: None,
        admin_notes: None,
        rejection_reason: Some("Preuve de paiement illisible".to_string()),
    };
    let outcome = h
        .state
        .notify
        .send_credit_event(buyer.id, EventKind::CreditsRejected, details, None)
        .await
        .unwrap();
    assert!(outcome.delivered());
    let inbox = h.state.inbox.list(buyer.id, 10).await.unwrap();
    let rejected = inbox
        .iter()
        .find(|n| n.title.contains("PAY-2026-0043"))
        .unwrap();
    assert!(rejected.message.contains("Preuve de paiement illisible"));
}

#[tokio::test]
async fn non_credit_kind_is_rejected_by_the_credit_path() {
    let h = harness();
    let buyer = recipient("Sekou", "Toure");
    h.memory.add_recipient(buyer.clone());

    let details = CreditEventDetails {
        payment_reference: "PAY-1".to_string(),
        price_amount: 1000,
        currency: "GNF".to_string(),
        credits_amount: 10,
        new_balance: None,
        admin_notes: None,
        rejection_reason: None,
    };
    let err = h
        .state
        .notify
        .send_credit_event(buyer.id, EventKind::JobClosed, details, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn channel_override_replaces_the_default_set() {
    let h = harness();
    let candidate = recipient("Hawa", "Keita");
    h.memory.add_recipient(candidate.clone());

    let mut dispatch = EventDispatch::new(candidate.id, EventKind::MessageReceived);
    dispatch.vars = TemplateVars::new()
        .with("job_title", "Juriste")
        .with("company_name", "Cabinet Légal");
    dispatch.channels = Some(vec![ChannelKind::Sms]);
    dispatch.metadata = json!({});
    let outcome = h.state.notify.send(dispatch).await.unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].channel, ChannelKind::Sms);
    assert_eq!(h.sms.delivered(), 1);
    assert_eq!(h.email.delivered(), 0);
    assert!(h.state.inbox.list(candidate.id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn transactional_sends_persist_message_outcomes() {
    let h = harness();
    let candidate = recipient("Nene", "Balde");
    h.memory.add_recipient(candidate.clone());
    h.email.fail_for(candidate.id);

    let mut dispatch = EventDispatch::new(candidate.id, EventKind::ApplicationStatusUpdate);
    dispatch.vars = TemplateVars::new()
        .with("job_title", "Infirmière")
        .with("company_name", "Clinique Pastoria")
        .with("new_status", "En attente");
    h.state.notify.send(dispatch).await.unwrap();

    // One message row per attempted channel, with per-channel outcomes.
    let memory_stores = h.state.stores.clone();
    let sent = memory_stores
        .messages
        .stats_for_broadcast(Uuid::nil())
        .await
        .unwrap();
    // Transactional rows carry no broadcast id, so the broadcast-scoped
    // stats see nothing.
    assert_eq!(sent.total, 0);

    let inbox = h.state.inbox.list(candidate.id, 10).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(h.email.delivered(), 0);
}

#[tokio::test]
async fn caller_variables_override_injected_recipient_name() {
    let h = harness();
    let candidate = recipient("Oumar", "Camara");
    h.memory.add_recipient(candidate.clone());

    let mut dispatch = EventDispatch::new(candidate.id, EventKind::JobClosed);
    dispatch.vars = TemplateVars::new()
        .with("candidate_name", "Cher candidat")
        .with("job_title", "Soudeur")
        .with("company_name", "Chantiers Navals");
    h.state.notify.send(dispatch).await.unwrap();

    let inbox = h.state.inbox.list(candidate.id, 10).await.unwrap();
    assert!(inbox[0].message.contains("Bonjour Cher candidat"));
}
