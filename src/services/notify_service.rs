//! Point-to-point transactional notifications. A fixed registry maps each
//! event kind to default content and channels; callers pick the recipient and
//! variables, never the template text. Channels are attempted independently
//! and the caller gets a per-channel outcome.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::channels::{ChannelRegistry, Envelope};
use crate::error::{Error, Result};
use crate::models::broadcast::ChannelKind;
use crate::models::comm_log::CorrelationEntry;
use crate::models::interview::{InterviewSnapshot, Modality};
use crate::models::message::Message;
use crate::models::notification::EventKind;
use crate::services::template_service::{render, TemplateVars};
use crate::store::Stores;

pub struct EventTemplate {
    pub subject: &'static str,
    pub body: &'static str,
    pub channels: &'static [ChannelKind],
}

const IN_APP: ChannelKind = ChannelKind::InApp;
const EMAIL: ChannelKind = ChannelKind::Email;
const SMS: ChannelKind = ChannelKind::Sms;

/// Default content per event kind. Subjects and bodies carry the platform's
/// operator-facing French wording.
pub fn template_for(kind: EventKind) -> &'static EventTemplate {
    match kind {
        EventKind::InterviewScheduled => &EventTemplate {
            subject: "Entretien planifié pour {{job_title}}",
            body: "Bonjour {{candidate_name}},\n\n\
                Nous avons le plaisir de vous inviter à un entretien pour le poste de {{job_title}}.\n\n\
                Date : {{interview_date}}\n\
                Heure : {{interview_time}}\n\
                {{#if_visio}}\nType : Visioconférence\nLien : {{interview_link}}\n{{/if_visio}}\
                {{#if_presentiel}}\nType : Présentiel\nLieu : {{interview_location}}\n{{/if_presentiel}}\
                {{#if_telephone}}\nType : Entretien téléphonique\nNous vous appellerons au : {{candidate_phone}}\n{{/if_telephone}}\n\
                {{#if_notes}}\nInformations complémentaires :\n{{interview_notes}}\n{{/if_notes}}\n\
                Nous vous prions de confirmer votre présence.\n\n\
                Cordialement,\n{{company_name}}",
            channels: &[IN_APP, EMAIL],
        },
        EventKind::InterviewReminder24h => &EventTemplate {
            subject: "Rappel : Entretien demain pour {{job_title}}",
            body: "Bonjour {{candidate_name}},\n\n\
                Nous vous rappelons que votre entretien pour le poste de {{job_title}} est prévu demain.\n\n\
                Date : {{interview_date}}\n\
                Heure : {{interview_time}}\n\
                {{#if_visio}}\nLien de visioconférence : {{interview_link}}\n{{/if_visio}}\
                {{#if_presentiel}}\nLieu : {{interview_location}}\n{{/if_presentiel}}\n\
                À bientôt !\n{{company_name}}",
            channels: &[IN_APP, EMAIL, SMS],
        },
        EventKind::InterviewReminder2h => &EventTemplate {
            subject: "Rappel : Entretien dans 2 heures",
            body: "Bonjour {{candidate_name}},\n\n\
                Votre entretien pour {{job_title}} commence dans 2 heures ({{interview_time}}).\n\
                {{#if_visio}}\nLien de connexion : {{interview_link}}\n{{/if_visio}}\n\
                À tout de suite !\n{{company_name}}",
            channels: &[IN_APP, SMS],
        },
        EventKind::InterviewCancelled => &EventTemplate {
            subject: "Annulation d'entretien - {{job_title}}",
            body: "Bonjour {{candidate_name}},\n\n\
                Nous sommes au regret de vous informer que l'entretien prévu le {{interview_date}} \
                à {{interview_time}} pour le poste de {{job_title}} a été annulé.\n\
                {{#if_reason}}\nRaison : {{cancellation_reason}}\n{{/if_reason}}\n\
                Nous vous contacterons prochainement pour reprogrammer.\n\n\
                Cordialement,\n{{company_name}}",
            channels: &[IN_APP, EMAIL],
        },
        EventKind::InterviewRescheduled => &EventTemplate {
            subject: "Entretien reprogrammé - {{job_title}}",
            body: "Bonjour {{candidate_name}},\n\n\
                Votre entretien pour le poste de {{job_title}} a été reprogrammé.\n\n\
                Nouvelle date : {{interview_date}}\n\
                Nouvelle heure : {{interview_time}}\n\n\
                Merci de confirmer votre disponibilité.\n\n\
                Cordialement,\n{{company_name}}",
            channels: &[IN_APP, EMAIL, SMS],
        },
        EventKind::ApplicationStatusUpdate => &EventTemplate {
            subject: "Mise à jour de votre candidature - {{job_title}}",
            body: "Bonjour {{candidate_name}},\n\n\
                Votre candidature pour le poste de {{job_title}} a été mise à jour.\n\n\
                Statut : {{new_status}}\n\n\
                Vous pouvez consulter les détails sur votre espace candidat.\n\n\
                Cordialement,\n{{company_name}}",
            channels: &[IN_APP, EMAIL],
        },
        EventKind::MessageReceived => &EventTemplate {
            subject: "Nouveau message de {{company_name}}",
            body: "Bonjour {{candidate_name}},\n\n\
                Vous avez reçu un nouveau message concernant votre candidature pour {{job_title}}.\n\n\
                Connectez-vous à votre espace pour le consulter.\n\n\
                Cordialement,\n{{company_name}}",
            channels: &[IN_APP, EMAIL],
        },
        EventKind::JobClosed => &EventTemplate {
            subject: "Clôture de l'offre - {{job_title}}",
            body: "Bonjour {{candidate_name}},\n\n\
                Nous vous informons que l'offre pour le poste de {{job_title}} est désormais clôturée.\n\n\
                Nous vous remercions de l'intérêt porté à notre entreprise et vous souhaitons \
                bonne chance dans vos recherches.\n\n\
                Cordialement,\n{{company_name}}",
            channels: &[IN_APP, EMAIL],
        },
        EventKind::CreditsValidated => &EventTemplate {
            subject: "Paiement validé - {{credits_amount}} crédits ajoutés",
            body: "Bonjour,\n\n\
                Excellente nouvelle ! Votre paiement a été validé avec succès.\n\n\
                Référence : {{payment_reference}}\n\
                Montant : {{price_amount}}\n\
                Crédits ajoutés : {{credits_amount}}\n\
                Nouveau solde : {{new_balance}}\n\
                {{#if_notes}}\nNote de l'administrateur :\n{{admin_notes}}\n{{/if_notes}}\n\
                Merci pour votre confiance !\n\n\
                L'équipe de la plateforme",
            channels: &[IN_APP, EMAIL],
        },
        EventKind::CreditsRejected => &EventTemplate {
            subject: "Paiement non validé - {{payment_reference}}",
            body: "Bonjour,\n\n\
                Nous avons examiné votre demande d'achat de crédits mais nous ne pouvons \
                malheureusement pas la valider.\n\n\
                Référence : {{payment_reference}}\n\
                Montant : {{price_amount}}\n\
                Crédits : {{credits_amount}}\n\
                {{#if_reason}}\nRaison :\n{{rejection_reason}}\n{{/if_reason}}\n\
                Si vous pensez qu'il s'agit d'une erreur, veuillez nous contacter avec votre \
                preuve de paiement.\n\n\
                L'équipe de la plateforme",
            channels: &[IN_APP, EMAIL],
        },
    }
}

/// One transactional send: recipient, event kind, variables, and optional
/// case correlation. Channel overrides replace the registry's default set;
/// content always comes from the registry.
#[derive(Debug, Clone)]
pub struct EventDispatch {
    pub recipient_id: Uuid,
    pub kind: EventKind,
    pub channels: Option<Vec<ChannelKind>>,
    pub vars: TemplateVars,
    pub metadata: JsonValue,
    pub link: Option<String>,
    pub application_id: Option<Uuid>,
    pub interview_id: Option<Uuid>,
    pub actor: Option<Uuid>,
}

impl EventDispatch {
    pub fn new(recipient_id: Uuid, kind: EventKind) -> Self {
        Self {
            recipient_id,
            kind,
            channels: None,
            vars: TemplateVars::new(),
            metadata: json!({}),
            link: None,
            application_id: None,
            interview_id: None,
            actor: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelDelivery {
    pub channel: ChannelKind,
    pub delivered: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventOutcome {
    pub results: Vec<ChannelDelivery>,
}

impl EventOutcome {
    /// The call as a whole succeeded if at least one channel got through.
    pub fn delivered(&self) -> bool {
        self.results.iter().any(|r| r.delivered)
    }
}

/// Details of a credit purchase decision, formatted into the credit
/// templates' variables.
#[derive(Debug, Clone)]
pub struct CreditEventDetails {
    pub payment_reference: String,
    pub price_amount: i64,
    pub currency: String,
    pub credits_amount: i64,
    pub new_balance: Option<i64>,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
}

const MODALITY_FLAGS: [&str; 3] = ["if_visio", "if_presentiel", "if_telephone"];

#[derive(Clone)]
pub struct NotifyService {
    stores: Stores,
    channels: ChannelRegistry,
    webapp_url: String,
}

impl NotifyService {
    pub fn new(stores: Stores, channels: ChannelRegistry, webapp_url: String) -> Self {
        Self {
            stores,
            channels,
            webapp_url,
        }
    }

    pub async fn send(&self, dispatch: EventDispatch) -> Result<EventOutcome> {
        if dispatch.kind.is_interview() {
            let set = MODALITY_FLAGS
                .iter()
                .filter(|flag| dispatch.vars.truthy(flag))
                .count();
            if set != 1 {
                return Err(Error::BadRequest(
                    "exactly one interview modality flag must be set".to_string(),
                ));
            }
        }

        let recipient = self.stores.users.fetch(dispatch.recipient_id).await?;
        let template = template_for(dispatch.kind);
        let channels = dispatch
            .channels
            .clone()
            .unwrap_or_else(|| template.channels.to_vec());
        if channels.is_empty() {
            return Err(Error::BadRequest("no channels requested".to_string()));
        }

        // Recipient identity is always available to templates; caller
        // variables win on collision.
        let mut vars = TemplateVars::new().with("candidate_name", recipient.full_name());
        vars.merge(dispatch.vars.clone());
        let subject = render(template.subject, &vars);
        let body = render(template.body, &vars);

        let mut tasks = JoinSet::new();
        for channel in channels {
            let this = self.clone();
            let dispatch = dispatch.clone();
            let recipient = recipient.clone();
            let subject = subject.clone();
            let body = body.clone();
            tasks.spawn(async move {
                this.send_via_channel(channel, &dispatch, recipient, subject, body)
                    .await
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(delivery) => results.push(delivery),
                Err(e) => {
                    tracing::error!(error = ?e, "notification channel task panicked");
                }
            }
        }
        Ok(EventOutcome { results })
    }

    async fn send_via_channel(
        &self,
        channel: ChannelKind,
        dispatch: &EventDispatch,
        recipient: crate::models::recipient::Recipient,
        subject: String,
        body: String,
    ) -> ChannelDelivery {
        let message = Message::pending(
            None,
            recipient.id,
            channel,
            Some(subject.clone()),
            body.clone(),
        );
        if let Err(e) = self.stores.messages.insert(&message).await {
            tracing::error!(channel = %channel, error = %e, "transactional message insert failed");
            return ChannelDelivery {
                channel,
                delivered: false,
                error: Some(e.to_string()),
            };
        }

        let outcome = match self.channels.get(channel) {
            Some(adapter) => {
                let envelope = Envelope {
                    recipient: recipient.clone(),
                    kind: dispatch.kind.as_str().to_string(),
                    subject: Some(subject.clone()),
                    body: body.clone(),
                    link: dispatch.link.clone(),
                    metadata: dispatch.metadata.clone(),
                };
                adapter.deliver(&envelope).await.map_err(|e| e.to_string())
            }
            None => Err(format!("no adapter registered for {}", channel)),
        };

        let delivered = outcome.is_ok();
        match &outcome {
            Ok(()) => {
                if let Err(e) = self.stores.messages.mark_sent(message.id, Utc::now()).await {
                    tracing::error!(message = %message.id, error = %e, "mark_sent failed");
                }
            }
            Err(err) => {
                let _ = self
                    .stores
                    .messages
                    .record_failure(message.id, err, true)
                    .await;
            }
        }

        // Case-scoped history for anything tied to an application/interview.
        if dispatch.application_id.is_some() || dispatch.interview_id.is_some() {
            let entry = CorrelationEntry {
                id: Uuid::new_v4(),
                application_id: dispatch.application_id,
                interview_id: dispatch.interview_id,
                sender_id: dispatch.actor,
                recipient_id: recipient.id,
                event: dispatch.kind.as_str().to_string(),
                channel,
                subject: Some(subject),
                body,
                delivered,
                created_at: Utc::now(),
            };
            if let Err(e) = self.stores.correlations.append(&entry).await {
                tracing::error!(error = %e, "correlation log append failed");
            }
        }

        ChannelDelivery {
            channel,
            delivered,
            error: outcome.err(),
        }
    }

    /// Sends an interview-related event with the variables derived from the
    /// stored snapshot. The modality enum guarantees exactly one modality
    /// flag is truthy.
    pub async fn send_interview_event(
        &self,
        interview: &InterviewSnapshot,
        kind: EventKind,
        extra: Option<TemplateVars>,
        actor: Option<Uuid>,
    ) -> Result<EventOutcome> {
        let recipient = self.stores.users.fetch(interview.candidate_id).await?;

        let mut vars = TemplateVars::new()
            .with("candidate_name", recipient.full_name())
            .with("job_title", interview.job_title.as_str())
            .with("company_name", interview.company_name.as_str())
            .with(
                "interview_date",
                interview.scheduled_at.format("%d/%m/%Y").to_string(),
            )
            .with(
                "interview_time",
                interview.scheduled_at.format("%H:%M").to_string(),
            )
            .with(
                "interview_link",
                interview.location_or_link.clone().unwrap_or_default(),
            )
            .with(
                "interview_location",
                interview.location_or_link.clone().unwrap_or_default(),
            )
            .with(
                "candidate_phone",
                recipient.phone.clone().unwrap_or_default(),
            )
            .with_flag("if_visio", interview.modality == Modality::Visio)
            .with_flag("if_presentiel", interview.modality == Modality::Presentiel)
            .with_flag("if_telephone", interview.modality == Modality::Telephone)
            .with_flag("if_notes", interview.notes.is_some())
            .with(
                "interview_notes",
                interview.notes.clone().unwrap_or_default(),
            );
        if let Some(extra) = extra {
            vars.merge(extra);
        }

        let mut dispatch = EventDispatch::new(interview.candidate_id, kind);
        dispatch.vars = vars;
        dispatch.metadata = json!({
            "interview_id": interview.id,
            "application_id": interview.application_id,
        });
        dispatch.link = Some(format!("{}/candidate-dashboard", self.webapp_url));
        dispatch.application_id = Some(interview.application_id);
        dispatch.interview_id = Some(interview.id);
        dispatch.actor = actor;
        self.send(dispatch).await
    }

    /// Credit purchase decisions, with amounts formatted for the templates.
    pub async fn send_credit_event(
        &self,
        recipient_id: Uuid,
        kind: EventKind,
        details: CreditEventDetails,
        actor: Option<Uuid>,
    ) -> Result<EventOutcome> {
        if !matches!(
            kind,
            EventKind::CreditsValidated | EventKind::CreditsRejected
        ) {
            return Err(Error::BadRequest(
                "not a credit purchase event".to_string(),
            ));
        }

        let vars = TemplateVars::new()
            .with("payment_reference", details.payment_reference.as_str())
            .with(
                "price_amount",
                format_amount(details.price_amount, &details.currency),
            )
            .with("credits_amount", group_thousands(details.credits_amount))
            .with(
                "new_balance",
                details.new_balance.map(group_thousands).unwrap_or_default(),
            )
            .with(
                "admin_notes",
                details.admin_notes.clone().unwrap_or_default(),
            )
            .with(
                "rejection_reason",
                details.rejection_reason.clone().unwrap_or_default(),
            )
            .with_flag("if_notes", details.admin_notes.is_some())
            .with_flag("if_reason", details.rejection_reason.is_some());

        let mut dispatch = EventDispatch::new(recipient_id, kind);
        dispatch.vars = vars;
        dispatch.metadata = json!({
            "payment_reference": details.payment_reference,
            "credits_amount": details.credits_amount,
            "new_balance": details.new_balance,
        });
        dispatch.link = Some(format!("{}/credits", self.webapp_url));
        dispatch.actor = actor;
        self.send(dispatch).await
    }
}

/// French-style digit grouping: `1234567` -> `1 234 567`.
fn group_thousands(n: i64) -> String {
    let digits = n.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    if n < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn format_amount(amount: i64, currency: &str) -> String {
    format!("{} {}", group_thousands(amount), currency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_thousands_french_style() {
        assert_eq!(group_thousands(150000), "150 000");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1234567), "1 234 567");
        assert_eq!(format_amount(50000, "GNF"), "50 000 GNF");
    }

    #[test]
    fn every_event_kind_has_a_template() {
        let kinds = [
            EventKind::InterviewScheduled,
            EventKind::InterviewReminder24h,
            EventKind::InterviewReminder2h,
            EventKind::InterviewCancelled,
            EventKind::InterviewRescheduled,
            EventKind::ApplicationStatusUpdate,
            EventKind::MessageReceived,
            EventKind::JobClosed,
            EventKind::CreditsValidated,
            EventKind::CreditsRejected,
        ];
        for kind in kinds {
            let template = template_for(kind);
            assert!(!template.subject.is_empty());
            assert!(!template.body.is_empty());
            assert!(!template.channels.is_empty());
        }
    }
}
