//! Shared fixtures: an engine wired over the in-memory store, a recording
//! stub for the external gateway channels, and seed helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use comms_backend::channels::{
    ChannelAdapter, ChannelRegistry, DeliveryError, DeliveryResult, Envelope, InAppChannel,
};
use comms_backend::models::broadcast::ChannelKind;
use comms_backend::models::interview::{InterviewSnapshot, Modality};
use comms_backend::models::recipient::Recipient;
use comms_backend::realtime::ChangeHub;
use comms_backend::store::memory::MemoryStore;
use comms_backend::{AppState, EngineSettings};

/// Records what it "delivers"; can be told to fail for specific recipients
/// or for the next N calls.
pub struct StubChannel {
    kind: ChannelKind,
    pub deliveries: Mutex<Vec<Envelope>>,
    failing_recipients: Mutex<HashSet<Uuid>>,
    transient_failures: AtomicI32,
}

impl StubChannel {
    pub fn new(kind: ChannelKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            deliveries: Mutex::new(Vec::new()),
            failing_recipients: Mutex::new(HashSet::new()),
            transient_failures: AtomicI32::new(0),
        })
    }

    pub fn fail_for(&self, recipient_id: Uuid) {
        self.failing_recipients.lock().unwrap().insert(recipient_id);
    }

    pub fn fail_next(&self, n: i32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelAdapter for StubChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn deliver(&self, envelope: &Envelope) -> DeliveryResult {
        if self
            .failing_recipients
            .lock()
            .unwrap()
            .contains(&envelope.recipient.id)
        {
            return Err(DeliveryError("gateway rejected recipient".to_string()));
        }
        if self.transient_failures.fetch_sub(1, Ordering::SeqCst) > 0 {
            return Err(DeliveryError("gateway timeout".to_string()));
        }
        self.transient_failures.store(0, Ordering::SeqCst);
        self.deliveries.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

pub struct Harness {
    pub memory: MemoryStore,
    pub state: AppState,
    pub hub: ChangeHub,
    pub email: Arc<StubChannel>,
    pub sms: Arc<StubChannel>,
    pub whatsapp: Arc<StubChannel>,
}

pub const MAX_RETRIES: u32 = 2;

pub fn settings() -> EngineSettings {
    EngineSettings {
        delivery_max_retries: MAX_RETRIES,
        fanout_concurrency: 4,
        // Small page size so multi-recipient tests exercise paging.
        audience_page_size: 2,
        inbox_window: 50,
        webapp_url: "http://localhost:5173".to_string(),
    }
}

pub fn harness() -> Harness {
    let memory = MemoryStore::new();
    let stores = memory.stores();
    let hub = ChangeHub::default();

    let email = StubChannel::new(ChannelKind::Email);
    let sms = StubChannel::new(ChannelKind::Sms);
    let whatsapp = StubChannel::new(ChannelKind::Whatsapp);
    let registry = ChannelRegistry::new()
        .register(Arc::new(InAppChannel::new(
            stores.notifications.clone(),
            hub.clone(),
        )))
        .register(email.clone())
        .register(sms.clone())
        .register(whatsapp.clone());

    let state = AppState::build(stores, hub.clone(), registry, settings());
    Harness {
        memory,
        state,
        hub,
        email,
        sms,
        whatsapp,
    }
}

/// An engine with no adapters at all; every channel send fails.
pub fn harness_without_adapters() -> Harness {
    let memory = MemoryStore::new();
    let stores = memory.stores();
    let hub = ChangeHub::default();
    let state = AppState::build(stores, hub.clone(), ChannelRegistry::new(), settings());
    Harness {
        memory,
        state,
        hub,
        email: StubChannel::new(ChannelKind::Email),
        sms: StubChannel::new(ChannelKind::Sms),
        whatsapp: StubChannel::new(ChannelKind::Whatsapp),
    }
}

pub fn recipient(first_name: &str, last_name: &str) -> Recipient {
    Recipient {
        id: Uuid::new_v4(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: Some(format!(
            "{}.{}@example.com",
            first_name.to_lowercase(),
            last_name.to_lowercase()
        )),
        phone: Some("+224620000000".to_string()),
        role: "candidate".to_string(),
        language: Some("fr".to_string()),
        country: Some("GN".to_string()),
        region: Some("Conakry".to_string()),
        city: Some("Conakry".to_string()),
        profile_completion: 80,
        created_at: Utc::now(),
    }
}

pub fn interview(
    candidate_id: Uuid,
    scheduled_at: DateTime<Utc>,
    modality: Modality,
) -> InterviewSnapshot {
    InterviewSnapshot {
        id: Uuid::new_v4(),
        application_id: Uuid::new_v4(),
        candidate_id,
        job_title: "Développeur Backend".to_string(),
        company_name: "Atlas Mining".to_string(),
        scheduled_at,
        modality,
        location_or_link: Some("https://meet.example.com/abc".to_string()),
        notes: None,
    }
}

pub const ACTOR: Uuid = Uuid::from_u128(0xA11CE);
