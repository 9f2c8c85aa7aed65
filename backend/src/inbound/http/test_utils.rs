//! Shared fixtures for HTTP handler tests.

use std::sync::Arc;

use chrono::Utc;
use mockable::DefaultClock;
use tokio::sync::mpsc;

use crate::domain::ports::store::{DocumentStore, collections, encode_document};
use crate::domain::ports::uploader::FixtureDocumentUploader;
use crate::domain::{
    AccountCreated, AccountId, AppointmentEvent, BookingLimits, BookingService, ClearanceService,
    HandleRegistry, Role, RoleRecord,
};
use crate::inbound::http::state::AppState;
use crate::outbound::memory::MemoryDocumentStore;

/// In-memory application state plus the far ends of its channels.
pub(crate) struct TestContext {
    pub state: AppState,
    pub store: MemoryDocumentStore,
    pub appointment_rx: mpsc::Receiver<AppointmentEvent>,
    pub account_rx: mpsc::Receiver<AccountCreated>,
}

impl TestContext {
    pub fn new() -> Self {
        let store = MemoryDocumentStore::new();
        let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
        let clock = Arc::new(DefaultClock);
        let (appointment_tx, appointment_rx) = mpsc::channel(16);
        let (account_tx, account_rx) = mpsc::channel(16);
        let state = AppState {
            booking: Arc::new(BookingService::new(
                Arc::clone(&shared),
                clock.clone(),
                BookingLimits::default(),
            )),
            registry: Arc::new(HandleRegistry::new(Arc::clone(&shared), clock.clone())),
            clearance: Arc::new(ClearanceService::new(
                Arc::clone(&shared),
                Arc::new(FixtureDocumentUploader),
                clock,
            )),
            appointment_events: appointment_tx,
            account_events: account_tx,
        };
        Self {
            state,
            store,
            appointment_rx,
            account_rx,
        }
    }

    pub async fn seed_role(&self, uid: &str, role: Role) {
        let record = RoleRecord {
            uid: AccountId::new(uid).expect("valid account"),
            email: format!("{uid}@school.edu"),
            role,
            created_at: Utc::now(),
        };
        let mut tx = self.store.begin().await.expect("begin");
        tx.set(
            collections::ROLES,
            uid,
            encode_document(&record).expect("encode role"),
        );
        tx.commit().await.expect("seed commit");
    }
}
