//! Shared application state handed to HTTP handlers.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::domain::{
    AccountCreated, AppointmentEvent, BookingService, ClearanceService, HandleRegistry,
};

/// Services and notification channels shared across workers.
#[derive(Clone)]
pub struct AppState {
    /// Appointment lifecycle manager.
    pub booking: Arc<BookingService>,
    /// Unique handle registry.
    pub registry: Arc<HandleRegistry>,
    /// Permit upload service.
    pub clearance: Arc<ClearanceService>,
    /// Feed for appointment change notifications.
    pub appointment_events: mpsc::Sender<AppointmentEvent>,
    /// Feed for identity provider account notifications.
    pub account_events: mpsc::Sender<AccountCreated>,
}
