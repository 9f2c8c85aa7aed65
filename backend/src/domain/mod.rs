//! Domain primitives, services and ports.
//!
//! Everything in this module is transport and storage agnostic: services
//! talk to collaborators through the ports in [`ports`] and surface
//! failures as [`Error`]. Inbound adapters map those errors to their own
//! envelopes.

pub mod appointment;
pub mod booking;
pub mod clearance;
pub mod error;
pub mod events;
pub mod handle;
pub mod ports;
pub mod registry;
pub mod role;
pub mod slot;
pub mod slot_ledger;

pub use self::appointment::{
    AccountId, Appointment, AppointmentId, AppointmentStatus, PaymentMethod,
};
pub use self::booking::{BookingLimits, BookingService, DEFAULT_ACTIVE_APPOINTMENT_CAP};
pub use self::clearance::ClearanceService;
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::events::{
    AccountCreated, AppointmentEvent, LedgerMirror, OnboardingService, run_account_onboarding,
    run_appointment_mirror,
};
pub use self::handle::{Handle, HandleReservation};
pub use self::registry::HandleRegistry;
pub use self::role::{Role, RoleRecord, RoleRules};
pub use self::slot::{BookingDate, DEFAULT_SLOT_CAPACITY, Slot, SlotKey, TimeWindow};

/// Convenient domain result alias.
pub type DomainResult<T> = Result<T, Error>;
