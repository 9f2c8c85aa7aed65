//! Appointment aggregate and its identity scheme.
//!
//! Appointment identity is deterministic: the document id is the SHA-256
//! fingerprint of `(account, date, window)`, so duplicate booking attempts
//! for the same user and slot collide on write instead of needing a
//! separate uniqueness lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::domain::slot::{BookingDate, SlotKey, TimeWindow};

/// Opaque identifier of an account issued by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String)]
pub struct AccountId(String);

/// Validation errors for [`AccountId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountIdValidationError {
    /// The identifier was empty after trimming.
    #[error("account id must not be empty")]
    Empty,
}

impl AccountId {
    /// Wrap a provider-issued account identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, AccountIdValidationError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(AccountIdValidationError::Empty);
        }
        Ok(Self(raw))
    }

    /// String form of the identifier.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic appointment identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String)]
pub struct AppointmentId(String);

/// Validation errors for [`AppointmentId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppointmentIdValidationError {
    /// The identifier was not a 64-character lowercase hex digest.
    #[error("appointment id must be a 64-character hex digest")]
    Malformed,
}

impl AppointmentId {
    /// Derive the identifier for an account booking a slot.
    pub fn derive(account: &AccountId, key: &SlotKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(account.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(key.date.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(key.window.as_str().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Accept an externally supplied identifier, validating its shape.
    pub fn new(raw: impl Into<String>) -> Result<Self, AppointmentIdValidationError> {
        let raw = raw.into();
        let well_formed =
            raw.len() == 64 && raw.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
        if !well_formed {
            return Err(AppointmentIdValidationError::Malformed);
        }
        Ok(Self(raw))
    }

    /// String form of the identifier.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the booker intends to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Pay online through an e-wallet.
    EWallet,
    /// Pay in person at the cashier.
    PayAtSchool,
}

/// Error raised when a string names no payment method.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown payment method: {raw}")]
pub struct PaymentMethodParseError {
    /// The rejected input.
    pub raw: String,
}

impl std::str::FromStr for PaymentMethod {
    type Err = PaymentMethodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "E_WALLET" => Ok(Self::EWallet),
            "PAY_AT_SCHOOL" => Ok(Self::PayAtSchool),
            _ => Err(PaymentMethodParseError { raw: s.to_owned() }),
        }
    }
}

/// Lifecycle state of an appointment.
///
/// The machine moves forward only: PENDING → PAID → APPROVED. REJECTED and
/// CANCELLED are terminal and reachable from every non-terminal state.
/// Non-terminal states occupy one unit of slot capacity; terminal states do
/// not and leave the identity key free for rebooking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    /// Booked, payment outstanding.
    Pending,
    /// Payment received.
    Paid,
    /// Confirmed by staff.
    Approved,
    /// Declined by staff. Terminal.
    Rejected,
    /// Withdrawn by the booker. Terminal.
    Cancelled,
}

/// Error raised when a string names no appointment status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown appointment status: {raw}")]
pub struct AppointmentStatusParseError {
    /// The rejected input.
    pub raw: String,
}

impl std::str::FromStr for AppointmentStatus {
    type Err = AppointmentStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(AppointmentStatusParseError { raw: s.to_owned() }),
        }
    }
}

impl AppointmentStatus {
    /// Whether this state ends the lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled)
    }

    /// Whether an appointment in this state holds a unit of slot capacity.
    pub fn occupies_slot(self) -> bool {
        !self.is_terminal()
    }

    /// Whether the machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Paid) | (Self::Paid, Self::Approved) => true,
            (current, Self::Rejected | Self::Cancelled) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(label)
    }
}

/// Stored appointment document.
///
/// ## Invariants
/// - Each appointment in a slot-occupying status corresponds to exactly one
///   unit of `booked_count` on the slot matching its `(date, window)`;
///   `ledger_applied` records whether that unit has been applied so replayed
///   change notifications stay idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    /// Booking account.
    pub user_id: AccountId,
    /// Booked calendar date.
    pub date: BookingDate,
    /// Booked time window.
    pub window: TimeWindow,
    /// Lifecycle state.
    pub status: AppointmentStatus,
    /// Declared payment method.
    pub payment_method: PaymentMethod,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Paid side-effect idempotency flag; set at most once.
    #[serde(default)]
    pub verified_by_function: bool,
    /// Instant the paid side-effect fired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    /// Instant of the last slot move, stamped by the reschedule that moved it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rescheduled_at: Option<DateTime<Utc>>,
    /// Whether this appointment's slot unit has been applied to the ledger.
    #[serde(default)]
    pub ledger_applied: bool,
}

impl Appointment {
    /// Freshly booked appointment whose slot unit was reserved in the same
    /// transaction.
    pub fn booked(
        user_id: AccountId,
        key: SlotKey,
        payment_method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            date: key.date,
            window: key.window,
            status: AppointmentStatus::Pending,
            payment_method,
            created_at: now,
            verified_by_function: false,
            verified_at: None,
            last_rescheduled_at: None,
            ledger_applied: true,
        }
    }

    /// Slot this appointment occupies (or last occupied).
    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(self.date, self.window)
    }

    /// Deterministic identity of this appointment.
    pub fn id(&self) -> AppointmentId {
        AppointmentId::derive(&self.user_id, &self.slot_key())
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;

    fn key(date: &str, window: TimeWindow) -> SlotKey {
        SlotKey::new(BookingDate::parse(date).expect("valid date"), window)
    }

    #[test]
    fn identical_bookings_derive_identical_ids() {
        let account = AccountId::new("uid-1").expect("valid account");
        let a = AppointmentId::derive(&account, &key("2025-06-01", TimeWindow::H09));
        let b = AppointmentId::derive(&account, &key("2025-06-01", TimeWindow::H09));
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_slots_derive_distinct_ids() {
        let account = AccountId::new("uid-1").expect("valid account");
        let a = AppointmentId::derive(&account, &key("2025-06-01", TimeWindow::H09));
        let b = AppointmentId::derive(&account, &key("2025-06-01", TimeWindow::H10));
        assert_ne!(a, b);
    }

    #[test]
    fn derived_ids_round_trip_validation() {
        let account = AccountId::new("uid-1").expect("valid account");
        let id = AppointmentId::derive(&account, &key("2025-06-01", TimeWindow::H09));
        let reparsed = AppointmentId::new(id.as_str()).expect("well-formed id");
        assert_eq!(reparsed, id);
    }

    #[rstest]
    #[case("")]
    #[case("not-hex")]
    #[case("ABC123")]
    fn malformed_ids_are_rejected(#[case] raw: &str) {
        assert!(AppointmentId::new(raw).is_err());
    }

    #[rstest]
    #[case(AppointmentStatus::Pending, AppointmentStatus::Paid, true)]
    #[case(AppointmentStatus::Paid, AppointmentStatus::Approved, true)]
    #[case(AppointmentStatus::Pending, AppointmentStatus::Approved, false)]
    #[case(AppointmentStatus::Paid, AppointmentStatus::Pending, false)]
    #[case(AppointmentStatus::Approved, AppointmentStatus::Paid, false)]
    #[case(AppointmentStatus::Pending, AppointmentStatus::Cancelled, true)]
    #[case(AppointmentStatus::Approved, AppointmentStatus::Rejected, true)]
    #[case(AppointmentStatus::Cancelled, AppointmentStatus::Pending, false)]
    #[case(AppointmentStatus::Rejected, AppointmentStatus::Cancelled, false)]
    fn transitions_follow_the_state_machine(
        #[case] from: AppointmentStatus,
        #[case] to: AppointmentStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[rstest]
    #[case(AppointmentStatus::Pending, true)]
    #[case(AppointmentStatus::Paid, true)]
    #[case(AppointmentStatus::Approved, true)]
    #[case(AppointmentStatus::Rejected, false)]
    #[case(AppointmentStatus::Cancelled, false)]
    fn only_live_states_occupy_capacity(#[case] status: AppointmentStatus, #[case] occupies: bool) {
        assert_eq!(status.occupies_slot(), occupies);
    }

    #[test]
    fn documents_serialise_with_camel_case_fields() {
        let appointment = Appointment::booked(
            AccountId::new("uid-1").expect("valid account"),
            key("2025-06-01", TimeWindow::H09),
            PaymentMethod::EWallet,
            Utc::now(),
        );
        let value = serde_json::to_value(&appointment).expect("serialise appointment");
        assert_eq!(value.get("status"), Some(&serde_json::json!("PENDING")));
        assert_eq!(value.get("paymentMethod"), Some(&serde_json::json!("E_WALLET")));
        assert_eq!(value.get("ledgerApplied"), Some(&serde_json::json!(true)));
        assert!(value.get("userId").is_some());
        assert!(value.get("verifiedAt").is_none());
    }

    #[test]
    fn documents_tolerate_missing_marker_fields() {
        let raw = serde_json::json!({
            "userId": "uid-1",
            "date": "2025-06-01",
            "window": "09:00-10:00",
            "status": "PENDING",
            "paymentMethod": "PAY_AT_SCHOOL",
            "createdAt": "2025-05-20T08:00:00Z",
        });
        let appointment: Appointment = serde_json::from_value(raw).expect("deserialise");
        assert!(!appointment.verified_by_function);
        assert!(!appointment.ledger_applied);
        assert!(appointment.last_rescheduled_at.is_none());
    }
}
