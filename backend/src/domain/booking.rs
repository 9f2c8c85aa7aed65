//! Appointment lifecycle manager.
//!
//! Owns appointment documents and drives slot ledger updates in lock-step
//! with every state change: the appointment write and its ledger mutation
//! always commit in the same transaction.

use std::sync::Arc;

use mockable::Clock;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::domain::appointment::{
    AccountId, Appointment, AppointmentId, AppointmentStatus, PaymentMethod,
};
use crate::domain::error::Error;
use crate::domain::ports::store::{
    DocumentStore, MAX_TXN_ATTEMPTS, StoreError, StoreTransaction, collections, conflict_backoff,
    decode_document, encode_document,
};
use crate::domain::role::{Role, RoleRecord};
use crate::domain::slot::{BookingDate, DEFAULT_SLOT_CAPACITY, SlotKey, TimeWindow};
use crate::domain::slot_ledger::{self, LedgerError, ReleaseOutcome};

/// Default cap on simultaneously active appointments per account.
pub const DEFAULT_ACTIVE_APPOINTMENT_CAP: usize = 3;

/// Capacity and fairness limits applied by the booking service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingLimits {
    /// Capacity given to slot documents created lazily on first booking.
    pub slot_capacity: u32,
    /// Maximum simultaneously active (non-terminal) appointments per account.
    pub max_active_appointments: usize,
}

impl Default for BookingLimits {
    fn default() -> Self {
        Self {
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            max_active_appointments: DEFAULT_ACTIVE_APPOINTMENT_CAP,
        }
    }
}

pub(crate) fn map_store_error(err: StoreError) -> Error {
    match err {
        StoreError::Conflict => {
            Error::service_unavailable("the booking store is contended; retry shortly")
        }
        StoreError::Backend { message } => Error::internal(format!("document store failure: {message}")),
    }
}

pub(crate) fn map_ledger_error(err: LedgerError) -> Error {
    match err {
        LedgerError::SlotFull { key, capacity } => {
            Error::resource_exhausted("selected slot is full")
                .with_details(json!({ "slot": key, "capacity": capacity }))
        }
        LedgerError::SourceSlotMissing { key } => {
            error!(slot = %key, "ledger entry missing for an active appointment");
            Error::internal("slot ledger entry missing for an active appointment")
        }
        LedgerError::Store(err) => map_store_error(err),
    }
}

fn retries_exhausted() -> Error {
    Error::service_unavailable("the booking transaction kept conflicting; retry shortly")
}

/// Appointment lifecycle service.
pub struct BookingService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    limits: BookingLimits,
}

impl BookingService {
    /// Create a service over the document store.
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, limits: BookingLimits) -> Self {
        Self {
            store,
            clock,
            limits,
        }
    }

    async fn read_appointment(
        tx: &mut dyn StoreTransaction,
        id: &AppointmentId,
    ) -> Result<Option<Appointment>, Error> {
        let value = tx
            .get(collections::APPOINTMENTS, id.as_str())
            .await
            .map_err(map_store_error)?;
        value
            .map(decode_document)
            .transpose()
            .map_err(map_store_error)
    }

    fn stage_appointment(
        tx: &mut dyn StoreTransaction,
        id: &AppointmentId,
        appointment: &Appointment,
    ) -> Result<(), Error> {
        let value = encode_document(appointment).map_err(map_store_error)?;
        tx.set(collections::APPOINTMENTS, id.as_str(), value);
        Ok(())
    }

    /// Count an account's non-terminal appointments outside any transaction.
    ///
    /// This backs the per-account cap pre-check. It deliberately races with
    /// the booking transaction: under heavy concurrency the cap may be
    /// exceeded by one. Hardening it would need a per-account counter
    /// document, which this design does not carry.
    async fn count_active(&self, uid: &AccountId) -> Result<usize, Error> {
        let documents = self
            .store
            .find_by_field(collections::APPOINTMENTS, "userId", &json!(uid.as_str()))
            .await
            .map_err(map_store_error)?;
        let mut active = 0;
        for document in documents {
            let appointment: Appointment =
                decode_document(document.data).map_err(map_store_error)?;
            if appointment.status.occupies_slot() {
                active += 1;
            }
        }
        Ok(active)
    }

    async fn require_staff(&self, actor: &AccountId) -> Result<(), Error> {
        let value = self
            .store
            .get(collections::ROLES, actor.as_str())
            .await
            .map_err(map_store_error)?;
        let record: Option<RoleRecord> = value
            .map(decode_document)
            .transpose()
            .map_err(map_store_error)?;
        match record.map(|record| record.role) {
            Some(Role::Cashier | Role::Admin) => Ok(()),
            _ => Err(Error::forbidden("cashier or admin role required")),
        }
    }

    fn reject_past_dates(&self, date: BookingDate) -> Result<(), Error> {
        if date.as_naive() < self.clock.utc().date_naive() {
            return Err(Error::invalid_request("appointment date must not be in the past")
                .with_details(json!({ "field": "date" })));
        }
        Ok(())
    }

    /// Book a slot for an account.
    ///
    /// The appointment id is deterministic in `(account, date, window)`, so
    /// a duplicate attempt collides on write: an existing non-terminal
    /// appointment fails the call with a conflict, while a terminal one is
    /// overwritten to allow rebooking. The slot reservation and the
    /// appointment write commit in one transaction.
    pub async fn create(
        &self,
        uid: &AccountId,
        date: BookingDate,
        window: TimeWindow,
        payment_method: PaymentMethod,
    ) -> Result<AppointmentId, Error> {
        self.reject_past_dates(date)?;
        if self.count_active(uid).await? >= self.limits.max_active_appointments {
            return Err(Error::resource_exhausted(
                "active appointment limit reached for this account",
            ));
        }

        let key = SlotKey::new(date, window);
        let id = AppointmentId::derive(uid, &key);
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut tx = self.store.begin().await.map_err(map_store_error)?;
            if let Some(existing) = Self::read_appointment(tx.as_mut(), &id).await? {
                if existing.status.occupies_slot() {
                    return Err(Error::conflict(
                        "an appointment is already booked for this slot",
                    ));
                }
            }
            let now = self.clock.utc();
            slot_ledger::reserve_unit(tx.as_mut(), &key, self.limits.slot_capacity, now)
                .await
                .map_err(map_ledger_error)?;
            let appointment = Appointment::booked(uid.clone(), key, payment_method, now);
            Self::stage_appointment(tx.as_mut(), &id, &appointment)?;
            match tx.commit().await {
                Ok(()) => return Ok(id),
                Err(StoreError::Conflict) => conflict_backoff(attempt).await,
                Err(err) => return Err(map_store_error(err)),
            }
        }
        Err(retries_exhausted())
    }

    /// Move an appointment's status through the lifecycle machine.
    ///
    /// Entering a terminal state releases the slot unit in the same
    /// transaction, which is what makes the identity key rebookable.
    pub async fn update_status(
        &self,
        actor: &AccountId,
        id: &AppointmentId,
        next: AppointmentStatus,
    ) -> Result<(), Error> {
        self.require_staff(actor).await?;
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut tx = self.store.begin().await.map_err(map_store_error)?;
            let Some(mut appointment) = Self::read_appointment(tx.as_mut(), id).await? else {
                return Err(Error::not_found("appointment not found"));
            };
            let previous = appointment.status;
            if !previous.can_transition_to(next) {
                return Err(Error::conflict(format!(
                    "cannot move appointment from {previous} to {next}"
                )));
            }
            let now = self.clock.utc();
            appointment.status = next;
            if next.is_terminal() && previous.occupies_slot() && appointment.ledger_applied {
                match slot_ledger::release_unit(tx.as_mut(), &appointment.slot_key(), now)
                    .await
                    .map_err(map_ledger_error)?
                {
                    ReleaseOutcome::Released { .. } => {}
                    ReleaseOutcome::SlotMissing => {
                        warn!(slot = %appointment.slot_key(), "slot missing while releasing a terminal appointment");
                    }
                }
                appointment.ledger_applied = false;
            }
            Self::stage_appointment(tx.as_mut(), id, &appointment)?;
            match tx.commit().await {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict) => conflict_backoff(attempt).await,
                Err(err) => return Err(map_store_error(err)),
            }
        }
        Err(retries_exhausted())
    }

    /// Fire the paid side-effect for an appointment, exactly once.
    ///
    /// The `verified_by_function` flag is observed and set in the same
    /// transaction, so a duplicate delivery of the same PAID transition is
    /// a no-op.
    pub async fn mark_paid(&self, id: &AppointmentId) -> Result<(), Error> {
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut tx = self.store.begin().await.map_err(map_store_error)?;
            let Some(mut appointment) = Self::read_appointment(tx.as_mut(), id).await? else {
                return Err(Error::not_found("appointment not found"));
            };
            if appointment.verified_by_function {
                return Ok(());
            }
            if appointment.status != AppointmentStatus::Paid {
                debug!(appointment = %id, status = %appointment.status, "ignoring stale paid notification");
                return Ok(());
            }
            appointment.verified_by_function = true;
            appointment.verified_at = Some(self.clock.utc());
            Self::stage_appointment(tx.as_mut(), id, &appointment)?;
            match tx.commit().await {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict) => conflict_backoff(attempt).await,
                Err(err) => return Err(map_store_error(err)),
            }
        }
        Err(retries_exhausted())
    }

    /// Delete an appointment, releasing its slot unit in the same
    /// transaction. A missing slot is tolerated and logged.
    pub async fn delete(&self, uid: &AccountId, id: &AppointmentId) -> Result<(), Error> {
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut tx = self.store.begin().await.map_err(map_store_error)?;
            let Some(appointment) = Self::read_appointment(tx.as_mut(), id).await? else {
                return Err(Error::not_found("appointment not found"));
            };
            if appointment.user_id != *uid {
                return Err(Error::forbidden(
                    "appointments can only be deleted by their owner",
                ));
            }
            let now = self.clock.utc();
            tx.delete(collections::APPOINTMENTS, id.as_str());
            if appointment.status.occupies_slot() && appointment.ledger_applied {
                match slot_ledger::release_unit(tx.as_mut(), &appointment.slot_key(), now)
                    .await
                    .map_err(map_ledger_error)?
                {
                    ReleaseOutcome::Released { .. } => {}
                    ReleaseOutcome::SlotMissing => {
                        warn!(slot = %appointment.slot_key(), "slot missing while deleting an appointment");
                    }
                }
            }
            match tx.commit().await {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict) => conflict_backoff(attempt).await,
                Err(err) => return Err(map_store_error(err)),
            }
        }
        Err(retries_exhausted())
    }

    /// Move an appointment to another slot atomically.
    ///
    /// Re-keys the appointment document (identity is derived from the slot),
    /// moves the ledger unit, and stamps `last_rescheduled_at`, all in one
    /// transaction. On failure the appointment and both slots are unchanged.
    pub async fn reschedule(
        &self,
        uid: &AccountId,
        id: &AppointmentId,
        new_date: BookingDate,
        new_window: TimeWindow,
    ) -> Result<AppointmentId, Error> {
        self.reject_past_dates(new_date)?;
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut tx = self.store.begin().await.map_err(map_store_error)?;
            let Some(mut appointment) = Self::read_appointment(tx.as_mut(), id).await? else {
                return Err(Error::not_found("appointment not found"));
            };
            if appointment.user_id != *uid {
                return Err(Error::forbidden(
                    "appointments can only be rescheduled by their owner",
                ));
            }
            if appointment.status.is_terminal() {
                return Err(Error::conflict(
                    "cannot reschedule a cancelled or rejected appointment",
                ));
            }
            let old_key = appointment.slot_key();
            let new_key = SlotKey::new(new_date, new_window);
            if new_key == old_key {
                return Ok(id.clone());
            }
            let new_id = AppointmentId::derive(uid, &new_key);
            if let Some(occupant) = Self::read_appointment(tx.as_mut(), &new_id).await? {
                if occupant.status.occupies_slot() {
                    return Err(Error::conflict(
                        "an appointment is already booked for the target slot",
                    ));
                }
            }
            let now = self.clock.utc();
            slot_ledger::move_unit(
                tx.as_mut(),
                &old_key,
                &new_key,
                self.limits.slot_capacity,
                now,
            )
            .await
            .map_err(map_ledger_error)?;
            appointment.date = new_date;
            appointment.window = new_window;
            appointment.last_rescheduled_at = Some(now);
            tx.delete(collections::APPOINTMENTS, id.as_str());
            Self::stage_appointment(tx.as_mut(), &new_id, &appointment)?;
            match tx.commit().await {
                Ok(()) => return Ok(new_id),
                Err(StoreError::Conflict) => conflict_backoff(attempt).await,
                Err(err) => return Err(map_store_error(err)),
            }
        }
        Err(retries_exhausted())
    }
}

#[cfg(test)]
#[path = "booking_tests.rs"]
mod tests;
