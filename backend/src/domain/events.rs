//! Change-notification consumers.
//!
//! The store's change feed (or any out-of-band writer integration) emits
//! events onto plain mpsc channels; the consumers here mirror the
//! corresponding ledger mutations defensively. Handlers are replay
//! tolerant, unordered across appointment ids, and never re-raise: every
//! failure is caught and logged so a poisoned notification cannot crash
//! the process or retry forever.
//!
//! In-process the transactional services are the writers of record, so the
//! mirrors only ever observe writes that bypassed them. Replay safety
//! relies on two markers carried by the appointment document:
//! `ledger_applied` guards the create mirror, and an update whose
//! `last_rescheduled_at` changed was already moved by the transactional
//! reschedule.

use std::sync::Arc;

use mockable::Clock;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::domain::appointment::{AccountId, Appointment, AppointmentId, AppointmentStatus};
use crate::domain::booking::{BookingService, map_ledger_error, map_store_error};
use crate::domain::error::{Error, ErrorCode};
use crate::domain::ports::identity::IdentityProvider;
use crate::domain::ports::store::{
    DocumentStore, MAX_TXN_ATTEMPTS, StoreError, collections, conflict_backoff, decode_document,
    encode_document,
};
use crate::domain::role::{RoleRecord, RoleRules};
use crate::domain::slot_ledger::{self, ReleaseOutcome};

/// Change notification for one appointment document.
#[derive(Debug, Clone)]
pub enum AppointmentEvent {
    /// An appointment document was created.
    Created {
        /// Document id.
        id: AppointmentId,
        /// Snapshot after the create.
        appointment: Appointment,
    },
    /// An appointment document was updated in place.
    Updated {
        /// Document id.
        id: AppointmentId,
        /// Snapshot before the update.
        before: Appointment,
        /// Snapshot after the update.
        after: Appointment,
    },
    /// An appointment document was deleted.
    Deleted {
        /// Document id.
        id: AppointmentId,
        /// Final snapshot before the delete.
        appointment: Appointment,
    },
}

/// Account-created notification from the identity provider.
#[derive(Debug, Clone)]
pub struct AccountCreated {
    /// New account.
    pub uid: AccountId,
    /// Email the account registered with.
    pub email: String,
}

/// Defensive mirror applying ledger mutations for out-of-band appointment
/// writes.
pub struct LedgerMirror {
    store: Arc<dyn DocumentStore>,
    booking: Arc<BookingService>,
    clock: Arc<dyn Clock>,
    slot_capacity: u32,
}

impl LedgerMirror {
    /// Create a mirror over the store and the booking service.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        booking: Arc<BookingService>,
        clock: Arc<dyn Clock>,
        slot_capacity: u32,
    ) -> Self {
        Self {
            store,
            booking,
            clock,
            slot_capacity,
        }
    }

    /// Apply one event, logging any failure instead of raising it.
    pub async fn handle(&self, event: AppointmentEvent) {
        if let Err(err) = self.apply(event).await {
            error!(error = %err, "appointment notification mirror failed");
        }
    }

    async fn apply(&self, event: AppointmentEvent) -> Result<(), Error> {
        match event {
            AppointmentEvent::Created { id, .. } => self.mirror_created(&id).await,
            AppointmentEvent::Updated { id, before, after } => {
                self.mirror_updated(&id, &before, &after).await
            }
            AppointmentEvent::Deleted { appointment, .. } => {
                self.mirror_deleted(&appointment).await
            }
        }
    }

    /// Mirror of the reservation a create should have applied.
    ///
    /// Safe to run zero or more times: the `ledger_applied` marker is
    /// observed and set in the same transaction as the increment, so a
    /// replayed create never double-increments.
    async fn mirror_created(&self, id: &AppointmentId) -> Result<(), Error> {
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut tx = self.store.begin().await.map_err(map_store_error)?;
            let Some(value) = tx
                .get(collections::APPOINTMENTS, id.as_str())
                .await
                .map_err(map_store_error)?
            else {
                debug!(appointment = %id, "created notification for a vanished appointment");
                return Ok(());
            };
            let mut appointment: Appointment = decode_document(value).map_err(map_store_error)?;
            if appointment.ledger_applied || !appointment.status.occupies_slot() {
                return Ok(());
            }
            let now = self.clock.utc();
            slot_ledger::reserve_unit(
                tx.as_mut(),
                &appointment.slot_key(),
                self.slot_capacity,
                now,
            )
            .await
            .map_err(map_ledger_error)?;
            appointment.ledger_applied = true;
            tx.set(
                collections::APPOINTMENTS,
                id.as_str(),
                encode_document(&appointment).map_err(map_store_error)?,
            );
            match tx.commit().await {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict) => conflict_backoff(attempt).await,
                Err(err) => return Err(map_store_error(err)),
            }
        }
        Err(Error::service_unavailable(
            "the mirror transaction kept conflicting",
        ))
    }

    async fn mirror_updated(
        &self,
        id: &AppointmentId,
        before: &Appointment,
        after: &Appointment,
    ) -> Result<(), Error> {
        if before.status != AppointmentStatus::Paid && after.status == AppointmentStatus::Paid {
            match self.booking.mark_paid(id).await {
                // The document may have been deleted since the event fired.
                Err(err) if err.code() == ErrorCode::NotFound => {}
                result => result?,
            }
        }

        let old_key = before.slot_key();
        let new_key = after.slot_key();
        if old_key == new_key {
            return Ok(());
        }
        if before.last_rescheduled_at != after.last_rescheduled_at {
            // The transactional reschedule stamped the move; nothing to mirror.
            return Ok(());
        }

        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut tx = self.store.begin().await.map_err(map_store_error)?;
            let Some(value) = tx
                .get(collections::APPOINTMENTS, id.as_str())
                .await
                .map_err(map_store_error)?
            else {
                return Ok(());
            };
            let mut appointment: Appointment = decode_document(value).map_err(map_store_error)?;
            if appointment.slot_key() != new_key
                || appointment.last_rescheduled_at != after.last_rescheduled_at
            {
                // Stale or already-mirrored notification.
                return Ok(());
            }
            let now = self.clock.utc();
            slot_ledger::move_unit(tx.as_mut(), &old_key, &new_key, self.slot_capacity, now)
                .await
                .map_err(map_ledger_error)?;
            appointment.last_rescheduled_at = Some(now);
            tx.set(
                collections::APPOINTMENTS,
                id.as_str(),
                encode_document(&appointment).map_err(map_store_error)?,
            );
            match tx.commit().await {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict) => conflict_backoff(attempt).await,
                Err(err) => return Err(map_store_error(err)),
            }
        }
        Err(Error::service_unavailable(
            "the mirror transaction kept conflicting",
        ))
    }

    /// Mirror of the release a delete should have applied.
    ///
    /// Decrements floor at zero, so replays degrade to no-ops once the
    /// count is spent rather than driving it negative.
    async fn mirror_deleted(&self, snapshot: &Appointment) -> Result<(), Error> {
        if !snapshot.status.occupies_slot() || !snapshot.ledger_applied {
            return Ok(());
        }
        let key = snapshot.slot_key();
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut tx = self.store.begin().await.map_err(map_store_error)?;
            let now = self.clock.utc();
            match slot_ledger::release_unit(tx.as_mut(), &key, now)
                .await
                .map_err(map_ledger_error)?
            {
                ReleaseOutcome::Released { .. } => {}
                ReleaseOutcome::SlotMissing => {
                    warn!(slot = %key, "deleted notification for a slot that does not exist");
                    return Ok(());
                }
            }
            match tx.commit().await {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict) => conflict_backoff(attempt).await,
                Err(err) => return Err(map_store_error(err)),
            }
        }
        Err(Error::service_unavailable(
            "the mirror transaction kept conflicting",
        ))
    }
}

/// Drain appointment events until the channel closes.
pub async fn run_appointment_mirror(
    mut events: mpsc::Receiver<AppointmentEvent>,
    mirror: Arc<LedgerMirror>,
) {
    while let Some(event) = events.recv().await {
        mirror.handle(event).await;
    }
    debug!("appointment notification channel closed");
}

/// Role assignment consumer for account-created notifications.
pub struct OnboardingService {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    rules: RoleRules,
    clock: Arc<dyn Clock>,
}

impl OnboardingService {
    /// Create a consumer over the store and the identity provider.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        rules: RoleRules,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            identity,
            rules,
            clock,
        }
    }

    /// Apply one event, logging any failure instead of raising it.
    pub async fn handle(&self, event: AccountCreated) {
        if let Err(err) = self.on_account_created(&event).await {
            error!(error = %err, account = %event.uid, "account onboarding failed");
        }
    }

    /// Assign the account's role, idempotently.
    ///
    /// An existing role record wins: replays neither rewrite the record nor
    /// re-push the claim.
    async fn on_account_created(&self, event: &AccountCreated) -> Result<(), Error> {
        let role = self.rules.role_for(&event.email);
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut tx = self.store.begin().await.map_err(map_store_error)?;
            let existing = tx
                .get(collections::ROLES, event.uid.as_str())
                .await
                .map_err(map_store_error)?;
            if existing.is_some() {
                return Ok(());
            }
            let record = RoleRecord {
                uid: event.uid.clone(),
                email: event.email.clone(),
                role,
                created_at: self.clock.utc(),
            };
            tx.set(
                collections::ROLES,
                event.uid.as_str(),
                encode_document(&record).map_err(map_store_error)?,
            );
            match tx.commit().await {
                Ok(()) => {
                    self.identity
                        .set_role_claim(&event.uid, role)
                        .await
                        .map_err(|err| Error::internal(err.to_string()))?;
                    return Ok(());
                }
                Err(StoreError::Conflict) => conflict_backoff(attempt).await,
                Err(err) => return Err(map_store_error(err)),
            }
        }
        Err(Error::service_unavailable(
            "the onboarding transaction kept conflicting",
        ))
    }
}

/// Drain account-created events until the channel closes.
pub async fn run_account_onboarding(
    mut events: mpsc::Receiver<AccountCreated>,
    onboarding: Arc<OnboardingService>,
) {
    while let Some(event) = events.recv().await {
        onboarding.handle(event).await;
    }
    debug!("account notification channel closed");
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
