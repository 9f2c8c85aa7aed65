//! Slot ledger: capacity-bounded occupancy arithmetic.
//!
//! Every operation stages its writes against a transaction owned by the
//! caller, so the slot mutation and the appointment mutation it accompanies
//! commit together or not at all. Increments past capacity hard-fail;
//! decrements floor at zero so a lost decrement can be recovered from
//! without driving the count negative.

use chrono::{DateTime, Utc};

use crate::domain::ports::store::{
    StoreError, StoreTransaction, collections, decode_document, encode_document,
};
use crate::domain::slot::{Slot, SlotKey};

/// Errors raised by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The slot has no remaining capacity.
    #[error("slot {key} is full ({capacity} booked)")]
    SlotFull {
        /// Slot that rejected the reservation.
        key: String,
        /// Capacity the slot was full at.
        capacity: u32,
    },
    /// The source slot of a move does not exist: a consistency anomaly,
    /// since an active appointment must have created it. Callers log it and
    /// abort; the ledger never auto-repairs.
    #[error("slot {key} is missing for an active appointment")]
    SourceSlotMissing {
        /// Slot expected to exist.
        key: String,
    },
    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a successful reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotReservation {
    /// Capacity of the slot the unit was reserved on.
    pub capacity: u32,
    /// Booked count after the reservation.
    pub booked_count: u32,
}

/// Outcome of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The slot existed and was decremented (flooring at zero).
    Released {
        /// Booked count after the release.
        booked_count: u32,
    },
    /// The slot did not exist; nothing was staged.
    SlotMissing,
}

async fn read_slot(
    tx: &mut dyn StoreTransaction,
    key: &SlotKey,
) -> Result<Option<Slot>, LedgerError> {
    let value = tx.get(collections::SLOTS, &key.document_id()).await?;
    value.map(decode_document).transpose().map_err(Into::into)
}

fn stage_slot(tx: &mut dyn StoreTransaction, slot: &Slot) -> Result<(), LedgerError> {
    tx.set(
        collections::SLOTS,
        &slot.key().document_id(),
        encode_document(slot)?,
    );
    Ok(())
}

/// Reserve one unit on a slot, creating the slot document lazily.
///
/// Fails with [`LedgerError::SlotFull`] when the slot is at capacity; the
/// caller's transaction then aborts without partial writes.
pub async fn reserve_unit(
    tx: &mut dyn StoreTransaction,
    key: &SlotKey,
    default_capacity: u32,
    now: DateTime<Utc>,
) -> Result<SlotReservation, LedgerError> {
    let slot = match read_slot(tx, key).await? {
        None => {
            if default_capacity == 0 {
                return Err(LedgerError::SlotFull {
                    key: key.document_id(),
                    capacity: default_capacity,
                });
            }
            Slot::first_booking(*key, default_capacity, now)
        }
        Some(mut slot) => {
            if slot.booked_count >= slot.capacity {
                return Err(LedgerError::SlotFull {
                    key: key.document_id(),
                    capacity: slot.capacity,
                });
            }
            slot.booked_count += 1;
            slot.updated_at = now;
            slot
        }
    };
    let reservation = SlotReservation {
        capacity: slot.capacity,
        booked_count: slot.booked_count,
    };
    stage_slot(tx, &slot)?;
    Ok(reservation)
}

/// Release one unit from a slot.
///
/// An absent slot is a no-op so double-releases stay idempotent; an
/// existing slot is decremented with a floor of zero.
pub async fn release_unit(
    tx: &mut dyn StoreTransaction,
    key: &SlotKey,
    now: DateTime<Utc>,
) -> Result<ReleaseOutcome, LedgerError> {
    let Some(mut slot) = read_slot(tx, key).await? else {
        return Ok(ReleaseOutcome::SlotMissing);
    };
    slot.booked_count = slot.booked_count.saturating_sub(1);
    slot.updated_at = now;
    let booked_count = slot.booked_count;
    stage_slot(tx, &slot)?;
    Ok(ReleaseOutcome::Released { booked_count })
}

/// Move one unit between two distinct slots in the caller's transaction.
///
/// Both sub-steps are staged together: the decrement on `old` and the
/// increment on `new` commit atomically or not at all. Fails with
/// [`LedgerError::SourceSlotMissing`] when `old` does not exist and with
/// [`LedgerError::SlotFull`] when `new` has no capacity; either failure
/// leaves the transaction without staged ledger writes.
pub async fn move_unit(
    tx: &mut dyn StoreTransaction,
    old: &SlotKey,
    new: &SlotKey,
    default_capacity: u32,
    now: DateTime<Utc>,
) -> Result<SlotReservation, LedgerError> {
    let Some(mut old_slot) = read_slot(tx, old).await? else {
        return Err(LedgerError::SourceSlotMissing {
            key: old.document_id(),
        });
    };
    let new_slot = match read_slot(tx, new).await? {
        None => {
            if default_capacity == 0 {
                return Err(LedgerError::SlotFull {
                    key: new.document_id(),
                    capacity: default_capacity,
                });
            }
            Slot::first_booking(*new, default_capacity, now)
        }
        Some(mut slot) => {
            if slot.booked_count >= slot.capacity {
                return Err(LedgerError::SlotFull {
                    key: new.document_id(),
                    capacity: slot.capacity,
                });
            }
            slot.booked_count += 1;
            slot.updated_at = now;
            slot
        }
    };

    old_slot.booked_count = old_slot.booked_count.saturating_sub(1);
    old_slot.updated_at = now;
    stage_slot(tx, &old_slot)?;
    let reservation = SlotReservation {
        capacity: new_slot.capacity,
        booked_count: new_slot.booked_count,
    };
    stage_slot(tx, &new_slot)?;
    Ok(reservation)
}

#[cfg(test)]
#[path = "slot_ledger_tests.rs"]
mod tests;
