//! Port for the transactional document store.
//!
//! The backing store holds named JSON documents in named collections and
//! offers optimistic multi-document transactions: a transaction observes a
//! consistent snapshot, stages writes, and `commit` fails with
//! [`StoreError::Conflict`] when any document it read was modified
//! concurrently. Callers retry conflicted transactions a bounded number of
//! times with jittered backoff.

use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::macros::define_port_error;

/// Collection names used by this service.
pub mod collections {
    /// Appointment documents, keyed by deterministic appointment id.
    pub const APPOINTMENTS: &str = "appointments";
    /// Slot occupancy documents, keyed by `date_window`.
    pub const SLOTS: &str = "slots";
    /// Handle reservations, keyed by normalised handle.
    pub const USERNAMES: &str = "usernames";
    /// Account role records, keyed by account id.
    pub const ROLES: &str = "roles";
    /// Clearance records, keyed by account id.
    pub const CLEARANCES: &str = "clearances";
}

define_port_error! {
    /// Errors raised by document store adapters.
    pub enum StoreError {
        /// A document read in the transaction was concurrently modified.
        Conflict =>
            "transaction conflict: a read document was concurrently modified",
        /// The store backend failed or returned malformed data.
        Backend { message: String } =>
            "document store failure: {message}",
    }
}

/// A document returned from a collection scan.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Document id within its collection.
    pub id: String,
    /// Raw document body.
    pub data: Value,
}

/// An open optimistic transaction against the store.
///
/// Reads record the observed document version; writes and deletes are
/// staged locally and only applied by a successful [`commit`].
/// Reads observe the transaction's own staged writes.
///
/// [`commit`]: StoreTransaction::commit
#[async_trait]
pub trait StoreTransaction: Send {
    /// Read one document, recording its version for the commit-time check.
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Stage a create-or-replace of one document.
    fn set(&mut self, collection: &str, id: &str, document: Value);

    /// Stage a delete of one document.
    fn delete(&mut self, collection: &str, id: &str);

    /// Atomically apply the staged writes.
    ///
    /// Fails with [`StoreError::Conflict`] when any read document changed
    /// since it was observed; nothing is applied in that case.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Port for the transactional document store collaborator.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Read one document outside any transaction.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Scan a collection for documents whose top-level `field` equals `value`.
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredDocument>, StoreError>;
}

/// Serialise a typed document into its stored JSON form.
pub fn encode_document<T: Serialize>(document: &T) -> Result<Value, StoreError> {
    serde_json::to_value(document)
        .map_err(|err| StoreError::backend(format!("encode document: {err}")))
}

/// Deserialise a stored JSON document into its typed form.
pub fn decode_document<T: DeserializeOwned>(value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value)
        .map_err(|err| StoreError::backend(format!("decode document: {err}")))
}

/// Bounded attempt count for optimistic transactions.
pub const MAX_TXN_ATTEMPTS: u32 = 5;

/// Sleep briefly before retrying a conflicted transaction.
///
/// Linear backoff with a small random jitter so concurrent retriers
/// de-synchronise instead of conflicting again in lock-step.
pub async fn conflict_backoff(attempt: u32) {
    let mut rng = SmallRng::from_entropy();
    let jitter = rng.gen_range(0..8u64);
    tokio::time::sleep(Duration::from_millis(u64::from(attempt) * 5 + jitter)).await;
}
