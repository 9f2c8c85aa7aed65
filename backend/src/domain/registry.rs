//! Unique handle registry.
//!
//! Reserves globally unique usernames bound 1:1 to an account. The
//! reservation document id is the normalised handle, so any case or
//! whitespace variant of a taken handle collides on write.

use std::sync::Arc;

use mockable::Clock;
use serde_json::json;

use crate::domain::appointment::AccountId;
use crate::domain::booking::map_store_error;
use crate::domain::error::Error;
use crate::domain::handle::{Handle, HandleReservation};
use crate::domain::ports::store::{
    DocumentStore, MAX_TXN_ATTEMPTS, StoreError, collections, conflict_backoff, decode_document,
    encode_document,
};

/// Unique handle registry service.
pub struct HandleRegistry {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl HandleRegistry {
    /// Create a registry over the document store.
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Reserve a handle for an account.
    ///
    /// Fails with a conflict when any case/whitespace variant of the handle
    /// is already taken, by anyone including the requester.
    pub async fn reserve(
        &self,
        uid: &AccountId,
        email: Option<&str>,
        raw_handle: &str,
    ) -> Result<Handle, Error> {
        let handle = Handle::new(raw_handle).map_err(|err| {
            Error::invalid_request(err.to_string()).with_details(json!({ "field": "username" }))
        })?;
        let reservation = HandleReservation {
            uid: uid.clone(),
            email: email.map(ToOwned::to_owned),
            created_at: self.clock.utc(),
        };
        let document = encode_document(&reservation).map_err(map_store_error)?;
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut tx = self.store.begin().await.map_err(map_store_error)?;
            let existing = tx
                .get(collections::USERNAMES, handle.as_str())
                .await
                .map_err(map_store_error)?;
            if existing.is_some() {
                return Err(Error::conflict("username already taken"));
            }
            tx.set(collections::USERNAMES, handle.as_str(), document.clone());
            match tx.commit().await {
                Ok(()) => return Ok(handle),
                Err(StoreError::Conflict) => conflict_backoff(attempt).await,
                Err(err) => return Err(map_store_error(err)),
            }
        }
        Err(Error::service_unavailable(
            "the username transaction kept conflicting; retry shortly",
        ))
    }

    /// Release a handle.
    ///
    /// A missing reservation is a silent no-op; releasing someone else's
    /// reservation is forbidden.
    pub async fn release(&self, uid: &AccountId, raw_handle: &str) -> Result<(), Error> {
        // Release works on the normalised form alone: a handle that could
        // never validate simply has no reservation to remove.
        let normalized = Handle::normalize(raw_handle);
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut tx = self.store.begin().await.map_err(map_store_error)?;
            let Some(value) = tx
                .get(collections::USERNAMES, &normalized)
                .await
                .map_err(map_store_error)?
            else {
                return Ok(());
            };
            let reservation: HandleReservation =
                decode_document(value).map_err(map_store_error)?;
            if reservation.uid != *uid {
                return Err(Error::forbidden(
                    "usernames can only be released by their owner",
                ));
            }
            tx.delete(collections::USERNAMES, &normalized);
            match tx.commit().await {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict) => conflict_backoff(attempt).await,
                Err(err) => return Err(map_store_error(err)),
            }
        }
        Err(Error::service_unavailable(
            "the username transaction kept conflicting; retry shortly",
        ))
    }

    /// Resolve the email bound to a handle.
    ///
    /// Fails with `NotFound` when no reservation exists or the bound
    /// account has no resolvable email.
    pub async fn lookup_email(&self, raw_handle: &str) -> Result<String, Error> {
        let normalized = Handle::normalize(raw_handle);
        let Some(value) = self
            .store
            .get(collections::USERNAMES, &normalized)
            .await
            .map_err(map_store_error)?
        else {
            return Err(Error::not_found("username not registered"));
        };
        let reservation: HandleReservation = decode_document(value).map_err(map_store_error)?;
        reservation
            .email
            .filter(|email| !email.trim().is_empty())
            .ok_or_else(|| Error::not_found("no email recorded for this username"))
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
