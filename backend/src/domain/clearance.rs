//! Clearance records and permit uploads.
//!
//! Privileged staff attach a scanned permit document to a user's clearance
//! record. The image arrives base64-encoded, is pushed through the
//! document-upload provider, and the returned URL is merged into the
//! target's clearance document (`permitUrl`, `permitReady`,
//! `permitUpdatedAt`) without disturbing other fields.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use mockable::Clock;
use serde_json::{Value, json};

use crate::domain::appointment::AccountId;
use crate::domain::booking::map_store_error;
use crate::domain::error::Error;
use crate::domain::ports::store::{
    DocumentStore, MAX_TXN_ATTEMPTS, StoreError, collections, conflict_backoff, decode_document,
};
use crate::domain::ports::uploader::{DocumentUploader, UploaderError};
use crate::domain::role::{Role, RoleRecord};

/// Permit upload service.
pub struct ClearanceService {
    store: Arc<dyn DocumentStore>,
    uploader: Arc<dyn DocumentUploader>,
    clock: Arc<dyn Clock>,
}

impl ClearanceService {
    /// Create a service over the store and the upload provider.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        uploader: Arc<dyn DocumentUploader>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            uploader,
            clock,
        }
    }

    async fn require_admin(&self, actor: &AccountId) -> Result<(), Error> {
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
            Some(Role::Admin) => Ok(()),
            _ => Err(Error::forbidden("admin role required")),
        }
    }

    /// Upload a permit image for `target` and merge the resulting URL into
    /// its clearance record. Admin only.
    pub async fn upload_permit(
        &self,
        actor: &AccountId,
        target: &AccountId,
        base64_image: &str,
    ) -> Result<String, Error> {
        self.require_admin(actor).await?;
        let image = BASE64.decode(base64_image.trim()).map_err(|_| {
            Error::invalid_request("permit image must be valid base64")
                .with_details(json!({ "field": "base64Image" }))
        })?;
        if image.is_empty() {
            return Err(Error::invalid_request("permit image must not be empty")
                .with_details(json!({ "field": "base64Image" })));
        }

        let uploaded = self.uploader.upload(&image).await.map_err(|err| match err {
            UploaderError::Rejected { message } => {
                Error::invalid_request(format!("upload provider rejected the document: {message}"))
            }
            UploaderError::Transport { message } => {
                Error::service_unavailable(format!("upload provider unavailable: {message}"))
            }
        })?;

        let updated_at = serde_json::to_value(self.clock.utc())
            .map_err(|err| Error::internal(format!("encode timestamp: {err}")))?;
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut tx = self.store.begin().await.map_err(map_store_error)?;
            let mut clearance = tx
                .get(collections::CLEARANCES, target.as_str())
                .await
                .map_err(map_store_error)?
                .filter(Value::is_object)
                .unwrap_or_else(|| json!({}));
            if let Some(fields) = clearance.as_object_mut() {
                fields.insert("permitUrl".to_owned(), json!(uploaded.url));
                fields.insert("permitReady".to_owned(), json!(true));
                fields.insert("permitUpdatedAt".to_owned(), updated_at.clone());
            }
            tx.set(collections::CLEARANCES, target.as_str(), clearance);
            match tx.commit().await {
                Ok(()) => return Ok(uploaded.url),
                Err(StoreError::Conflict) => conflict_backoff(attempt).await,
                Err(err) => return Err(map_store_error(err)),
            }
        }
        Err(Error::service_unavailable(
            "the clearance transaction kept conflicting; retry shortly",
        ))
    }
}

#[cfg(test)]
#[path = "clearance_tests.rs"]
mod tests;
