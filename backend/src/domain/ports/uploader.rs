//! Port for the external document-upload provider.

use async_trait::async_trait;

use super::macros::define_port_error;

define_port_error! {
    /// Errors raised by document uploader adapters.
    pub enum UploaderError {
        /// The provider rejected the payload.
        Rejected { message: String } =>
            "upload provider rejected the document: {message}",
        /// The provider could not be reached or failed mid-transfer.
        Transport { message: String } =>
            "upload provider transport failure: {message}",
    }
}

/// A document accepted by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    /// Retrievable URL of the stored document.
    pub url: String,
}

/// Port for uploading scanned documents to the hosting provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentUploader: Send + Sync {
    /// Upload a decoded image, returning its retrievable URL.
    async fn upload(&self, image: &[u8]) -> Result<UploadedDocument, UploaderError>;
}

/// Fixture implementation for tests that do not exercise uploads.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureDocumentUploader;

#[async_trait]
impl DocumentUploader for FixtureDocumentUploader {
    async fn upload(&self, image: &[u8]) -> Result<UploadedDocument, UploaderError> {
        Ok(UploadedDocument {
            url: format!("https://documents.invalid/fixture/{}", image.len()),
        })
    }
}
