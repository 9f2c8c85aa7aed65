//! Ports (trait seams) between the domain and its external collaborators.

pub(crate) mod macros;

pub mod identity;
pub mod store;
pub mod uploader;

pub use identity::{FixtureIdentityProvider, IdentityProvider, IdentityProviderError};
pub use store::{
    DocumentStore, MAX_TXN_ATTEMPTS, StoreError, StoreTransaction, StoredDocument, collections,
    conflict_backoff, decode_document, encode_document,
};
pub use uploader::{DocumentUploader, FixtureDocumentUploader, UploadedDocument, UploaderError};

#[cfg(test)]
pub use identity::MockIdentityProvider;
#[cfg(test)]
pub use uploader::MockDocumentUploader;
