//! Reqwest-backed document uploader adapter.
//!
//! This adapter owns transport details only: payload encoding, timeout and
//! HTTP error mapping, and JSON decoding of the provider's response. The
//! provider accepts `{"image": "<base64>"}` and answers `{"url": "..."}`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::domain::ports::uploader::{DocumentUploader, UploadedDocument, UploaderError};

const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct UploadRequestDto<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadResponseDto {
    url: String,
}

/// Uploader adapter posting documents to one provider endpoint.
pub struct HttpDocumentUploader {
    client: Client,
    endpoint: Url,
}

impl HttpDocumentUploader {
    /// Build an adapter with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoint: Url) -> Result<Self, reqwest::Error> {
        Self::with_timeout(endpoint, DEFAULT_UPLOAD_TIMEOUT)
    }

    /// Build an adapter with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn with_timeout(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl DocumentUploader for HttpDocumentUploader {
    async fn upload(&self, image: &[u8]) -> Result<UploadedDocument, UploaderError> {
        let encoded = BASE64.encode(image);
        let payload = UploadRequestDto { image: &encoded };
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|err| UploaderError::transport(err.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(UploaderError::rejected(format!(
                "provider answered {status}"
            )));
        }
        if !status.is_success() {
            return Err(UploaderError::transport(format!(
                "provider answered {status}"
            )));
        }

        let body: UploadResponseDto = response
            .json()
            .await
            .map_err(|err| UploaderError::transport(format!("malformed provider response: {err}")))?;
        Ok(UploadedDocument { url: body.url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapters_build_for_well_formed_endpoints() {
        let endpoint = Url::parse("https://documents.example/upload").expect("valid url");
        assert!(HttpDocumentUploader::new(endpoint).is_ok());
    }

    #[test]
    fn payload_encodes_images_as_base64() {
        let encoded = BASE64.encode(b"hello");
        let payload = UploadRequestDto { image: &encoded };
        let value = serde_json::to_value(&payload).expect("serialise payload");
        assert_eq!(value, serde_json::json!({ "image": "aGVsbG8=" }));
    }
}
