//! HTTP document classifier client

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use satchel_common::models::{DocumentAnalysis, Profile};
use satchel_common::ports::DocumentClassifier;
use satchel_common::{Error, Result};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    mime_type: &'a str,
    /// Base64 (standard alphabet) file content
    content: String,
    profiles: &'a [Profile],
}

/// Posts documents to an external classification service
pub struct HttpClassifier {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Classifier(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint,
        })
    }
}

#[async_trait]
impl DocumentClassifier for HttpClassifier {
    async fn classify(
        &self,
        bytes: &[u8],
        mime_type: &str,
        profiles: &[Profile],
    ) -> Result<DocumentAnalysis> {
        let request = ClassifyRequest {
            mime_type,
            content: STANDARD.encode(bytes),
            profiles,
        };

        tracing::debug!(endpoint = %self.endpoint, mime_type, size = bytes.len(), "Calling classifier");

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Classifier(format!("Classifier request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Classifier(format!("Classifier returned {}: {}", status, body)));
        }

        response
            .json::<DocumentAnalysis>()
            .await
            .map_err(|e| Error::Classifier(format!("Invalid classifier response: {}", e)))
    }
}

/// Stand-in used when no classifier endpoint is configured
///
/// Every job fails, which leaves documents in `error` with a clear message.
pub struct UnconfiguredClassifier;

#[async_trait]
impl DocumentClassifier for UnconfiguredClassifier {
    async fn classify(&self, _: &[u8], _: &str, _: &[Profile]) -> Result<DocumentAnalysis> {
        Err(Error::Classifier("No classifier endpoint configured".to_string()))
    }
}
