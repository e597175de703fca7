//! HTTP push transport
//!
//! Posts the message payload to the device endpoint. Payload encryption and
//! VAPID signing are handled by the push gateway in front of the endpoints.

use async_trait::async_trait;
use reqwest::StatusCode;
use satchel_common::models::{PushMessage, PushSubscription};
use satchel_common::ports::{DeliveryError, PushTransport};
use satchel_common::{Error, Result};
use std::time::Duration;

/// Classify a push service response status
pub fn classify_status(status: StatusCode) -> std::result::Result<(), DeliveryError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::GONE || status == StatusCode::NOT_FOUND {
        Err(DeliveryError::Gone(format!("push service returned {}", status)))
    } else {
        Err(DeliveryError::Failed(format!("push service returned {}", status)))
    }
}

pub struct HttpPushTransport {
    http_client: reqwest::Client,
    ttl_secs: u64,
}

impl HttpPushTransport {
    pub fn new(ttl_secs: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            ttl_secs,
        })
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn send(
        &self,
        subscription: &PushSubscription,
        message: &PushMessage,
    ) -> std::result::Result<(), DeliveryError> {
        let response = self
            .http_client
            .post(&subscription.endpoint)
            .header("TTL", self.ttl_secs.to_string())
            .json(message)
            .send()
            .await
            .map_err(|e| DeliveryError::Failed(e.to_string()))?;

        classify_status(response.status())
    }
}
