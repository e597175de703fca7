//! Identity records, notification preferences and push subscriptions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-identity record: activation gate, family link, preferences
///
/// Independent of family membership; preferences are personal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub identity: String,
    pub email: String,
    pub display_name: String,
    pub family_id: Option<Uuid>,
    pub activated: bool,
    pub notify_email: bool,
    pub notify_web_push: bool,
    /// Calendar feed secret, created lazily
    pub ical_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Partial update of notification preferences
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferenceUpdate {
    pub notification_email: Option<bool>,
    pub notification_web_push: Option<bool>,
}

/// Browser-issued encryption keys for a push endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// One registered device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub identity: String,
    /// Stable hash prefix of `endpoint`
    pub endpoint_key: String,
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

/// Notification payload delivered to every device of an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    /// Relative URL opened when the notification is tapped
    pub url: String,
    /// Replaces earlier notifications with the same tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Outcome of a fan-out to all devices of one identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub sent: usize,
    /// Transient failures (device kept)
    pub failed: usize,
    /// Devices removed after a permanent failure
    pub pruned: usize,
}

impl DeliveryReport {
    pub fn merge(&mut self, other: DeliveryReport) {
        self.sent += other.sent;
        self.failed += other.failed;
        self.pruned += other.pruned;
    }
}
