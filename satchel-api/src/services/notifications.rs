//! Push subscription lifecycle and delivery
//!
//! Devices are keyed per identity by a hash of their endpoint, so a device
//! that re-registers overwrites its own entry and never touches another.
//! Delivery fans out independently per device; a permanently gone device is
//! pruned without affecting the rest.

use satchel_common::models::{
    DeliveryReport, DocumentRecord, PushMessage, PushSubscription, SubscriptionKeys,
};
use satchel_common::ports::{DeliveryError, PushTransport, SubscriptionRepository, UserRepository};
use satchel_common::{tokens, Result, ValidationError};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct NotificationService {
    users: Arc<dyn UserRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    transport: Arc<dyn PushTransport>,
    /// Outbound push configured for this deployment
    enabled: bool,
}

impl NotificationService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        transport: Arc<dyn PushTransport>,
        enabled: bool,
    ) -> Self {
        Self {
            users,
            subscriptions,
            transport,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Store or overwrite the device entry for `endpoint`
    pub async fn register(
        &self,
        identity: &str,
        endpoint: &str,
        keys: SubscriptionKeys,
    ) -> Result<()> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() || keys.p256dh.is_empty() || keys.auth.is_empty() {
            return Err(ValidationError::MissingFields("endpoint, keys".to_string()).into());
        }

        let subscription = PushSubscription {
            identity: identity.to_string(),
            endpoint_key: tokens::endpoint_key(endpoint),
            endpoint: endpoint.to_string(),
            keys,
        };
        self.subscriptions.upsert(&subscription).await?;

        info!(identity, endpoint_key = %subscription.endpoint_key, "Push subscription registered");
        Ok(())
    }

    /// Remove one device, or every device when `endpoint` is absent
    pub async fn remove(&self, identity: &str, endpoint: Option<&str>) -> Result<u64> {
        let removed = match endpoint.map(str::trim).filter(|e| !e.is_empty()) {
            Some(endpoint) => {
                let key = tokens::endpoint_key(endpoint);
                u64::from(self.subscriptions.remove(identity, &key).await?)
            }
            None => self.subscriptions.remove_all(identity).await?,
        };

        info!(identity, removed, "Push subscriptions removed");
        Ok(removed)
    }

    /// Send `message` to every device of `identity`
    pub async fn deliver(&self, identity: &str, message: &PushMessage) -> Result<DeliveryReport> {
        let devices = self.subscriptions.list(identity).await?;
        let mut report = DeliveryReport::default();

        for device in &devices {
            match self.transport.send(device, message).await {
                Ok(()) => report.sent += 1,
                Err(DeliveryError::Gone(reason)) => {
                    info!(identity, endpoint_key = %device.endpoint_key, %reason, "Pruning gone push subscription");
                    match self.subscriptions.remove(identity, &device.endpoint_key).await {
                        Ok(_) => report.pruned += 1,
                        Err(e) => {
                            warn!(identity, error = %e, "Failed to prune push subscription");
                            report.failed += 1;
                        }
                    }
                }
                Err(DeliveryError::Failed(reason)) => {
                    warn!(identity, endpoint_key = %device.endpoint_key, %reason, "Push delivery failed");
                    report.failed += 1;
                }
            }
        }

        debug!(identity, sent = report.sent, failed = report.failed, pruned = report.pruned, "Push fan-out finished");
        Ok(report)
    }

    /// Best-effort analysis-complete notification for the uploader
    ///
    /// Never fails: errors are logged and dropped.
    pub async fn notify_analysis_complete(&self, document: &DocumentRecord) {
        if !self.enabled {
            return;
        }

        let wants_push = match self.users.get(&document.identity).await {
            Ok(Some(user)) => user.notify_web_push,
            Ok(None) => false,
            Err(e) => {
                warn!(document_id = %document.id, error = %e, "Could not read notification preferences");
                return;
            }
        };
        if !wants_push {
            return;
        }

        let message = analysis_complete_message(document);
        match self.deliver(&document.identity, &message).await {
            Ok(report) => {
                debug!(document_id = %document.id, sent = report.sent, "Analysis notification sent")
            }
            Err(e) => {
                warn!(document_id = %document.id, error = %e, "Analysis notification failed")
            }
        }
    }
}

/// Notification announcing a finished analysis
pub fn analysis_complete_message(document: &DocumentRecord) -> PushMessage {
    let name = if document.archive_filename.is_empty() {
        &document.original_filename
    } else {
        &document.archive_filename
    };
    let body = if document.summary.is_empty() {
        name.clone()
    } else {
        format!("{}: {}", name, document.summary)
    };

    PushMessage {
        title: "Analysis complete".to_string(),
        body,
        url: format!("/documents/{}", document.id),
        tag: Some(format!("analysis-complete-{}", document.id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use satchel_common::db::init_memory_database;
    use std::sync::Mutex;

    use crate::db::{SqliteSubscriptionRepository, SqliteUserRepository};

    /// Transport whose outcome depends on the endpoint
    #[derive(Default)]
    struct ScriptedTransport {
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PushTransport for ScriptedTransport {
        async fn send(
            &self,
            subscription: &PushSubscription,
            _message: &PushMessage,
        ) -> std::result::Result<(), DeliveryError> {
            if subscription.endpoint.contains("gone") {
                return Err(DeliveryError::Gone("410".to_string()));
            }
            if subscription.endpoint.contains("flaky") {
                return Err(DeliveryError::Failed("503".to_string()));
            }
            self.delivered
                .lock()
                .unwrap()
                .push(subscription.endpoint.clone());
            Ok(())
        }
    }

    async fn service() -> (NotificationService, Arc<ScriptedTransport>, Arc<SqliteSubscriptionRepository>) {
        let pool = init_memory_database().await.unwrap();
        let subscriptions = Arc::new(SqliteSubscriptionRepository::new(pool.clone()));
        let transport = Arc::new(ScriptedTransport::default());
        let service = NotificationService::new(
            Arc::new(SqliteUserRepository::new(pool)),
            subscriptions.clone(),
            transport.clone(),
            true,
        );
        (service, transport, subscriptions)
    }

    fn keys() -> SubscriptionKeys {
        SubscriptionKeys {
            p256dh: "p256".to_string(),
            auth: "auth".to_string(),
        }
    }

    fn message() -> PushMessage {
        PushMessage {
            title: "t".to_string(),
            body: "b".to_string(),
            url: "/".to_string(),
            tag: None,
        }
    }

    #[tokio::test]
    async fn test_gone_device_pruned_others_delivered() {
        let (service, transport, subscriptions) = service().await;
        service.register("alice", "https://push/gone", keys()).await.unwrap();
        service.register("alice", "https://push/phone", keys()).await.unwrap();
        service.register("alice", "https://push/flaky", keys()).await.unwrap();

        let report = service.deliver("alice", &message()).await.unwrap();
        assert_eq!(
            report,
            DeliveryReport {
                sent: 1,
                failed: 1,
                pruned: 1
            }
        );
        assert_eq!(*transport.delivered.lock().unwrap(), vec!["https://push/phone"]);

        let remaining: Vec<String> = subscriptions
            .list("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.endpoint)
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(!remaining.contains(&"https://push/gone".to_string()));
    }

    #[tokio::test]
    async fn test_remove_one_or_all() {
        let (service, _, subscriptions) = service().await;
        service.register("alice", "https://push/a", keys()).await.unwrap();
        service.register("alice", "https://push/b", keys()).await.unwrap();
        service.register("bob", "https://push/c", keys()).await.unwrap();

        assert_eq!(service.remove("alice", Some("https://push/a")).await.unwrap(), 1);
        let left = subscriptions.list("alice").await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].endpoint, "https://push/b");

        assert_eq!(service.remove("alice", None).await.unwrap(), 1);
        assert!(subscriptions.list("alice").await.unwrap().is_empty());
        // Other identities untouched
        assert_eq!(subscriptions.list("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_requires_fields() {
        let (service, _, _) = service().await;
        let err = service
            .register(
                "alice",
                " ",
                SubscriptionKeys {
                    p256dh: String::new(),
                    auth: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            satchel_common::Error::Validation(ValidationError::MissingFields(_))
        ));
    }
}
