//! Scheduled push fan-outs: morning digest and next-day event reminder

use chrono::{Duration, NaiveDate};
use satchel_common::models::{DeliveryReport, PushMessage};
use satchel_common::ports::{DocumentRepository, UserRepository};
use satchel_common::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::notifications::NotificationService;

/// Days ahead covered by the morning digest
const DIGEST_DAYS: i64 = 7;

/// Fan-out result returned to the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanOutSummary {
    pub status: &'static str,
    pub sent: usize,
    /// Failed deliveries, pruned devices and per-identity lookup failures
    pub errors: usize,
}

impl FanOutSummary {
    fn skipped() -> Self {
        Self {
            status: "skipped",
            sent: 0,
            errors: 0,
        }
    }

    fn add(&mut self, report: DeliveryReport) {
        self.sent += report.sent;
        self.errors += report.failed + report.pruned;
    }
}

pub fn digest_message(event_count: usize, task_count: usize) -> PushMessage {
    PushMessage {
        title: "Satchel digest".to_string(),
        body: format!(
            "{} events in the next {} days, {} open tasks",
            event_count, DIGEST_DAYS, task_count
        ),
        url: "/calendar".to_string(),
        tag: Some("morning-digest".to_string()),
    }
}

pub fn reminder_message(event_count: usize) -> PushMessage {
    PushMessage {
        title: "Tomorrow".to_string(),
        body: format!("{} events tomorrow", event_count),
        url: "/calendar".to_string(),
        tag: Some("event-reminder".to_string()),
    }
}

pub struct DigestService {
    users: Arc<dyn UserRepository>,
    documents: Arc<dyn DocumentRepository>,
    notifications: Arc<NotificationService>,
}

impl DigestService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        documents: Arc<dyn DocumentRepository>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            users,
            documents,
            notifications,
        }
    }

    /// Upcoming events and open tasks for every opted-in identity
    ///
    /// Identities with nothing upcoming are not notified.
    pub async fn morning_digest(&self, today: NaiveDate) -> Result<FanOutSummary> {
        if !self.notifications.is_enabled() {
            warn!("Push disabled, skipping morning digest");
            return Ok(FanOutSummary::skipped());
        }

        let to = today + Duration::days(DIGEST_DAYS);
        let mut summary = FanOutSummary {
            status: "ok",
            sent: 0,
            errors: 0,
        };

        for user in self.users.list_push_recipients().await? {
            let Some(family_id) = user.family_id else {
                continue;
            };

            let counts = async {
                let events = self.documents.list_events(family_id, Some(today), Some(to)).await?;
                let tasks = self.documents.list_tasks(family_id, Some(false)).await?;
                Ok::<_, Error>((events.len(), tasks.len()))
            }
            .await;

            let (events, tasks) = match counts {
                Ok(counts) => counts,
                Err(e) => {
                    warn!(identity = %user.identity, error = %e, "Digest data fetch failed");
                    summary.errors += 1;
                    continue;
                }
            };

            if events == 0 && tasks == 0 {
                continue;
            }

            match self
                .notifications
                .deliver(&user.identity, &digest_message(events, tasks))
                .await
            {
                Ok(report) => summary.add(report),
                Err(e) => {
                    warn!(identity = %user.identity, error = %e, "Digest delivery failed");
                    summary.errors += 1;
                }
            }
        }

        info!(sent = summary.sent, errors = summary.errors, "Morning digest complete");
        Ok(summary)
    }

    /// Tomorrow's events for every opted-in identity that has any
    pub async fn event_reminder(&self, today: NaiveDate) -> Result<FanOutSummary> {
        if !self.notifications.is_enabled() {
            warn!("Push disabled, skipping event reminder");
            return Ok(FanOutSummary::skipped());
        }

        let tomorrow = today + Duration::days(1);
        let mut summary = FanOutSummary {
            status: "ok",
            sent: 0,
            errors: 0,
        };

        for user in self.users.list_push_recipients().await? {
            let Some(family_id) = user.family_id else {
                continue;
            };

            let events = match self
                .documents
                .list_events(family_id, Some(tomorrow), Some(tomorrow))
                .await
            {
                Ok(events) => events,
                Err(e) => {
                    warn!(identity = %user.identity, error = %e, "Reminder data fetch failed");
                    summary.errors += 1;
                    continue;
                }
            };

            if events.is_empty() {
                continue;
            }

            match self
                .notifications
                .deliver(&user.identity, &reminder_message(events.len()))
                .await
            {
                Ok(report) => summary.add(report),
                Err(e) => {
                    warn!(identity = %user.identity, error = %e, "Reminder delivery failed");
                    summary.errors += 1;
                }
            }
        }

        info!(sent = summary.sent, errors = summary.errors, "Event reminder complete");
        Ok(summary)
    }
}
