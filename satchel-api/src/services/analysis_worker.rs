//! Analysis worker
//!
//! Consumes one job: `pending → processing`, download, classify, persist,
//! `processing → completed`. Any failure on the way is recorded as
//! `processing → error` and returned so the queue can apply its own
//! redelivery policy. Nothing here retries.

use satchel_common::models::{AnalysisJob, DocumentRecord, DocumentStatus};
use satchel_common::ports::{BlobStorage, DocumentClassifier, DocumentRepository, FamilyRepository};
use satchel_common::{Error, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::notifications::NotificationService;

/// What the worker did with a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// Analysis persisted, document completed
    Completed,
    /// Document was already terminal (redelivery); acknowledged as-is
    AlreadyFinished(DocumentStatus),
    /// Document no longer exists
    Missing,
}

pub struct AnalysisWorker {
    documents: Arc<dyn DocumentRepository>,
    families: Arc<dyn FamilyRepository>,
    blobs: Arc<dyn BlobStorage>,
    classifier: Arc<dyn DocumentClassifier>,
    notifications: Arc<NotificationService>,
}

impl AnalysisWorker {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        families: Arc<dyn FamilyRepository>,
        blobs: Arc<dyn BlobStorage>,
        classifier: Arc<dyn DocumentClassifier>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            documents,
            families,
            blobs,
            classifier,
            notifications,
        }
    }

    pub async fn analyze(&self, job: &AnalysisJob) -> Result<AnalysisOutcome> {
        let Some(document) = self.documents.get(job.family_id, job.document_id).await? else {
            warn!(document_id = %job.document_id, "Document deleted before analysis");
            return Ok(AnalysisOutcome::Missing);
        };

        match document.status {
            status if status.is_terminal() => {
                info!(document_id = %document.id, status = status.as_str(), "Skipping finished document");
                return Ok(AnalysisOutcome::AlreadyFinished(status));
            }
            DocumentStatus::Pending => {
                if !self
                    .documents
                    .transition(document.id, DocumentStatus::Processing, None)
                    .await?
                {
                    // Lost the race to another delivery of the same job
                    return self.current_outcome(job).await;
                }
            }
            // Redelivered while stuck in processing: resume
            _ => info!(document_id = %document.id, "Resuming document left in processing"),
        }

        info!(document_id = %document.id, family_id = %job.family_id, "Analysis started");

        match self.run(job).await {
            Ok(true) => {
                info!(document_id = %document.id, "Analysis completed");
                if let Some(done) = self.documents.get(job.family_id, job.document_id).await? {
                    self.notifications.notify_analysis_complete(&done).await;
                }
                Ok(AnalysisOutcome::Completed)
            }
            Ok(false) => self.current_outcome(job).await,
            Err(e) => {
                error!(document_id = %document.id, error = %e, "Analysis failed");
                let message = e.to_string();
                if let Err(record_err) = self
                    .documents
                    .transition(document.id, DocumentStatus::Error, Some(&message))
                    .await
                {
                    error!(document_id = %document.id, error = %record_err, "Failed to record analysis error");
                }
                Err(e)
            }
        }
    }

    /// Download, classify and persist; false when the document left `processing`
    async fn run(&self, job: &AnalysisJob) -> Result<bool> {
        let bytes = self.blobs.get(&job.blob_path).await?;
        let profiles = self.families.list_profiles(job.family_id).await?;

        let analysis = self
            .classifier
            .classify(&bytes, &job.mime_type, &profiles)
            .await?;

        info!(
            document_id = %job.document_id,
            category = analysis.category.as_str(),
            events = analysis.events.len(),
            tasks = analysis.tasks.len(),
            "Classifier returned"
        );

        self.documents.save_analysis(job.document_id, &analysis).await
    }

    async fn current_outcome(&self, job: &AnalysisJob) -> Result<AnalysisOutcome> {
        let document: Option<DocumentRecord> =
            self.documents.get(job.family_id, job.document_id).await?;
        match document {
            None => Ok(AnalysisOutcome::Missing),
            Some(doc) if doc.status.is_terminal() => Ok(AnalysisOutcome::AlreadyFinished(doc.status)),
            Some(doc) => Err(Error::Internal(format!(
                "Document {} is {} after analysis",
                doc.id,
                doc.status.as_str()
            ))),
        }
    }
}
