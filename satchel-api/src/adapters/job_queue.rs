//! Analysis job dispatch
//!
//! `LocalJobQueue` runs jobs in-process: intake pushes onto a channel and a
//! dispatcher task drains it, running up to `concurrency` jobs at once.
//! `HttpJobQueue` hands the job to an external queue that calls back into
//! `/worker/analyze` and owns redelivery.

use async_trait::async_trait;
use satchel_common::models::{AnalysisJob, DocumentStatus};
use satchel_common::ports::{DocumentRepository, JobQueue};
use satchel_common::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::worker::sign_worker_token;
use crate::services::AnalysisWorker;

/// Pending jobs buffered before `enqueue` waits
const LOCAL_QUEUE_CAPACITY: usize = 256;

/// In-process job queue
#[derive(Clone)]
pub struct LocalJobQueue {
    sender: mpsc::Sender<AnalysisJob>,
}

/// Receiving half of a `LocalJobQueue`, consumed by `spawn_dispatcher`
pub struct JobReceiver {
    receiver: mpsc::Receiver<AnalysisJob>,
}

impl LocalJobQueue {
    pub fn channel() -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::channel(LOCAL_QUEUE_CAPACITY);
        (Self { sender }, JobReceiver { receiver })
    }
}

#[async_trait]
impl JobQueue for LocalJobQueue {
    async fn enqueue(&self, job: &AnalysisJob) -> Result<()> {
        self.sender
            .send(job.clone())
            .await
            .map_err(|_| Error::Queue("Local job dispatcher is not running".to_string()))?;

        debug!(document_id = %job.document_id, "Enqueued analysis job");
        Ok(())
    }
}

/// Drain the local queue until cancelled
///
/// Each job runs on its own task under a semaphore permit. Failures are
/// already recorded on the document by the worker; the local queue does not
/// redeliver. On cancellation the channel is closed and in-flight jobs are
/// awaited. Jobs still buffered stay `pending` in the store and are picked up
/// by `requeue_unfinished` on the next start.
pub fn spawn_dispatcher(
    jobs: JobReceiver,
    worker: Arc<AnalysisWorker>,
    concurrency: usize,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut receiver = jobs.receiver;

    tokio::spawn(async move {
        info!(concurrency, "Local analysis dispatcher started");
        let mut in_flight = JoinSet::new();

        loop {
            let job = tokio::select! {
                _ = cancel_token.cancelled() => break,
                Some(finished) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_join_error(finished);
                    continue;
                }
                job = receiver.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let permit = tokio::select! {
                _ = cancel_token.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let worker = worker.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                if let Err(e) = worker.analyze(&job).await {
                    warn!(document_id = %job.document_id, error = %e, "Analysis job failed");
                }
            });
        }

        receiver.close();
        let mut abandoned = 0usize;
        while receiver.try_recv().is_ok() {
            abandoned += 1;
        }
        if abandoned > 0 {
            info!(abandoned, "Queued jobs left pending for the next start");
        }

        info!(in_flight = in_flight.len(), "Waiting for running analysis jobs");
        while let Some(finished) = in_flight.join_next().await {
            log_join_error(finished);
        }

        info!("Local analysis dispatcher stopped");
    })
}

fn log_join_error(finished: std::result::Result<(), JoinError>) {
    if let Err(e) = finished {
        error!(error = %e, "Analysis task panicked");
    }
}

/// Enqueue every document the store still holds as `pending` or `processing`
///
/// The local queue keeps nothing across restarts, so documents accepted or
/// started by a previous run are handed to the worker again. The worker
/// resumes `processing` documents and skips anything already terminal.
pub async fn requeue_unfinished(
    documents: &dyn DocumentRepository,
    queue: &dyn JobQueue,
) -> Result<usize> {
    let mut requeued = 0;

    for status in [DocumentStatus::Processing, DocumentStatus::Pending] {
        for document in documents.list_by_status(status).await? {
            queue.enqueue(&AnalysisJob::from(&document)).await?;
            requeued += 1;
        }
    }

    if requeued > 0 {
        info!(requeued, "Requeued unfinished documents");
    }
    Ok(requeued)
}

/// Queue backed by an external HTTP task service
pub struct HttpJobQueue {
    http_client: reqwest::Client,
    endpoint: String,
    principal: String,
    secret: String,
}

impl HttpJobQueue {
    pub fn new(endpoint: String, principal: String, secret: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Queue(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint,
            principal,
            secret,
        })
    }
}

#[async_trait]
impl JobQueue for HttpJobQueue {
    async fn enqueue(&self, job: &AnalysisJob) -> Result<()> {
        let token = sign_worker_token(&self.secret, &self.principal, Duration::from_secs(300))?;

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(job)
            .send()
            .await
            .map_err(|e| Error::Queue(format!("Failed to reach task queue: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(document_id = %job.document_id, status = %status, "Task queue rejected job");
            return Err(Error::Queue(format!("Task queue returned {}: {}", status, body)));
        }

        debug!(document_id = %job.document_id, endpoint = %self.endpoint, "Dispatched analysis job");
        Ok(())
    }
}
