//! External collaborator adapters
//!
//! Implementations of the blob storage, job queue, classifier, push transport
//! and calendar rendering ports.

pub mod blob_fs;
pub mod classifier;
pub mod ical;
pub mod job_queue;
pub mod push;

pub use blob_fs::FsBlobStorage;
pub use classifier::{HttpClassifier, UnconfiguredClassifier};
pub use ical::IcalRenderer;
pub use job_queue::{requeue_unfinished, spawn_dispatcher, HttpJobQueue, JobReceiver, LocalJobQueue};
pub use push::HttpPushTransport;
