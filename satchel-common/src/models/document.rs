//! Document records, analysis results and their child records
//!
//! A document moves through `pending → processing → {completed | error}`.
//! Terminal states are never left and nothing returns to `pending`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Processing status of an uploaded document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Created at intake, job enqueued
    Pending,
    /// Worker picked up the job
    Processing,
    /// Analysis persisted
    Completed,
    /// Analysis failed; message recorded
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Error)
    }

    /// States a transition into `self` may start from
    pub fn allowed_predecessors(&self) -> &'static [DocumentStatus] {
        match self {
            DocumentStatus::Pending => &[],
            DocumentStatus::Processing => &[DocumentStatus::Pending],
            DocumentStatus::Completed | DocumentStatus::Error => &[DocumentStatus::Processing],
        }
    }

    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        next.allowed_predecessors().contains(self)
    }
}

impl FromStr for DocumentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "completed" => Ok(DocumentStatus::Completed),
            "error" => Ok(DocumentStatus::Error),
            other => Err(Error::Internal(format!("Unknown document status: {}", other))),
        }
    }
}

/// Classifier category for a whole document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Event,
    Task,
    Info,
    Ignore,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Event => "EVENT",
            Category::Task => "TASK",
            Category::Info => "INFO",
            Category::Ignore => "IGNORE",
        }
    }
}

/// Stored document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    /// Uploading identity
    pub identity: String,
    pub family_id: Uuid,
    pub status: DocumentStatus,
    /// SHA-256 of the uploaded bytes, hex
    pub content_hash: String,
    pub blob_path: String,
    pub original_filename: String,
    pub mime_type: String,
    pub summary: String,
    pub category: String,
    pub archive_filename: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a `pending` document
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Uuid,
    pub identity: String,
    pub family_id: Uuid,
    pub content_hash: String,
    pub blob_path: String,
    pub original_filename: String,
    pub mime_type: String,
}

fn default_confidence() -> String {
    "HIGH".to_string()
}

fn default_assignee() -> String {
    "PARENT".to_string()
}

/// Calendar event extracted by the classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventData {
    pub summary: String,
    /// ISO 8601 date (`2025-10-25`) or date-time (`2025-10-25T08:30:00`)
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_confidence")]
    pub confidence: String,
}

/// Task extracted by the classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskData {
    pub title: String,
    /// `YYYY-MM-DD`
    pub due_date: String,
    #[serde(default = "default_assignee")]
    pub assignee: String,
    #[serde(default)]
    pub note: String,
}

/// Classifier output for one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub summary: String,
    pub category: Category,
    #[serde(default)]
    pub related_profile_ids: Vec<String>,
    #[serde(default)]
    pub events: Vec<EventData>,
    #[serde(default)]
    pub tasks: Vec<TaskData>,
    #[serde(default)]
    pub archive_filename: String,
}

/// Persisted event (child of a document)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub document_id: Uuid,
    pub family_id: Uuid,
    #[serde(flatten)]
    pub data: EventData,
}

/// Persisted task (child of a document)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub document_id: Uuid,
    pub family_id: Uuid,
    #[serde(flatten)]
    pub data: TaskData,
    pub completed: bool,
}

/// Analysis job handed from intake to the worker through the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub identity: String,
    pub family_id: Uuid,
    pub document_id: Uuid,
    pub blob_path: String,
    pub mime_type: String,
}

impl From<&DocumentRecord> for AnalysisJob {
    fn from(doc: &DocumentRecord) -> Self {
        Self {
            identity: doc.identity.clone(),
            family_id: doc.family_id,
            document_id: doc.id,
            blob_path: doc.blob_path.clone(),
            mime_type: doc.mime_type.clone(),
        }
    }
}

/// File extension for a stored blob of the given mime type
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "application/pdf" => ".pdf",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/webp" => ".webp",
        "image/heic" => ".heic",
        _ => "",
    }
}
