//! Upload intake
//!
//! Validates size and shape, dedupes on content hash, applies the lazy reset
//! and quota check, stores the blob, creates the `pending` record, enqueues the
//! analysis job and charges the monthly counter. Upload returns as soon as the
//! job is enqueued.

use satchel_common::config::{ServiceConfig, UploadConfig};
use satchel_common::models::{extension_for_mime, AnalysisJob, DocumentRecord, NewDocument};
use satchel_common::ports::{
    BlobStorage, DocumentRepository, FamilyRepository, InsertOutcome, JobQueue,
};
use satchel_common::{tokens, Error, Result, ValidationError};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::context_resolver::RequestContext;
use super::tenant_registry::TenantRegistry;
use super::usage::check_quota;

pub const PDF_MIME: &str = "application/pdf";
const OCTET_STREAM: &str = "application/octet-stream";

/// One uploaded file
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    /// Client-declared content type, if any
    pub mime_type: Option<String>,
    pub filename: String,
}

/// Intake result
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub document: DocumentRecord,
    /// False when an existing record with the same bytes was returned
    pub created: bool,
}

/// Client mime type, or one sniffed from the content when absent or generic
pub fn resolve_mime_type(declared: Option<&str>, bytes: &[u8]) -> String {
    match declared.map(str::trim) {
        Some(mime) if !mime.is_empty() && mime != OCTET_STREAM => mime.to_string(),
        _ => infer::get(bytes)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| OCTET_STREAM.to_string()),
    }
}

/// Number of pages in a PDF, or `Unparseable` for a broken file
pub fn count_pdf_pages(bytes: &[u8]) -> std::result::Result<usize, ValidationError> {
    let document = lopdf::Document::load_mem(bytes)
        .map_err(|e| ValidationError::Unparseable(e.to_string()))?;
    Ok(document.get_pages().len())
}

/// Size and shape checks, run before hashing
pub fn validate_upload(
    bytes: &[u8],
    mime_type: &str,
    limits: &UploadConfig,
) -> std::result::Result<(), ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::InvalidUpload("empty file".to_string()));
    }

    if bytes.len() > limits.max_bytes {
        return Err(ValidationError::FileTooLarge {
            size: bytes.len(),
            limit: limits.max_bytes,
        });
    }

    if mime_type == PDF_MIME {
        let pages = count_pdf_pages(bytes)?;
        if pages > limits.max_pdf_pages {
            return Err(ValidationError::TooManyPages {
                pages,
                limit: limits.max_pdf_pages,
            });
        }
    }

    Ok(())
}

pub struct UploadIntake {
    documents: Arc<dyn DocumentRepository>,
    families: Arc<dyn FamilyRepository>,
    blobs: Arc<dyn BlobStorage>,
    queue: Arc<dyn JobQueue>,
    tenants: Arc<TenantRegistry>,
    config: Arc<ServiceConfig>,
}

impl UploadIntake {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        families: Arc<dyn FamilyRepository>,
        blobs: Arc<dyn BlobStorage>,
        queue: Arc<dyn JobQueue>,
        tenants: Arc<TenantRegistry>,
        config: Arc<ServiceConfig>,
    ) -> Self {
        Self {
            documents,
            families,
            blobs,
            queue,
            tenants,
            config,
        }
    }

    pub async fn upload(&self, ctx: &RequestContext, request: UploadRequest) -> Result<UploadOutcome> {
        let mime_type = resolve_mime_type(request.mime_type.as_deref(), &request.bytes);
        validate_upload(&request.bytes, &mime_type, &self.config.uploads)?;

        let content_hash = tokens::content_hash(&request.bytes);

        if let Some(existing) = self
            .documents
            .find_by_content_hash(ctx.family_id, &content_hash)
            .await?
        {
            info!(family_id = %ctx.family_id, document_id = %existing.id, "Duplicate upload");
            return Ok(UploadOutcome {
                document: existing,
                created: false,
            });
        }

        let family = self.tenants.current_family(ctx.family_id).await?;
        check_quota(&family, &self.config.quota)?;

        let document_id = Uuid::new_v4();
        let blob_path = format!(
            "uploads/{}/{}{}",
            ctx.family_id,
            document_id,
            extension_for_mime(&mime_type)
        );
        self.blobs.put(&blob_path, &request.bytes, &mime_type).await?;

        let new_doc = NewDocument {
            id: document_id,
            identity: ctx.identity.clone(),
            family_id: ctx.family_id,
            content_hash,
            blob_path: blob_path.clone(),
            original_filename: request.filename,
            mime_type: mime_type.clone(),
        };

        let document = match self.documents.insert_pending(&new_doc).await {
            Ok(InsertOutcome::Created(document)) => document,
            Ok(InsertOutcome::Existing(winner)) => {
                // A concurrent upload of the same bytes won the insert
                self.discard_blob(&blob_path).await;
                info!(family_id = %ctx.family_id, document_id = %winner.id, "Duplicate upload (concurrent)");
                return Ok(UploadOutcome {
                    document: winner,
                    created: false,
                });
            }
            Err(e) => {
                self.discard_blob(&blob_path).await;
                return Err(e);
            }
        };

        let job = AnalysisJob {
            identity: ctx.identity.clone(),
            family_id: ctx.family_id,
            document_id,
            blob_path: blob_path.clone(),
            mime_type,
        };

        if let Err(e) = self.queue.enqueue(&job).await {
            error!(document_id = %document_id, error = %e, "Enqueue failed, removing document");
            if let Err(cleanup) = self.documents.delete(ctx.family_id, document_id).await {
                error!(document_id = %document_id, error = %cleanup, "Failed to remove unqueued document");
            }
            self.discard_blob(&blob_path).await;
            return Err(match e {
                Error::Queue(_) => e,
                other => Error::Queue(other.to_string()),
            });
        }

        self.families.increment_usage(ctx.family_id).await?;

        info!(
            family_id = %ctx.family_id,
            document_id = %document_id,
            size = request.bytes.len(),
            "Document accepted"
        );

        Ok(UploadOutcome {
            document,
            created: true,
        })
    }

    async fn discard_blob(&self, path: &str) {
        if let Err(e) = self.blobs.delete(path).await {
            warn!(path, error = %e, "Failed to delete orphaned blob");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use satchel_common::db::init_memory_database;
    use satchel_common::models::Role;

    use crate::adapters::{FsBlobStorage, LocalJobQueue};
    use crate::db::{SqliteDocumentRepository, SqliteFamilyRepository, SqliteUserRepository};
    use crate::services::test_support::{CountingFamilies, UsageWrite};

    #[test]
    fn test_size_checked_before_parsing() {
        let limits = UploadConfig {
            max_bytes: 8,
            max_pdf_pages: 3,
        };
        // Garbage that would also fail parsing reports the size first
        let err = validate_upload(&[0u8; 9], PDF_MIME, &limits).unwrap_err();
        assert!(matches!(err, ValidationError::FileTooLarge { size: 9, limit: 8 }));
    }

    #[test]
    fn test_corrupt_pdf_is_unparseable() {
        let err = validate_upload(b"%PDF-1.5 not really", PDF_MIME, &UploadConfig::default())
            .unwrap_err();
        assert!(matches!(err, ValidationError::Unparseable(_)));
    }

    #[test]
    fn test_empty_file_rejected() {
        let err = validate_upload(b"", "image/png", &UploadConfig::default()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidUpload(_)));
    }

    #[test]
    fn test_mime_type_sniffed_when_missing() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(resolve_mime_type(None, &png), "image/png");
        assert_eq!(resolve_mime_type(Some("application/octet-stream"), &png), "image/png");
        assert_eq!(resolve_mime_type(Some("image/jpeg"), &png), "image/jpeg");
        assert_eq!(resolve_mime_type(None, b"plain"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_month_rollover_resets_then_charges() {
        let pool = init_memory_database().await.unwrap();
        let blob_dir = tempfile::tempdir().unwrap();
        let families = Arc::new(CountingFamilies::new(SqliteFamilyRepository::new(pool.clone())));
        let config = Arc::new(ServiceConfig::default());
        let tenants = Arc::new(TenantRegistry::new(
            families.clone(),
            Arc::new(SqliteUserRepository::new(pool.clone())),
            config.clone(),
        ));
        let (queue, _jobs) = LocalJobQueue::channel();
        let intake = UploadIntake::new(
            Arc::new(SqliteDocumentRepository::new(pool)),
            families.clone(),
            Arc::new(FsBlobStorage::new(blob_dir.path())),
            Arc::new(queue),
            tenants,
            config.clone(),
        );

        // At the free cap, last reset in an earlier month
        let family = families
            .create_with_owner("alice", "A", "Alice", "alice@example.com")
            .await
            .unwrap();
        let january = chrono::Utc.with_ymd_and_hms(2020, 1, 15, 9, 0, 0).unwrap();
        families.record_reset(family.id, false, january).await.unwrap();
        for _ in 0..config.quota.free_monthly_documents {
            families.increment_usage(family.id).await.unwrap();
        }
        families.clear();

        let ctx = RequestContext {
            identity: "alice".to_string(),
            email: "alice@example.com".to_string(),
            display_name: "Alice".to_string(),
            family_id: family.id,
            role: Role::Owner,
        };
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];
        let outcome = intake
            .upload(
                &ctx,
                UploadRequest {
                    bytes: png.to_vec(),
                    mime_type: Some("image/png".to_string()),
                    filename: "note.png".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(outcome.created);

        // Two separate writes: the reset, then the charge
        assert_eq!(
            families.writes(),
            vec![UsageWrite::Reset { reset_counter: true }, UsageWrite::Increment]
        );
        let stored = families.get(family.id).await.unwrap().unwrap();
        assert_eq!(stored.documents_this_month, 1);
    }
}
