//! Document upload and retrieval
//!
//! POST /documents/upload takes a multipart form with one `file` field and
//! answers 202 as soon as the analysis job is enqueued.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header::CONTENT_LENGTH, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use satchel_common::config::ServiceConfig;
use satchel_common::models::{DocumentRecord, DocumentStatus};
use satchel_common::ValidationError;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use super::parse_path_id;
use crate::auth::FamilyContext;
use crate::error::{ApiError, ApiResult};
use crate::services::UploadRequest;
use crate::AppState;

/// Room for multipart framing on top of the file size limit
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: Uuid,
    pub status: DocumentStatus,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub status: DocumentStatus,
    pub original_filename: String,
    pub mime_type: String,
    pub summary: String,
    pub category: String,
    pub archive_filename: String,
    pub error_message: Option<String>,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DocumentRecord> for DocumentResponse {
    fn from(doc: DocumentRecord) -> Self {
        Self {
            id: doc.id,
            status: doc.status,
            original_filename: doc.original_filename,
            mime_type: doc.mime_type,
            summary: doc.summary,
            category: doc.category,
            archive_filename: doc.archive_filename,
            error_message: doc.error_message,
            uploaded_by: doc.identity,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

fn multipart_error(err: MultipartError, headers: &HeaderMap, limit: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(limit + 1);
        return ValidationError::FileTooLarge { size, limit }.into();
    }
    ValidationError::InvalidUpload(err.body_text()).into()
}

/// POST /documents/upload
pub async fn upload_document(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let limit = state.config.uploads.max_bytes;
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, &headers, limit))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let mime_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, &headers, limit))?;

        upload = Some(UploadRequest {
            bytes: bytes.to_vec(),
            mime_type,
            filename,
        });
        break;
    }

    let upload = upload.ok_or_else(|| ValidationError::MissingFields("file".to_string()))?;
    let outcome = state.intake.upload(&ctx, upload).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            id: outcome.document.id,
            status: outcome.document.status,
        }),
    ))
}

/// GET /documents
///
/// Newest first.
pub async fn list_documents(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<DocumentResponse>>> {
    let documents = state.documents.list(ctx.family_id).await?;
    Ok(Json(documents.into_iter().map(DocumentResponse::from).collect()))
}

/// GET /documents/:id
pub async fn get_document(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DocumentResponse>> {
    let id = parse_path_id(&id, "document")?;
    let document = state
        .documents
        .get(ctx.family_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("document {}", id)))?;

    Ok(Json(document.into()))
}

/// DELETE /documents/:id
///
/// Removes the record, its events and tasks, and the stored file.
pub async fn delete_document(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_path_id(&id, "document")?;
    let document = state
        .documents
        .get(ctx.family_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("document {}", id)))?;

    if !state.documents.delete(ctx.family_id, id).await? {
        return Err(ApiError::not_found(format!("document {}", id)));
    }

    if let Err(e) = state.blobs.delete(&document.blob_path).await {
        warn!(document_id = %id, error = %e, "Failed to delete document blob");
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Build document routes
pub fn document_routes(config: &ServiceConfig) -> Router<AppState> {
    let upload = post(upload_document)
        .layer(DefaultBodyLimit::max(config.uploads.max_bytes + MULTIPART_OVERHEAD));

    Router::new()
        .route("/documents/upload", upload)
        .route("/documents", get(list_documents))
        .route("/documents/:id", get(get_document).delete(delete_document))
}
