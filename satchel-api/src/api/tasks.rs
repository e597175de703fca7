//! Tasks across all documents of the family

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Json, Router,
};
use satchel_common::models::TaskRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parse_path_id;
use crate::auth::FamilyContext;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TaskUpdate {
    pub completed: bool,
}

#[derive(Debug, Serialize)]
pub struct TaskUpdateResponse {
    pub id: Uuid,
    pub completed: bool,
}

/// GET /tasks?completed=true|false
pub async fn list_tasks(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
    Query(query): Query<TaskQuery>,
) -> ApiResult<Json<Vec<TaskRecord>>> {
    let tasks = state.documents.list_tasks(ctx.family_id, query.completed).await?;
    Ok(Json(tasks))
}

/// PATCH /tasks/:id
///
/// Toggles the completion flag; document status is not affected.
pub async fn update_task(
    FamilyContext(ctx): FamilyContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<TaskUpdate>,
) -> ApiResult<Json<TaskUpdateResponse>> {
    let id = parse_path_id(&id, "task")?;

    if !state
        .documents
        .set_task_completed(ctx.family_id, id, update.completed)
        .await?
    {
        return Err(ApiError::not_found(format!("task {}", id)));
    }

    Ok(Json(TaskUpdateResponse {
        id,
        completed: update.completed,
    }))
}

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks))
        .route("/tasks/:id", patch(update_task))
}
