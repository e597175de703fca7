//! Document, event and task persistence
//!
//! Status writes are conditional on the current status, so an out-of-order
//! or duplicated worker delivery can never move a document backwards.

use async_trait::async_trait;
use chrono::NaiveDate;
use satchel_common::models::{
    DocumentAnalysis, DocumentRecord, DocumentStatus, EventData, EventRecord, NewDocument,
    TaskData, TaskRecord,
};
use satchel_common::ports::{DocumentRepository, InsertOutcome};
use satchel_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

const DOCUMENT_COLUMNS: &str = "id, identity, family_id, status, content_hash, blob_path, \
     original_filename, mime_type, summary, category, archive_filename, error_message, \
     created_at, updated_at";

/// SQLite-backed document repository
#[derive(Clone)]
pub struct SqliteDocumentRepository {
    pool: SqlitePool,
}

impl SqliteDocumentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn get_by_id(&self, document_id: Uuid) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS))
            .bind(document_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_document).transpose()
    }
}

fn row_to_document(row: &SqliteRow) -> Result<DocumentRecord> {
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(DocumentRecord {
        id: parse_uuid(row.get("id"))?,
        identity: row.get("identity"),
        family_id: parse_uuid(row.get("family_id"))?,
        status: status.parse()?,
        content_hash: row.get("content_hash"),
        blob_path: row.get("blob_path"),
        original_filename: row.get("original_filename"),
        mime_type: row.get("mime_type"),
        summary: row.get("summary"),
        category: row.get("category"),
        archive_filename: row.get("archive_filename"),
        error_message: row.get("error_message"),
        created_at: time::from_db(&created_at)?,
        updated_at: time::from_db(&updated_at)?,
    })
}

fn row_to_event(row: &SqliteRow) -> Result<EventRecord> {
    Ok(EventRecord {
        id: parse_uuid(row.get("id"))?,
        document_id: parse_uuid(row.get("document_id"))?,
        family_id: parse_uuid(row.get("family_id"))?,
        data: EventData {
            summary: row.get("summary"),
            start: row.get("start_at"),
            end: row.get("end_at"),
            location: row.get("location"),
            description: row.get("description"),
            confidence: row.get("confidence"),
        },
    })
}

fn row_to_task(row: &SqliteRow) -> Result<TaskRecord> {
    let completed: i64 = row.get("completed");
    Ok(TaskRecord {
        id: parse_uuid(row.get("id"))?,
        document_id: parse_uuid(row.get("document_id"))?,
        family_id: parse_uuid(row.get("family_id"))?,
        data: TaskData {
            title: row.get("title"),
            due_date: row.get("due_date"),
            assignee: row.get("assignee"),
            note: row.get("note"),
        },
        completed: completed != 0,
    })
}

#[async_trait]
impl DocumentRepository for SqliteDocumentRepository {
    async fn insert_pending(&self, doc: &NewDocument) -> Result<InsertOutcome> {
        let now = time::to_db(time::now());

        let result = sqlx::query(
            r#"
            INSERT INTO documents (id, identity, family_id, status, content_hash, blob_path,
                original_filename, mime_type, created_at, updated_at)
            VALUES (?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?)
            ON CONFLICT(family_id, content_hash) DO NOTHING
            "#,
        )
        .bind(doc.id.to_string())
        .bind(&doc.identity)
        .bind(doc.family_id.to_string())
        .bind(&doc.content_hash)
        .bind(&doc.blob_path)
        .bind(&doc.original_filename)
        .bind(&doc.mime_type)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            let record = self
                .get_by_id(doc.id)
                .await?
                .ok_or_else(|| Error::Internal(format!("Document {} vanished after insert", doc.id)))?;
            return Ok(InsertOutcome::Created(record));
        }

        let existing = self
            .find_by_content_hash(doc.family_id, &doc.content_hash)
            .await?
            .ok_or_else(|| {
                Error::Internal(format!(
                    "Insert of document {} conflicted but no existing record found",
                    doc.id
                ))
            })?;
        Ok(InsertOutcome::Existing(existing))
    }

    async fn get(&self, family_id: Uuid, document_id: Uuid) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ? AND family_id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(document_id.to_string())
        .bind(family_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn find_by_content_hash(
        &self,
        family_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE family_id = ? AND content_hash = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(family_id.to_string())
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn list(&self, family_id: Uuid) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE family_id = ? ORDER BY created_at DESC, rowid DESC",
            DOCUMENT_COLUMNS
        ))
        .bind(family_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }

    async fn list_by_status(&self, status: DocumentStatus) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE status = ? ORDER BY created_at ASC, rowid ASC",
            DOCUMENT_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }

    async fn transition(
        &self,
        document_id: Uuid,
        next: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let allowed = next.allowed_predecessors();
        if allowed.is_empty() {
            return Ok(false);
        }

        let placeholders = vec!["?"; allowed.len()].join(", ");
        let sql = format!(
            "UPDATE documents SET status = ?, error_message = ?, updated_at = ? \
             WHERE id = ? AND status IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(next.as_str())
            .bind(error_message)
            .bind(time::to_db(time::now()))
            .bind(document_id.to_string());
        for status in allowed {
            query = query.bind(status.as_str());
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn save_analysis(&self, document_id: Uuid, analysis: &DocumentAnalysis) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let family_id: Option<String> = sqlx::query_scalar(
            "SELECT family_id FROM documents WHERE id = ? AND status = 'processing'",
        )
        .bind(document_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(family_id) = family_id else {
            tx.rollback().await?;
            return Ok(false);
        };

        // A resumed job replaces whatever a previous attempt left behind
        sqlx::query("DELETE FROM events WHERE document_id = ?")
            .bind(document_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE document_id = ?")
            .bind(document_id.to_string())
            .execute(&mut *tx)
            .await?;

        for event in &analysis.events {
            sqlx::query(
                r#"
                INSERT INTO events (id, document_id, family_id, summary, start_at, end_at,
                    location, description, confidence)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(document_id.to_string())
            .bind(&family_id)
            .bind(&event.summary)
            .bind(&event.start)
            .bind(&event.end)
            .bind(&event.location)
            .bind(&event.description)
            .bind(&event.confidence)
            .execute(&mut *tx)
            .await?;
        }

        for task in &analysis.tasks {
            sqlx::query(
                r#"
                INSERT INTO tasks (id, document_id, family_id, title, due_date, assignee, note,
                    completed)
                VALUES (?, ?, ?, ?, ?, ?, ?, 0)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(document_id.to_string())
            .bind(&family_id)
            .bind(&task.title)
            .bind(&task.due_date)
            .bind(&task.assignee)
            .bind(&task.note)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE documents
            SET status = 'completed', summary = ?, category = ?, archive_filename = ?,
                error_message = NULL, updated_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(&analysis.summary)
        .bind(analysis.category.as_str())
        .bind(&analysis.archive_filename)
        .bind(time::to_db(time::now()))
        .bind(document_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn delete(&self, family_id: Uuid, document_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM events WHERE document_id = ? AND family_id = ?")
            .bind(document_id.to_string())
            .bind(family_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE document_id = ? AND family_id = ?")
            .bind(document_id.to_string())
            .bind(family_id.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM documents WHERE id = ? AND family_id = ?")
            .bind(document_id.to_string())
            .bind(family_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_events(
        &self,
        family_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<EventRecord>> {
        let mut sql = String::from(
            "SELECT id, document_id, family_id, summary, start_at, end_at, location, \
             description, confidence FROM events WHERE family_id = ?",
        );
        if from.is_some() {
            sql.push_str(" AND start_at >= ?");
        }
        if to.is_some() {
            // Date-only and date-time starts both compare below the end of the day
            sql.push_str(" AND start_at <= ?");
        }
        sql.push_str(" ORDER BY start_at");

        let mut query = sqlx::query(&sql).bind(family_id.to_string());
        if let Some(from) = from {
            query = query.bind(from.format("%Y-%m-%d").to_string());
        }
        if let Some(to) = to {
            query = query.bind(format!("{}T23:59:59", to.format("%Y-%m-%d")));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_event).collect()
    }

    async fn list_tasks(&self, family_id: Uuid, completed: Option<bool>) -> Result<Vec<TaskRecord>> {
        let mut sql = String::from(
            "SELECT id, document_id, family_id, title, due_date, assignee, note, completed \
             FROM tasks WHERE family_id = ?",
        );
        if completed.is_some() {
            sql.push_str(" AND completed = ?");
        }
        sql.push_str(" ORDER BY due_date, rowid");

        let mut query = sqlx::query(&sql).bind(family_id.to_string());
        if let Some(completed) = completed {
            query = query.bind(completed as i64);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn set_task_completed(
        &self,
        family_id: Uuid,
        task_id: Uuid,
        completed: bool,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE tasks SET completed = ? WHERE id = ? AND family_id = ?")
            .bind(completed as i64)
            .bind(task_id.to_string())
            .bind(family_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_common::db::init_memory_database;
    use satchel_common::models::Category;

    fn new_doc(family_id: Uuid, hash: &str) -> NewDocument {
        let id = Uuid::new_v4();
        NewDocument {
            id,
            identity: "user-1".to_string(),
            family_id,
            content_hash: hash.to_string(),
            blob_path: format!("uploads/{}/{}.pdf", family_id, id),
            original_filename: "notice.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
        }
    }

    fn analysis() -> DocumentAnalysis {
        DocumentAnalysis {
            summary: "Zoo trip".to_string(),
            category: Category::Event,
            related_profile_ids: vec![],
            events: vec![
                EventData {
                    summary: "Zoo trip".to_string(),
                    start: "2025-10-25T08:30:00".to_string(),
                    end: "2025-10-25T15:00:00".to_string(),
                    location: "City Zoo".to_string(),
                    description: String::new(),
                    confidence: "HIGH".to_string(),
                },
                EventData {
                    summary: "Parents meeting".to_string(),
                    start: "2025-11-02".to_string(),
                    end: "2025-11-02".to_string(),
                    location: String::new(),
                    description: String::new(),
                    confidence: "MEDIUM".to_string(),
                },
            ],
            tasks: vec![TaskData {
                title: "Consent form".to_string(),
                due_date: "2025-10-10".to_string(),
                assignee: "PARENT".to_string(),
                note: String::new(),
            }],
            archive_filename: "20251025_zoo.pdf".to_string(),
        }
    }

    async fn repo() -> SqliteDocumentRepository {
        SqliteDocumentRepository::new(init_memory_database().await.unwrap())
    }

    #[tokio::test]
    async fn test_duplicate_hash_returns_existing() {
        let repo = repo().await;
        let family = Uuid::new_v4();

        let first = repo.insert_pending(&new_doc(family, "h1")).await.unwrap();
        let InsertOutcome::Created(first) = first else {
            panic!("first insert should create");
        };

        let second = repo.insert_pending(&new_doc(family, "h1")).await.unwrap();
        match second {
            InsertOutcome::Existing(existing) => assert_eq!(existing.id, first.id),
            InsertOutcome::Created(_) => panic!("duplicate hash must not create"),
        }
    }

    #[tokio::test]
    async fn test_transitions_are_forward_only() {
        let repo = repo().await;
        let family = Uuid::new_v4();
        let InsertOutcome::Created(doc) = repo.insert_pending(&new_doc(family, "h")).await.unwrap()
        else {
            panic!("expected create");
        };

        // pending cannot jump straight to a terminal state
        assert!(!repo.transition(doc.id, DocumentStatus::Error, Some("x")).await.unwrap());

        assert!(repo.transition(doc.id, DocumentStatus::Processing, None).await.unwrap());
        // processing is not re-entered
        assert!(!repo.transition(doc.id, DocumentStatus::Processing, None).await.unwrap());

        assert!(repo.transition(doc.id, DocumentStatus::Error, Some("classifier down")).await.unwrap());
        assert!(!repo.transition(doc.id, DocumentStatus::Processing, None).await.unwrap());
        assert!(!repo.transition(doc.id, DocumentStatus::Pending, None).await.unwrap());

        let stored = repo.get(family, doc.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Error);
        assert_eq!(stored.error_message.as_deref(), Some("classifier down"));
    }

    #[tokio::test]
    async fn test_save_analysis_requires_processing_and_replaces_children() {
        let repo = repo().await;
        let family = Uuid::new_v4();
        let InsertOutcome::Created(doc) = repo.insert_pending(&new_doc(family, "h")).await.unwrap()
        else {
            panic!("expected create");
        };

        // Still pending: refused
        assert!(!repo.save_analysis(doc.id, &analysis()).await.unwrap());

        repo.transition(doc.id, DocumentStatus::Processing, None).await.unwrap();
        assert!(repo.save_analysis(doc.id, &analysis()).await.unwrap());

        let stored = repo.get(family, doc.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Completed);
        assert_eq!(stored.category, "EVENT");
        assert_eq!(repo.list_events(family, None, None).await.unwrap().len(), 2);
        assert_eq!(repo.list_tasks(family, None).await.unwrap().len(), 1);

        // Completed: a second save is refused and writes nothing
        assert!(!repo.save_analysis(doc.id, &analysis()).await.unwrap());
        assert_eq!(repo.list_events(family, None, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_event_date_filter_is_inclusive_by_day() {
        let repo = repo().await;
        let family = Uuid::new_v4();
        let InsertOutcome::Created(doc) = repo.insert_pending(&new_doc(family, "h")).await.unwrap()
        else {
            panic!("expected create");
        };
        repo.transition(doc.id, DocumentStatus::Processing, None).await.unwrap();
        repo.save_analysis(doc.id, &analysis()).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2025, 10, 25).unwrap();
        let events = repo.list_events(family, Some(day), Some(day)).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.summary, "Zoo trip");

        let nov = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap();
        let events = repo.list_events(family, Some(nov), None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.summary, "Parents meeting");
    }

    #[tokio::test]
    async fn test_task_toggle_scoped_to_family() {
        let repo = repo().await;
        let family = Uuid::new_v4();
        let InsertOutcome::Created(doc) = repo.insert_pending(&new_doc(family, "h")).await.unwrap()
        else {
            panic!("expected create");
        };
        repo.transition(doc.id, DocumentStatus::Processing, None).await.unwrap();
        repo.save_analysis(doc.id, &analysis()).await.unwrap();

        let task = repo.list_tasks(family, Some(false)).await.unwrap().remove(0);

        assert!(!repo.set_task_completed(Uuid::new_v4(), task.id, true).await.unwrap());
        assert!(repo.set_task_completed(family, task.id, true).await.unwrap());
        assert!(repo.list_tasks(family, Some(false)).await.unwrap().is_empty());
        assert_eq!(repo.list_tasks(family, Some(true)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_children() {
        let repo = repo().await;
        let family = Uuid::new_v4();
        let InsertOutcome::Created(doc) = repo.insert_pending(&new_doc(family, "h")).await.unwrap()
        else {
            panic!("expected create");
        };
        repo.transition(doc.id, DocumentStatus::Processing, None).await.unwrap();
        repo.save_analysis(doc.id, &analysis()).await.unwrap();

        assert!(!repo.delete(Uuid::new_v4(), doc.id).await.unwrap());
        assert!(repo.delete(family, doc.id).await.unwrap());
        assert!(repo.get(family, doc.id).await.unwrap().is_none());
        assert!(repo.list_events(family, None, None).await.unwrap().is_empty());
        assert!(repo.list_tasks(family, None).await.unwrap().is_empty());
    }
}
