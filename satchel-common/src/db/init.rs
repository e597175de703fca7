//! Database initialization
//!
//! Creates the database file on first run and applies the schema. Every
//! statement is `IF NOT EXISTS`, so initialization is safe on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (or create) the database file and apply the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets readers proceed while the worker writes analysis results
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    enable_foreign_keys(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the schema applied
///
/// Every connection to `sqlite::memory:` is a separate database, so the pool
/// is capped at one connection.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    enable_foreign_keys(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

async fn enable_foreign_keys(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    Ok(())
}

/// Create all tables and indexes
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_users_table(pool).await?;
    create_push_subscriptions_table(pool).await?;
    create_families_table(pool).await?;
    create_family_members_table(pool).await?;
    create_invitations_table(pool).await?;
    create_profiles_table(pool).await?;
    create_documents_table(pool).await?;
    create_events_table(pool).await?;
    create_tasks_table(pool).await?;
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            identity TEXT PRIMARY KEY,
            email TEXT NOT NULL DEFAULT '',
            display_name TEXT NOT NULL DEFAULT '',
            family_id TEXT,
            activated INTEGER NOT NULL DEFAULT 0,
            notify_email INTEGER NOT NULL DEFAULT 1,
            notify_web_push INTEGER NOT NULL DEFAULT 0,
            ical_token TEXT UNIQUE,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_push_subscriptions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS push_subscriptions (
            identity TEXT NOT NULL,
            endpoint_key TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            p256dh TEXT NOT NULL,
            auth TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (identity, endpoint_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_families_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS families (
            id TEXT PRIMARY KEY,
            owner_identity TEXT NOT NULL,
            name TEXT NOT NULL,
            plan TEXT NOT NULL DEFAULT 'free' CHECK (plan IN ('free', 'premium')),
            documents_this_month INTEGER NOT NULL DEFAULT 0,
            last_reset_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_family_members_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS family_members (
            family_id TEXT NOT NULL REFERENCES families(id) ON DELETE CASCADE,
            identity TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('owner', 'member')),
            display_name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            joined_at TEXT NOT NULL,
            PRIMARY KEY (family_id, identity)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_invitations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS invitations (
            id TEXT PRIMARY KEY,
            family_id TEXT NOT NULL REFERENCES families(id) ON DELETE CASCADE,
            email TEXT NOT NULL,
            token TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'accepted', 'expired')),
            invited_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_profiles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            family_id TEXT NOT NULL REFERENCES families(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            grade TEXT NOT NULL DEFAULT '',
            keywords TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_profiles_family ON profiles(family_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_documents_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            identity TEXT NOT NULL,
            family_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'completed', 'error')),
            content_hash TEXT NOT NULL,
            blob_path TEXT NOT NULL,
            original_filename TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            summary TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL DEFAULT '',
            archive_filename TEXT NOT NULL DEFAULT '',
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (family_id, content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_family_created ON documents(family_id, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            family_id TEXT NOT NULL,
            summary TEXT NOT NULL,
            start_at TEXT NOT NULL,
            end_at TEXT NOT NULL,
            location TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            confidence TEXT NOT NULL DEFAULT 'HIGH'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_family_start ON events(family_id, start_at)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_tasks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            family_id TEXT NOT NULL,
            title TEXT NOT NULL,
            due_date TEXT NOT NULL,
            assignee TEXT NOT NULL DEFAULT 'PARENT',
            note TEXT NOT NULL DEFAULT '',
            completed INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tasks_family_completed ON tasks(family_id, completed)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
