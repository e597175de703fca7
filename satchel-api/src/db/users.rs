//! Identity records and push subscriptions

use async_trait::async_trait;
use satchel_common::models::{PreferenceUpdate, PushSubscription, SubscriptionKeys, UserRecord};
use satchel_common::ports::{SubscriptionRepository, UserRepository};
use satchel_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_optional_uuid;

const USER_COLUMNS: &str = "identity, email, display_name, family_id, activated, notify_email, \
     notify_web_push, ical_token, created_at";

/// SQLite-backed identity repository
#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &SqliteRow) -> Result<UserRecord> {
    let activated: i64 = row.get("activated");
    let notify_email: i64 = row.get("notify_email");
    let notify_web_push: i64 = row.get("notify_web_push");
    let created_at: String = row.get("created_at");

    Ok(UserRecord {
        identity: row.get("identity"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        family_id: parse_optional_uuid(row.get("family_id"))?,
        activated: activated != 0,
        notify_email: notify_email != 0,
        notify_web_push: notify_web_push != 0,
        ical_token: row.get("ical_token"),
        created_at: time::from_db(&created_at)?,
    })
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn get(&self, identity: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE identity = ?", USER_COLUMNS))
            .bind(identity)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn create_if_absent(&self, user: &UserRecord) -> Result<UserRecord> {
        sqlx::query(
            r#"
            INSERT INTO users (identity, email, display_name, family_id, activated, notify_email,
                notify_web_push, ical_token, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(identity) DO NOTHING
            "#,
        )
        .bind(&user.identity)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.family_id.map(|id| id.to_string()))
        .bind(user.activated as i64)
        .bind(user.notify_email as i64)
        .bind(user.notify_web_push as i64)
        .bind(&user.ical_token)
        .bind(time::to_db(user.created_at))
        .execute(&self.pool)
        .await?;

        self.get(&user.identity)
            .await?
            .ok_or_else(|| Error::Internal(format!("User {} missing after insert", user.identity)))
    }

    async fn link_family(&self, identity: &str, family_id: Option<Uuid>) -> Result<()> {
        sqlx::query("UPDATE users SET family_id = ? WHERE identity = ?")
            .bind(family_id.map(|id| id.to_string()))
            .bind(identity)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_activated(&self, identity: &str, activated: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET activated = ? WHERE identity = ?")
            .bind(activated as i64)
            .bind(identity)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_preferences(&self, identity: &str, update: &PreferenceUpdate) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET notify_email = COALESCE(?, notify_email),
                notify_web_push = COALESCE(?, notify_web_push)
            WHERE identity = ?
            "#,
        )
        .bind(update.notification_email.map(|v| v as i64))
        .bind(update.notification_web_push.map(|v| v as i64))
        .bind(identity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn ensure_ical_token(&self, identity: &str, candidate: &str) -> Result<String> {
        sqlx::query("UPDATE users SET ical_token = ? WHERE identity = ? AND ical_token IS NULL")
            .bind(candidate)
            .bind(identity)
            .execute(&self.pool)
            .await?;

        let token: Option<String> =
            sqlx::query_scalar("SELECT ical_token FROM users WHERE identity = ?")
                .bind(identity)
                .fetch_optional(&self.pool)
                .await?
                .flatten();

        token.ok_or_else(|| Error::NotFound(format!("user {}", identity)))
    }

    async fn find_by_ical_token(&self, token: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE ical_token = ?", USER_COLUMNS))
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn list_push_recipients(&self) -> Result<Vec<UserRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users WHERE notify_web_push = 1 AND family_id IS NOT NULL ORDER BY identity",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect()
    }
}

/// SQLite-backed push subscription repository
#[derive(Clone)]
pub struct SqliteSubscriptionRepository {
    pool: SqlitePool,
}

impl SqliteSubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SqliteSubscriptionRepository {
    async fn upsert(&self, subscription: &PushSubscription) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO push_subscriptions (identity, endpoint_key, endpoint, p256dh, auth, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(identity, endpoint_key) DO UPDATE SET
                endpoint = excluded.endpoint,
                p256dh = excluded.p256dh,
                auth = excluded.auth,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&subscription.identity)
        .bind(&subscription.endpoint_key)
        .bind(&subscription.endpoint)
        .bind(&subscription.keys.p256dh)
        .bind(&subscription.keys.auth)
        .bind(time::to_db(time::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, identity: &str, endpoint_key: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM push_subscriptions WHERE identity = ? AND endpoint_key = ?")
                .bind(identity)
                .bind(endpoint_key)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove_all(&self, identity: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE identity = ?")
            .bind(identity)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list(&self, identity: &str) -> Result<Vec<PushSubscription>> {
        let rows = sqlx::query(
            r#"
            SELECT identity, endpoint_key, endpoint, p256dh, auth
            FROM push_subscriptions
            WHERE identity = ?
            ORDER BY endpoint_key
            "#,
        )
        .bind(identity)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| PushSubscription {
                identity: row.get("identity"),
                endpoint_key: row.get("endpoint_key"),
                endpoint: row.get("endpoint"),
                keys: SubscriptionKeys {
                    p256dh: row.get("p256dh"),
                    auth: row.get("auth"),
                },
            })
            .collect())
    }
}
