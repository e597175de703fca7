//! Family, membership, invitation and profile persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use satchel_common::models::{
    Family, Invitation, InvitationStatus, Member, Plan, Profile, Role,
};
use satchel_common::ports::FamilyRepository;
use satchel_common::{time, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

/// SQLite-backed family repository
#[derive(Clone)]
pub struct SqliteFamilyRepository {
    pool: SqlitePool,
}

impl SqliteFamilyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_family(row: &SqliteRow) -> Result<Family> {
    let plan: String = row.get("plan");
    let last_reset_at: Option<String> = row.get("last_reset_at");
    let created_at: String = row.get("created_at");

    Ok(Family {
        id: parse_uuid(row.get("id"))?,
        owner_identity: row.get("owner_identity"),
        name: row.get("name"),
        plan: plan.parse::<Plan>()?,
        documents_this_month: row.get("documents_this_month"),
        last_reset_at: last_reset_at.as_deref().map(time::from_db).transpose()?,
        created_at: time::from_db(&created_at)?,
    })
}

fn row_to_member(row: &SqliteRow) -> Result<Member> {
    let role: String = row.get("role");
    let joined_at: String = row.get("joined_at");

    Ok(Member {
        family_id: parse_uuid(row.get("family_id"))?,
        identity: row.get("identity"),
        role: role.parse::<Role>()?,
        display_name: row.get("display_name"),
        email: row.get("email"),
        joined_at: time::from_db(&joined_at)?,
    })
}

fn row_to_invitation(row: &SqliteRow) -> Result<Invitation> {
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let expires_at: String = row.get("expires_at");

    Ok(Invitation {
        id: parse_uuid(row.get("id"))?,
        family_id: parse_uuid(row.get("family_id"))?,
        email: row.get("email"),
        token: row.get("token"),
        status: status.parse::<InvitationStatus>()?,
        invited_by: row.get("invited_by"),
        created_at: time::from_db(&created_at)?,
        expires_at: time::from_db(&expires_at)?,
    })
}

fn row_to_profile(row: &SqliteRow) -> Result<Profile> {
    Ok(Profile {
        id: parse_uuid(row.get("id"))?,
        name: row.get("name"),
        grade: row.get("grade"),
        keywords: row.get("keywords"),
    })
}

#[async_trait]
impl FamilyRepository for SqliteFamilyRepository {
    async fn create_with_owner(
        &self,
        owner_identity: &str,
        name: &str,
        display_name: &str,
        email: &str,
    ) -> Result<Family> {
        let family = Family {
            id: Uuid::new_v4(),
            owner_identity: owner_identity.to_string(),
            name: name.to_string(),
            plan: Plan::Free,
            documents_this_month: 0,
            last_reset_at: None,
            created_at: time::now(),
        };
        let created_at = time::to_db(family.created_at);

        // Family and owner membership land together or not at all
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO families (id, owner_identity, name, plan, documents_this_month,
                last_reset_at, created_at)
            VALUES (?, ?, ?, ?, 0, NULL, ?)
            "#,
        )
        .bind(family.id.to_string())
        .bind(owner_identity)
        .bind(name)
        .bind(family.plan.as_str())
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO family_members (family_id, identity, role, display_name, email, joined_at)
            VALUES (?, ?, 'owner', ?, ?, ?)
            "#,
        )
        .bind(family.id.to_string())
        .bind(owner_identity)
        .bind(display_name)
        .bind(email)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(family)
    }

    async fn get(&self, family_id: Uuid) -> Result<Option<Family>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_identity, name, plan, documents_this_month, last_reset_at, created_at
            FROM families
            WHERE id = ?
            "#,
        )
        .bind(family_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_family).transpose()
    }

    async fn rename(&self, family_id: Uuid, name: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE families SET name = ? WHERE id = ?")
            .bind(name)
            .bind(family_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_reset(
        &self,
        family_id: Uuid,
        reset_counter: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let sql = if reset_counter {
            "UPDATE families SET documents_this_month = 0, last_reset_at = ? WHERE id = ?"
        } else {
            "UPDATE families SET last_reset_at = ? WHERE id = ?"
        };

        sqlx::query(sql)
            .bind(time::to_db(at))
            .bind(family_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn increment_usage(&self, family_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE families SET documents_this_month = documents_this_month + 1 WHERE id = ?",
        )
        .bind(family_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_member(&self, family_id: Uuid, identity: &str) -> Result<Option<Member>> {
        let row = sqlx::query(
            r#"
            SELECT family_id, identity, role, display_name, email, joined_at
            FROM family_members
            WHERE family_id = ? AND identity = ?
            "#,
        )
        .bind(family_id.to_string())
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_member).transpose()
    }

    async fn list_members(&self, family_id: Uuid) -> Result<Vec<Member>> {
        let rows = sqlx::query(
            r#"
            SELECT family_id, identity, role, display_name, email, joined_at
            FROM family_members
            WHERE family_id = ?
            ORDER BY joined_at, identity
            "#,
        )
        .bind(family_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_member).collect()
    }

    async fn remove_member(&self, family_id: Uuid, identity: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "DELETE FROM family_members WHERE family_id = ? AND identity = ? AND role = 'member'",
        )
        .bind(family_id.to_string())
        .bind(identity)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        // Next contact auto-provisions a fresh family for the removed identity
        sqlx::query("UPDATE users SET family_id = NULL WHERE identity = ? AND family_id = ?")
            .bind(identity)
            .bind(family_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn create_invitation(&self, invitation: &Invitation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO invitations (id, family_id, email, token, status, invited_by,
                created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(invitation.id.to_string())
        .bind(invitation.family_id.to_string())
        .bind(&invitation.email)
        .bind(&invitation.token)
        .bind(invitation.status.as_str())
        .bind(&invitation.invited_by)
        .bind(time::to_db(invitation.created_at))
        .bind(time::to_db(invitation.expires_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_invitation_by_token(&self, token: &str) -> Result<Option<Invitation>> {
        let row = sqlx::query(
            r#"
            SELECT id, family_id, email, token, status, invited_by, created_at, expires_at
            FROM invitations
            WHERE token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_invitation).transpose()
    }

    async fn close_invitation(
        &self,
        invitation_id: Uuid,
        status: InvitationStatus,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE invitations SET status = ? WHERE id = ? AND status = 'pending'")
                .bind(status.as_str())
                .bind(invitation_id.to_string())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn redeem_invitation(&self, invitation_id: Uuid, member: &Member) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let accepted = sqlx::query(
            "UPDATE invitations SET status = 'accepted' WHERE id = ? AND status = 'pending'",
        )
        .bind(invitation_id.to_string())
        .execute(&mut *tx)
        .await?;

        if accepted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        // An existing membership (and its role) is left untouched
        sqlx::query(
            r#"
            INSERT INTO family_members (family_id, identity, role, display_name, email, joined_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(family_id, identity) DO NOTHING
            "#,
        )
        .bind(member.family_id.to_string())
        .bind(&member.identity)
        .bind(member.role.as_str())
        .bind(&member.display_name)
        .bind(&member.email)
        .bind(time::to_db(member.joined_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO users (identity, email, display_name, family_id, activated, created_at)
            VALUES (?, ?, ?, ?, 1, ?)
            ON CONFLICT(identity) DO UPDATE SET
                family_id = excluded.family_id,
                activated = 1
            "#,
        )
        .bind(&member.identity)
        .bind(&member.email)
        .bind(&member.display_name)
        .bind(member.family_id.to_string())
        .bind(time::to_db(member.joined_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_profiles(&self, family_id: Uuid) -> Result<Vec<Profile>> {
        let rows = sqlx::query(
            "SELECT id, name, grade, keywords FROM profiles WHERE family_id = ? ORDER BY created_at, rowid",
        )
        .bind(family_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_profile).collect()
    }

    async fn create_profile(&self, family_id: Uuid, profile: &Profile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, family_id, name, grade, keywords, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(profile.id.to_string())
        .bind(family_id.to_string())
        .bind(&profile.name)
        .bind(&profile.grade)
        .bind(&profile.keywords)
        .bind(time::to_db(time::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_profile(&self, family_id: Uuid, profile: &Profile) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE profiles SET name = ?, grade = ?, keywords = ? WHERE id = ? AND family_id = ?",
        )
        .bind(&profile.name)
        .bind(&profile.grade)
        .bind(&profile.keywords)
        .bind(profile.id.to_string())
        .bind(family_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_profile(&self, family_id: Uuid, profile_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = ? AND family_id = ?")
            .bind(profile_id.to_string())
            .bind(family_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
