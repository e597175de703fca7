//! Families, membership, invitations and profiles
//!
//! Owner-only operations take a `RequestContext` that has already passed
//! `require_owner`; the registry re-checks the role so a member context can
//! never reach them by accident.

use chrono::Duration;
use satchel_common::config::ServiceConfig;
use satchel_common::models::{
    Family, Invitation, InvitationStatus, Member, Profile, Role, DEFAULT_FAMILY_NAME,
};
use satchel_common::ports::{FamilyRepository, UserRepository, VerifiedIdentity};
use satchel_common::{time, tokens, Error, Result, ValidationError};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::context_resolver::{require_owner, RequestContext};
use super::usage::ensure_monthly_reset;

/// Issued invitation and its redemption link
#[derive(Debug, Clone)]
pub struct IssuedInvitation {
    pub invitation: Invitation,
    pub invite_url: String,
}

/// Result of a successful join
#[derive(Debug, Clone)]
pub struct JoinedFamily {
    pub family: Family,
    pub role: Role,
}

/// Profile fields supplied by a client
#[derive(Debug, Clone)]
pub struct ProfileInput {
    pub name: String,
    pub grade: String,
    pub keywords: String,
}

pub struct TenantRegistry {
    families: Arc<dyn FamilyRepository>,
    users: Arc<dyn UserRepository>,
    config: Arc<ServiceConfig>,
}

impl TenantRegistry {
    pub fn new(
        families: Arc<dyn FamilyRepository>,
        users: Arc<dyn UserRepository>,
        config: Arc<ServiceConfig>,
    ) -> Self {
        Self {
            families,
            users,
            config,
        }
    }

    /// Create a single-member family owned by `identity` and link it
    ///
    /// Family and owner membership are written atomically by the repository.
    pub async fn provision_family(&self, verified: &VerifiedIdentity) -> Result<Family> {
        let family = self
            .families
            .create_with_owner(
                &verified.identity,
                DEFAULT_FAMILY_NAME,
                &verified.display_name,
                &verified.email,
            )
            .await?;

        self.users
            .link_family(&verified.identity, Some(family.id))
            .await?;

        info!(family_id = %family.id, identity = %verified.identity, "Provisioned family");
        Ok(family)
    }

    /// Family with the lazy monthly reset applied
    pub async fn current_family(&self, family_id: Uuid) -> Result<Family> {
        let family = self
            .families
            .get(family_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("family {}", family_id)))?;

        ensure_monthly_reset(self.families.as_ref(), family, time::now()).await
    }

    pub async fn rename(&self, ctx: &RequestContext, name: &str) -> Result<Family> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingFields("name".to_string()).into());
        }

        if !self.families.rename(ctx.family_id, name).await? {
            return Err(Error::NotFound(format!("family {}", ctx.family_id)));
        }

        self.current_family(ctx.family_id).await
    }

    pub async fn list_members(&self, ctx: &RequestContext) -> Result<Vec<Member>> {
        self.families.list_members(ctx.family_id).await
    }

    /// Issue a single-use invitation into the caller's family
    pub async fn invite(&self, ctx: &RequestContext, email: &str) -> Result<IssuedInvitation> {
        require_owner(ctx)?;

        let email = email.trim();
        if email.is_empty() {
            return Err(ValidationError::MissingFields("email".to_string()).into());
        }

        let now = time::now();
        let invitation = Invitation {
            id: Uuid::new_v4(),
            family_id: ctx.family_id,
            email: email.to_string(),
            token: tokens::generate_token(),
            status: InvitationStatus::Pending,
            invited_by: ctx.identity.clone(),
            created_at: now,
            expires_at: now + Duration::days(self.config.invitations.expiry_days),
        };

        self.families.create_invitation(&invitation).await?;
        info!(family_id = %ctx.family_id, invitation_id = %invitation.id, "Invitation issued");

        let invite_url = self.config.invite_url(&invitation.token);
        Ok(IssuedInvitation {
            invitation,
            invite_url,
        })
    }

    /// Redeem an invitation token
    ///
    /// The invitation flips `pending → accepted` exactly once; the member
    /// insert, family link and activation happen in the same write.
    pub async fn join(&self, verified: &VerifiedIdentity, token: &str) -> Result<JoinedFamily> {
        let invitation = self
            .families
            .get_invitation_by_token(token)
            .await?
            .ok_or_else(|| Error::NotFound("invitation".to_string()))?;

        if invitation.status != InvitationStatus::Pending {
            return Err(Error::InvitationUnavailable(format!(
                "invitation is {}",
                invitation.status.as_str()
            )));
        }

        let now = time::now();
        if invitation.is_expired(now) {
            self.families
                .close_invitation(invitation.id, InvitationStatus::Expired)
                .await?;
            return Err(Error::InvitationUnavailable("invitation expired".to_string()));
        }

        // Only a verified email can claim an invitation
        if !verified.email_verified || !invitation.email_matches(&verified.email) {
            warn!(
                invitation_id = %invitation.id,
                identity = %verified.identity,
                "Invitation redeemed with mismatched email"
            );
            return Err(Error::EmailMismatch);
        }

        let display_name = [&verified.display_name, &verified.email, &verified.identity]
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .cloned()
            .unwrap_or_default();

        let member = Member {
            family_id: invitation.family_id,
            identity: verified.identity.clone(),
            role: Role::Member,
            display_name,
            email: verified.email.clone(),
            joined_at: now,
        };

        if !self.families.redeem_invitation(invitation.id, &member).await? {
            return Err(Error::InvitationUnavailable("invitation already used".to_string()));
        }

        let family = self.current_family(invitation.family_id).await?;
        let role = self
            .families
            .get_member(family.id, &verified.identity)
            .await?
            .map(|m| m.role)
            .unwrap_or(Role::Member);

        info!(family_id = %family.id, identity = %verified.identity, "Joined family");
        Ok(JoinedFamily { family, role })
    }

    /// Remove a member (owner only); the owner cannot be removed
    pub async fn remove_member(&self, ctx: &RequestContext, identity: &str) -> Result<()> {
        require_owner(ctx)?;

        let member = self
            .families
            .get_member(ctx.family_id, identity)
            .await?
            .ok_or_else(|| Error::NotFound(format!("member {}", identity)))?;

        if member.role == Role::Owner {
            return Err(Error::Forbidden("the owner cannot be removed".to_string()));
        }

        if !self.families.remove_member(ctx.family_id, identity).await? {
            return Err(Error::NotFound(format!("member {}", identity)));
        }

        info!(family_id = %ctx.family_id, removed = %identity, "Member removed");
        Ok(())
    }

    pub async fn list_profiles(&self, family_id: Uuid) -> Result<Vec<Profile>> {
        self.families.list_profiles(family_id).await
    }

    pub async fn create_profile(&self, ctx: &RequestContext, input: ProfileInput) -> Result<Profile> {
        let profile = Profile {
            id: Uuid::new_v4(),
            name: validated_name(&input.name)?,
            grade: input.grade,
            keywords: input.keywords,
        };

        self.families.create_profile(ctx.family_id, &profile).await?;
        Ok(profile)
    }

    pub async fn update_profile(
        &self,
        ctx: &RequestContext,
        profile_id: Uuid,
        input: ProfileInput,
    ) -> Result<Profile> {
        let profile = Profile {
            id: profile_id,
            name: validated_name(&input.name)?,
            grade: input.grade,
            keywords: input.keywords,
        };

        if !self.families.update_profile(ctx.family_id, &profile).await? {
            return Err(Error::NotFound(format!("profile {}", profile_id)));
        }
        Ok(profile)
    }

    pub async fn delete_profile(&self, ctx: &RequestContext, profile_id: Uuid) -> Result<()> {
        if !self.families.delete_profile(ctx.family_id, profile_id).await? {
            return Err(Error::NotFound(format!("profile {}", profile_id)));
        }
        Ok(())
    }
}

fn validated_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingFields("name".to_string()).into());
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_common::db::init_memory_database;
    use satchel_common::models::UserRecord;

    use crate::db::{SqliteFamilyRepository, SqliteUserRepository};

    struct Fixture {
        registry: TenantRegistry,
        families: Arc<SqliteFamilyRepository>,
        users: Arc<SqliteUserRepository>,
    }

    async fn fixture() -> Fixture {
        let pool = init_memory_database().await.unwrap();
        let families = Arc::new(SqliteFamilyRepository::new(pool.clone()));
        let users = Arc::new(SqliteUserRepository::new(pool));
        let registry = TenantRegistry::new(
            families.clone(),
            users.clone(),
            Arc::new(ServiceConfig::default()),
        );
        Fixture {
            registry,
            families,
            users,
        }
    }

    fn verified(identity: &str, email: &str) -> VerifiedIdentity {
        VerifiedIdentity {
            identity: identity.to_string(),
            email: email.to_string(),
            email_verified: true,
            display_name: String::new(),
        }
    }

    async fn owner_context(f: &Fixture) -> RequestContext {
        let owner = verified("owner", "owner@example.com");
        f.users
            .create_if_absent(&UserRecord {
                identity: "owner".to_string(),
                email: owner.email.clone(),
                display_name: String::new(),
                family_id: None,
                activated: true,
                notify_email: true,
                notify_web_push: false,
                ical_token: None,
                created_at: time::now(),
            })
            .await
            .unwrap();
        let family = f.registry.provision_family(&owner).await.unwrap();
        RequestContext {
            identity: "owner".to_string(),
            email: owner.email,
            display_name: String::new(),
            family_id: family.id,
            role: Role::Owner,
        }
    }

    #[tokio::test]
    async fn test_invitation_redeemed_once() {
        let f = fixture().await;
        let ctx = owner_context(&f).await;

        let issued = f.registry.invite(&ctx, "Guest@Example.com").await.unwrap();
        assert!(issued.invite_url.ends_with(&issued.invitation.token));

        let guest = verified("guest", "guest@example.com");
        let joined = f.registry.join(&guest, &issued.invitation.token).await.unwrap();
        assert_eq!(joined.family.id, ctx.family_id);
        assert_eq!(joined.role, Role::Member);

        let user = f.users.get("guest").await.unwrap().unwrap();
        assert!(user.activated);
        assert_eq!(user.family_id, Some(ctx.family_id));

        // Display name falls back to the email
        let member = f.families.get_member(ctx.family_id, "guest").await.unwrap().unwrap();
        assert_eq!(member.display_name, "guest@example.com");

        let err = f.registry.join(&guest, &issued.invitation.token).await.unwrap_err();
        assert!(matches!(err, Error::InvitationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_join_rejects_mismatched_email_and_unknown_token() {
        let f = fixture().await;
        let ctx = owner_context(&f).await;
        let issued = f.registry.invite(&ctx, "guest@example.com").await.unwrap();

        let intruder = verified("intruder", "intruder@example.com");
        let err = f.registry.join(&intruder, &issued.invitation.token).await.unwrap_err();
        assert!(matches!(err, Error::EmailMismatch));

        // Still redeemable by the right person
        let guest = verified("guest", "guest@example.com");
        assert!(f.registry.join(&guest, &issued.invitation.token).await.is_ok());

        let err = f.registry.join(&guest, "no-such-token").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_expired_invitation_marked_expired() {
        let f = fixture().await;
        let ctx = owner_context(&f).await;
        let now = time::now();
        let invitation = Invitation {
            id: Uuid::new_v4(),
            family_id: ctx.family_id,
            email: "late@example.com".to_string(),
            token: "expired-token".to_string(),
            status: InvitationStatus::Pending,
            invited_by: "owner".to_string(),
            created_at: now - Duration::days(8),
            expires_at: now - Duration::days(1),
        };
        f.families.create_invitation(&invitation).await.unwrap();

        let late = verified("late", "late@example.com");
        let err = f.registry.join(&late, "expired-token").await.unwrap_err();
        assert!(matches!(err, Error::InvitationUnavailable(_)));

        let stored = f
            .families
            .get_invitation_by_token("expired-token")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, InvitationStatus::Expired);
    }

    #[tokio::test]
    async fn test_owner_only_operations() {
        let f = fixture().await;
        let owner = owner_context(&f).await;
        let member = RequestContext {
            identity: "guest".to_string(),
            role: Role::Member,
            ..owner.clone()
        };

        assert!(matches!(
            f.registry.invite(&member, "x@example.com").await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            f.registry.remove_member(&owner, "owner").await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            f.registry.remove_member(&owner, "nobody").await,
            Err(Error::NotFound(_))
        ));
    }
}
