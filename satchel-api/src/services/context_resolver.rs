//! Maps a verified identity to its tenant context
//!
//! First contact creates the identity record (activated only when
//! `auth.auto_activate` is set). An activated identity without a family gets a
//! fresh single-member family it owns.

use satchel_common::config::ServiceConfig;
use satchel_common::models::{Role, UserRecord};
use satchel_common::ports::{FamilyRepository, UserRepository, VerifiedIdentity};
use satchel_common::{time, Error, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::tenant_registry::TenantRegistry;

/// Request-scoped tenant context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub identity: String,
    pub email: String,
    pub display_name: String,
    pub family_id: Uuid,
    pub role: Role,
}

/// Reject contexts whose role is not `owner`
pub fn require_owner(ctx: &RequestContext) -> Result<()> {
    if ctx.role != Role::Owner {
        return Err(Error::Forbidden(format!(
            "{} is not the family owner",
            ctx.identity
        )));
    }
    Ok(())
}

pub struct ContextResolver {
    users: Arc<dyn UserRepository>,
    families: Arc<dyn FamilyRepository>,
    tenants: Arc<TenantRegistry>,
    config: Arc<ServiceConfig>,
    /// Serializes auto-provisioning so concurrent first requests create one family
    provisioning: Mutex<()>,
}

impl ContextResolver {
    pub fn new(
        users: Arc<dyn UserRepository>,
        families: Arc<dyn FamilyRepository>,
        tenants: Arc<TenantRegistry>,
        config: Arc<ServiceConfig>,
    ) -> Self {
        Self {
            users,
            families,
            tenants,
            config,
            provisioning: Mutex::new(()),
        }
    }

    /// Identity record, created on first contact
    pub async fn ensure_user(&self, verified: &VerifiedIdentity) -> Result<UserRecord> {
        if let Some(user) = self.users.get(&verified.identity).await? {
            return Ok(user);
        }

        let user = UserRecord {
            identity: verified.identity.clone(),
            email: verified.email.clone(),
            display_name: verified.display_name.clone(),
            family_id: None,
            activated: self.config.auth.auto_activate,
            notify_email: true,
            notify_web_push: false,
            ical_token: None,
            created_at: time::now(),
        };
        debug!(identity = %user.identity, activated = user.activated, "First contact");
        self.users.create_if_absent(&user).await
    }

    /// Resolve `(identity, family_id, role)` for an activated identity
    pub async fn resolve(&self, verified: &VerifiedIdentity) -> Result<RequestContext> {
        let user = self.ensure_user(verified).await?;
        if !user.activated {
            return Err(Error::NotActivated(verified.identity.clone()));
        }

        if let Some(ctx) = self.linked_context(verified, user.family_id).await? {
            return Ok(ctx);
        }

        let _guard = self.provisioning.lock().await;

        // Another request may have provisioned while we waited
        let linked = self
            .users
            .get(&verified.identity)
            .await?
            .and_then(|u| u.family_id);
        if let Some(ctx) = self.linked_context(verified, linked).await? {
            return Ok(ctx);
        }

        let family = self.tenants.provision_family(verified).await?;
        Ok(context(verified, family.id, Role::Owner))
    }

    async fn linked_context(
        &self,
        verified: &VerifiedIdentity,
        family_id: Option<Uuid>,
    ) -> Result<Option<RequestContext>> {
        let Some(family_id) = family_id else {
            return Ok(None);
        };

        let member = self.families.get_member(family_id, &verified.identity).await?;
        Ok(member.map(|m| context(verified, family_id, m.role)))
    }
}

fn context(verified: &VerifiedIdentity, family_id: Uuid, role: Role) -> RequestContext {
    RequestContext {
        identity: verified.identity.clone(),
        email: verified.email.clone(),
        display_name: verified.display_name.clone(),
        family_id,
        role,
    }
}
