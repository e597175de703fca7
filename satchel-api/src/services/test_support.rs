//! Family repository that records its usage-counter writes

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use satchel_common::models::{Family, Invitation, InvitationStatus, Member, Profile};
use satchel_common::ports::FamilyRepository;
use satchel_common::Result;
use std::sync::Mutex;
use uuid::Uuid;

use crate::db::SqliteFamilyRepository;

/// One write to the `families` usage columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageWrite {
    Reset { reset_counter: bool },
    Increment,
}

/// Delegates to SQLite and logs `record_reset` / `increment_usage` calls in order
pub struct CountingFamilies {
    inner: SqliteFamilyRepository,
    writes: Mutex<Vec<UsageWrite>>,
}

impl CountingFamilies {
    pub fn new(inner: SqliteFamilyRepository) -> Self {
        Self {
            inner,
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn writes(&self) -> Vec<UsageWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub fn reset_count(&self) -> usize {
        self.writes()
            .iter()
            .filter(|w| matches!(w, UsageWrite::Reset { .. }))
            .count()
    }

    pub fn clear(&self) {
        self.writes.lock().unwrap().clear();
    }
}

#[async_trait]
impl FamilyRepository for CountingFamilies {
    async fn create_with_owner(
        &self,
        owner_identity: &str,
        name: &str,
        display_name: &str,
        email: &str,
    ) -> Result<Family> {
        self.inner
            .create_with_owner(owner_identity, name, display_name, email)
            .await
    }

    async fn get(&self, family_id: Uuid) -> Result<Option<Family>> {
        self.inner.get(family_id).await
    }

    async fn rename(&self, family_id: Uuid, name: &str) -> Result<bool> {
        self.inner.rename(family_id, name).await
    }

    async fn record_reset(
        &self,
        family_id: Uuid,
        reset_counter: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push(UsageWrite::Reset { reset_counter });
        self.inner.record_reset(family_id, reset_counter, at).await
    }

    async fn increment_usage(&self, family_id: Uuid) -> Result<()> {
        self.writes.lock().unwrap().push(UsageWrite::Increment);
        self.inner.increment_usage(family_id).await
    }

    async fn get_member(&self, family_id: Uuid, identity: &str) -> Result<Option<Member>> {
        self.inner.get_member(family_id, identity).await
    }

    async fn list_members(&self, family_id: Uuid) -> Result<Vec<Member>> {
        self.inner.list_members(family_id).await
    }

    async fn remove_member(&self, family_id: Uuid, identity: &str) -> Result<bool> {
        self.inner.remove_member(family_id, identity).await
    }

    async fn create_invitation(&self, invitation: &Invitation) -> Result<()> {
        self.inner.create_invitation(invitation).await
    }

    async fn get_invitation_by_token(&self, token: &str) -> Result<Option<Invitation>> {
        self.inner.get_invitation_by_token(token).await
    }

    async fn close_invitation(
        &self,
        invitation_id: Uuid,
        status: InvitationStatus,
    ) -> Result<bool> {
        self.inner.close_invitation(invitation_id, status).await
    }

    async fn redeem_invitation(&self, invitation_id: Uuid, member: &Member) -> Result<bool> {
        self.inner.redeem_invitation(invitation_id, member).await
    }

    async fn list_profiles(&self, family_id: Uuid) -> Result<Vec<Profile>> {
        self.inner.list_profiles(family_id).await
    }

    async fn create_profile(&self, family_id: Uuid, profile: &Profile) -> Result<()> {
        self.inner.create_profile(family_id, profile).await
    }

    async fn update_profile(&self, family_id: Uuid, profile: &Profile) -> Result<bool> {
        self.inner.update_profile(family_id, profile).await
    }

    async fn delete_profile(&self, family_id: Uuid, profile_id: Uuid) -> Result<bool> {
        self.inner.delete_profile(family_id, profile_id).await
    }
}
