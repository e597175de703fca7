//! Repository and collaborator ports
//!
//! Services depend only on these traits. SQLite repositories and the
//! filesystem/HTTP adapters in the service crate implement them; tests swap in
//! fakes.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AnalysisJob, DocumentAnalysis, DocumentRecord, DocumentStatus, EventRecord, Family,
    Invitation, InvitationStatus, Member, NewDocument, PreferenceUpdate, Profile,
    PushMessage, PushSubscription, TaskRecord, UserRecord,
};
use crate::Result;

/// Result of inserting a new document under the `(family_id, content_hash)` constraint
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// Row written
    Created(DocumentRecord),
    /// A concurrent upload of the same bytes won; its record is returned
    Existing(DocumentRecord),
}

/// Documents and their event/task children
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a `pending` document unless one with the same hash already exists
    async fn insert_pending(&self, doc: &NewDocument) -> Result<InsertOutcome>;

    async fn get(&self, family_id: Uuid, document_id: Uuid) -> Result<Option<DocumentRecord>>;

    async fn find_by_content_hash(
        &self,
        family_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<DocumentRecord>>;

    /// Newest first
    async fn list(&self, family_id: Uuid) -> Result<Vec<DocumentRecord>>;

    /// Documents in `status` across all families, oldest first
    async fn list_by_status(&self, status: DocumentStatus) -> Result<Vec<DocumentRecord>>;

    /// Conditional status write
    ///
    /// Only applied when the current status is an allowed predecessor of
    /// `next`. Returns false when nothing was written.
    async fn transition(
        &self,
        document_id: Uuid,
        next: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<bool>;

    /// Persist analysis output and move `processing → completed` atomically
    ///
    /// Existing children of the document are replaced. Returns false when the
    /// document was not in `processing`.
    async fn save_analysis(&self, document_id: Uuid, analysis: &DocumentAnalysis) -> Result<bool>;

    /// Delete the record and its children
    async fn delete(&self, family_id: Uuid, document_id: Uuid) -> Result<bool>;

    /// Events whose start date falls in `[from, to]` (both optional, inclusive)
    async fn list_events(
        &self,
        family_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<EventRecord>>;

    async fn list_tasks(&self, family_id: Uuid, completed: Option<bool>) -> Result<Vec<TaskRecord>>;

    /// Returns false when the task does not belong to the family
    async fn set_task_completed(&self, family_id: Uuid, task_id: Uuid, completed: bool)
        -> Result<bool>;
}

/// Families, members, invitations and profiles
#[async_trait]
pub trait FamilyRepository: Send + Sync {
    /// Create a family and its owner membership in one atomic unit
    async fn create_with_owner(
        &self,
        owner_identity: &str,
        name: &str,
        display_name: &str,
        email: &str,
    ) -> Result<Family>;

    async fn get(&self, family_id: Uuid) -> Result<Option<Family>>;

    async fn rename(&self, family_id: Uuid, name: &str) -> Result<bool>;

    /// Record a lazy reset: stamp `last_reset_at`, optionally zeroing the counter
    async fn record_reset(
        &self,
        family_id: Uuid,
        reset_counter: bool,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Add one to the monthly counter
    async fn increment_usage(&self, family_id: Uuid) -> Result<()>;

    async fn get_member(&self, family_id: Uuid, identity: &str) -> Result<Option<Member>>;

    async fn list_members(&self, family_id: Uuid) -> Result<Vec<Member>>;

    async fn remove_member(&self, family_id: Uuid, identity: &str) -> Result<bool>;

    async fn create_invitation(&self, invitation: &Invitation) -> Result<()>;

    async fn get_invitation_by_token(&self, token: &str) -> Result<Option<Invitation>>;

    /// Conditional `pending → status` write
    async fn close_invitation(&self, invitation_id: Uuid, status: InvitationStatus)
        -> Result<bool>;

    /// Accept an invitation atomically
    ///
    /// Flips the invitation `pending → accepted`, adds the member, and links and
    /// activates the member's identity. Returns false (and writes nothing) when
    /// the invitation was no longer pending.
    async fn redeem_invitation(&self, invitation_id: Uuid, member: &Member) -> Result<bool>;

    async fn list_profiles(&self, family_id: Uuid) -> Result<Vec<Profile>>;

    async fn create_profile(&self, family_id: Uuid, profile: &Profile) -> Result<()>;

    async fn update_profile(&self, family_id: Uuid, profile: &Profile) -> Result<bool>;

    async fn delete_profile(&self, family_id: Uuid, profile_id: Uuid) -> Result<bool>;
}

/// Per-identity records
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, identity: &str) -> Result<Option<UserRecord>>;

    /// Insert if absent; returns the stored record either way
    async fn create_if_absent(&self, user: &UserRecord) -> Result<UserRecord>;

    async fn link_family(&self, identity: &str, family_id: Option<Uuid>) -> Result<()>;

    async fn set_activated(&self, identity: &str, activated: bool) -> Result<bool>;

    async fn update_preferences(&self, identity: &str, update: &PreferenceUpdate) -> Result<()>;

    /// Set the feed token only if none exists; returns the stored token
    async fn ensure_ical_token(&self, identity: &str, candidate: &str) -> Result<String>;

    async fn find_by_ical_token(&self, token: &str) -> Result<Option<UserRecord>>;

    /// Identities with push enabled and a linked family
    async fn list_push_recipients(&self) -> Result<Vec<UserRecord>>;
}

/// Push subscriptions keyed by `(identity, endpoint_key)`
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Insert or overwrite the device entry
    async fn upsert(&self, subscription: &PushSubscription) -> Result<()>;

    async fn remove(&self, identity: &str, endpoint_key: &str) -> Result<bool>;

    async fn remove_all(&self, identity: &str) -> Result<u64>;

    async fn list(&self, identity: &str) -> Result<Vec<PushSubscription>>;
}

/// Binary object store for uploaded files
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8], mime_type: &str) -> Result<()>;

    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Deleting a missing blob is not an error
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Dispatches analysis jobs to the worker
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &AnalysisJob) -> Result<()>;
}

/// External document classifier
#[async_trait]
pub trait DocumentClassifier: Send + Sync {
    async fn classify(
        &self,
        bytes: &[u8],
        mime_type: &str,
        profiles: &[Profile],
    ) -> Result<DocumentAnalysis>;
}

/// Push delivery failure kinds
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Subscription permanently gone (HTTP 404/410 from the push service)
    #[error("subscription gone: {0}")]
    Gone(String),

    /// Anything else; the device is kept
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Outbound push transport
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(
        &self,
        subscription: &PushSubscription,
        message: &PushMessage,
    ) -> std::result::Result<(), DeliveryError>;
}

/// Verified bearer identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub identity: String,
    pub email: String,
    pub email_verified: bool,
    pub display_name: String,
}

/// Verifies client bearer tokens
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<VerifiedIdentity>;
}

/// Renders events as a calendar feed document
pub trait CalendarFeedRenderer: Send + Sync {
    fn render(&self, calendar_name: &str, events: &[EventRecord]) -> String;
}
