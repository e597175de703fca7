//! Families, memberships, invitations and profiles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Name given to an auto-provisioned family
pub const DEFAULT_FAMILY_NAME: &str = "My Family";

/// Billing plan of a family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    /// Capped number of documents per calendar month
    Free,
    /// Unlimited
    Premium,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Premium => "premium",
        }
    }
}

impl FromStr for Plan {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Plan::Free),
            "premium" => Ok(Plan::Premium),
            other => Err(Error::Internal(format!("Unknown plan: {}", other))),
        }
    }
}

/// Role of a member within a family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Member => "member",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "member" => Ok(Role::Member),
            other => Err(Error::Internal(format!("Unknown role: {}", other))),
        }
    }
}

/// Billing and sharing tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Family {
    pub id: Uuid,
    pub owner_identity: String,
    pub name: String,
    pub plan: Plan,
    /// Only reset by the lazy monthly reset, never decremented
    pub documents_this_month: i64,
    pub last_reset_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Membership of one identity in one family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub family_id: Uuid,
    pub identity: String,
    pub role: Role,
    pub display_name: String,
    pub email: String,
    pub joined_at: DateTime<Utc>,
}

/// Lifecycle of an invitation token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Expired => "expired",
        }
    }
}

impl FromStr for InvitationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "expired" => Ok(InvitationStatus::Expired),
            other => Err(Error::Internal(format!("Unknown invitation status: {}", other))),
        }
    }
}

/// Single-use invitation into a family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    pub family_id: Uuid,
    /// Target email; matched case-insensitively at redemption
    pub email: String,
    pub token: String,
    pub status: InvitationStatus,
    pub invited_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Invitation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn email_matches(&self, email: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
    }
}

/// Household member profile (classifier context)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    /// School grade or similar short descriptor
    pub grade: String,
    /// Comma-separated hints for the classifier
    pub keywords: String,
}
