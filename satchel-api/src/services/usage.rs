//! Monthly usage counter: lazy reset and quota check
//!
//! The counter is reset on access rather than by a scheduled job. The reset
//! decision is a pure function of `last_reset_at` and the current time so it
//! can be tested without a store.

use chrono::{DateTime, Utc};
use satchel_common::config::QuotaConfig;
use satchel_common::models::{Family, Plan};
use satchel_common::ports::FamilyRepository;
use satchel_common::{time, Error, Result};
use tracing::info;

/// Write required by the lazy reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetAction {
    /// First access: stamp `last_reset_at`, counter untouched
    StampOnly,
    /// Month boundary crossed: zero the counter and stamp
    ResetCounter,
}

impl ResetAction {
    fn resets_counter(&self) -> bool {
        matches!(self, ResetAction::ResetCounter)
    }
}

/// Decide what the lazy reset must write, if anything
pub fn plan_monthly_reset(
    last_reset_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<ResetAction> {
    match last_reset_at {
        None => Some(ResetAction::StampOnly),
        Some(last) if !time::same_calendar_month(last, now) => Some(ResetAction::ResetCounter),
        Some(_) => None,
    }
}

/// Apply the lazy reset to `family` and return the post-reset view
///
/// At most one write per call; a second call in the same month writes nothing.
pub async fn ensure_monthly_reset(
    families: &dyn FamilyRepository,
    mut family: Family,
    now: DateTime<Utc>,
) -> Result<Family> {
    let Some(action) = plan_monthly_reset(family.last_reset_at, now) else {
        return Ok(family);
    };

    families
        .record_reset(family.id, action.resets_counter(), now)
        .await?;

    if action.resets_counter() {
        info!(
            family_id = %family.id,
            previous = family.documents_this_month,
            "Monthly document counter reset"
        );
        family.documents_this_month = 0;
    }
    family.last_reset_at = Some(now);

    Ok(family)
}

/// Reject a new document when the free plan cap is reached
///
/// `family` must already reflect the lazy reset.
pub fn check_quota(family: &Family, quota: &QuotaConfig) -> Result<()> {
    if !quota.enforce || family.plan == Plan::Premium {
        return Ok(());
    }

    if family.documents_this_month >= quota.free_monthly_documents {
        return Err(Error::QuotaExceeded {
            limit: quota.free_monthly_documents,
        });
    }

    Ok(())
}
