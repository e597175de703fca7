//! Domain services
//!
//! Each service depends only on the ports in `satchel_common::ports`.

pub mod analysis_worker;
pub mod context_resolver;
pub mod digest;
pub mod intake;
pub mod notifications;
pub mod tenant_registry;
pub mod usage;

#[cfg(test)]
pub(crate) mod test_support;

pub use analysis_worker::{AnalysisOutcome, AnalysisWorker};
pub use context_resolver::{require_owner, ContextResolver, RequestContext};
pub use digest::{DigestService, FanOutSummary};
pub use intake::{UploadIntake, UploadOutcome, UploadRequest};
pub use notifications::NotificationService;
pub use tenant_registry::{IssuedInvitation, JoinedFamily, ProfileInput, TenantRegistry};
