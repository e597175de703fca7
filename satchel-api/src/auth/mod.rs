//! Request authentication
//!
//! Client requests carry an HS256 bearer token; worker calls carry a
//! queue-issued token checked by middleware.

pub mod context;
pub mod identity;
pub mod worker;

pub use context::{FamilyContext, OwnerContext};
pub use identity::{sign_client_token, AuthenticatedUser, ClientClaims, JwtIdentityVerifier};
pub use worker::{sign_worker_token, worker_auth_middleware, WorkerAuth};
