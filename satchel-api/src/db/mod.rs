//! SQLite repositories
//!
//! Implement the repository ports from `satchel_common::ports` on top of the
//! schema created by `satchel_common::db::init`.

pub mod documents;
pub mod families;
pub mod users;

pub use documents::SqliteDocumentRepository;
pub use families::SqliteFamilyRepository;
pub use users::{SqliteSubscriptionRepository, SqliteUserRepository};

use satchel_common::{Error, Result};
use uuid::Uuid;

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid stored id '{}': {}", value, e)))
}

pub(crate) fn parse_optional_uuid(value: Option<String>) -> Result<Option<Uuid>> {
    value.as_deref().map(parse_uuid).transpose()
}
