//! Domain models

pub mod document;
pub mod notification;
pub mod tenant;

pub use document::*;
pub use notification::*;
pub use tenant::*;
