//! # Satchel Common Library
//!
//! Shared code for the satchel document service:
//! - Error taxonomy (domain and infrastructure)
//! - Configuration loading and root folder resolution
//! - Domain models (families, documents, notifications)
//! - Repository and collaborator ports
//! - SQLite schema initialization
//! - Opaque token and content hash helpers

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod ports;
pub mod time;
pub mod tokens;

pub use error::{Error, Result, ValidationError};
