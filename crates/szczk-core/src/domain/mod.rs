//! Domain types
//!
//! - Newtypes for remote identifiers and host paths
//! - Domain-specific error types

pub mod errors;
pub mod newtypes;

pub use errors::DomainError;
pub use newtypes::{RemoteId, RemotePath};
