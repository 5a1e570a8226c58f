//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the boundary between the host and a storage backend.
//! The host only ever talks to a [`StorageDriver`]; adapter crates implement it.

pub mod storage_driver;

pub use storage_driver::{
    DriverError, DriverInfo, FileStream, Link, Object, ProgressFn, StorageDriver,
};
