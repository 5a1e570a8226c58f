//! Szczk Core - host-facing model and driver contract
//!
//! This crate contains everything the host side of the storage adapter needs
//! without pulling in any HTTP machinery:
//! - **Domain types** - validated `RemoteId` and `RemotePath` newtypes
//! - **Port definitions** - the `StorageDriver` trait, the host `Object` model
//!   and the `DriverError` classification every operation returns
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The remote service addresses objects by opaque identifier while the host
//! addresses them by path. This crate owns the host half of that mapping;
//! `szczk-cloud` implements the port against the remote API.

pub mod config;
pub mod domain;
pub mod ports;
