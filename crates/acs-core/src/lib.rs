//! acs-core - Core types for the access-control device integration layer
//!
//! This crate holds the value types shared between the SDK layer and its
//! consumers (daemon, persistence, API), plus the repository seam through
//! which connectivity changes are pushed back to durable storage.

pub mod error;
pub mod models;
pub mod repository;

pub use error::{RepositoryError, RepositoryResult};
pub use models::*;
pub use repository::{DeviceRepository, InMemoryDeviceRepository, RegisteredDevice, StatusUpdate};
