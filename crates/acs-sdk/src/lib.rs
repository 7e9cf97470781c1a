//! acs-sdk - Device integration and connectivity layer for access-control devices
//!
//! Wraps the vendor's native device SDK and turns it into a small set of async
//! operations: find devices on the network, hold login sessions to them, pull
//! their events continuously and report health.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   AccessControlService                        │
//! │                                                              │
//! │  ┌───────────────┐  ┌────────────────┐  ┌─────────────────┐  │
//! │  │DiscoveryEngine│  │ SessionManager │  │  EventIngestor  │  │
//! │  │ (probe/bcast) │  │ (sessions,     │  │ (loop, buffer)  │  │
//! │  └───────┬───────┘  │  last-seen)    │  └────────┬────────┘  │
//! │          │          └───────┬────────┘           │           │
//! │          └──────────────────┼────────────────────┘           │
//! │                       ┌─────┴──────┐                         │
//! │                       │ SdkGateway │                         │
//! │                       └─────┬──────┘                         │
//! │                    ┌────────┴────────┐                       │
//! │                    │    NativeSdk    │                       │
//! │                    │ (dynamic/mock)  │                       │
//! │                    └─────────────────┘                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod codes;
pub mod config;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod native;
pub mod service;
pub mod session;

pub use codes::{describe, diagnose, SdkErrorCode};
pub use config::{AcsConfig, Credentials, DiscoveryConfig, IngestConfig, SdkBackend, SdkConfig};
pub use discovery::{dedup_devices, DiscoveryEngine, DiscoveryStrategy};
pub use error::{SdkError, SdkResult};
pub use gateway::{EventBatch, PullOutcome, PullRequest, SdkGateway};
pub use ingest::{EventIngestor, LoopState, TickReport, EVENT_BUFFER_CAPACITY};
pub use native::{create_loader, MockDeviceSpec, MockLoader, MockSdk, NativeSdk, SdkLoader};
pub use service::{AccessControlService, ConnectSummary};
pub use session::SessionManager;

// Re-export for convenience
pub use acs_core::{
    ConnectivityStatus, DeviceConnectivitySnapshot, DeviceEvent, DeviceEventKind, DeviceRepository,
    DeviceSession, DiscoveredDevice, DiscoverySource, ErrorDiagnostic, InMemoryDeviceRepository,
    RegisteredDevice, SdkHealth,
};
