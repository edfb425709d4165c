//! # searchit-core
//!
//! Pairing and proximity-tracking engine for Search It, which pairs a BLE
//! beacon to a tracked object and reports how far away it is.
//!
//! This crate provides:
//! - A scan controller that finds the beacon by its advertised name
//! - A connection manager that connects, discovers services, monitors and
//!   reconnects on request
//! - An RSSI sampler that classifies signal strength into distance labels
//! - A pairing session that ties these together for one tracked object
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! - [`proximity`] - RSSI to distance-label classification
//! - [`sampler`] - Periodic RSSI polling while a connection is monitored
//! - [`scan`] - Time-bounded, name-filtered device discovery
//! - [`connection`] - Connection lifecycle state machine
//! - [`session`] - Pairing orchestration and the event stream
//!
//! Collaborators and plumbing:
//!
//! - [`transport`] - The BLE central seam; [`sim`] and `bluetooth` implement it
//! - [`radio`] - The process-wide radio with its mutual-exclusion lease
//! - [`permissions`] - Radio permission gate
//! - [`registry`] / [`storage`] - Tracked objects and their JSON persistence
//! - [`config`] - Layered configuration loading and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

#[cfg(feature = "bluetooth")]
pub mod bluetooth;
pub mod config;
pub mod connection;
pub mod error;
pub mod permissions;
pub mod proximity;
pub mod radio;
pub mod registry;
pub mod sampler;
pub mod scan;
pub mod session;
pub mod sim;
pub mod storage;
pub mod transport;
pub mod types;

// Re-export primary types for convenience
#[cfg(feature = "bluetooth")]
pub use bluetooth::{BluerHandle, BluerTransport};
pub use config::{
    default_config_path, BeaconConfig, Config, ConfigError, ConfigResult, ProximityConfig,
    RegistryConfig, SamplerConfig, ServerConfig, DEFAULT_BEACON_NAME,
};
pub use connection::{Connection, ConnectionManager};
pub use error::{ErrorKind, Result, SearchItError};
pub use permissions::{AlwaysGranted, PermissionGate, PermissionReport};
pub use proximity::{classify, ProximityLabel, ProximitySample, ProximityThresholds};
pub use radio::{Radio, RadioLease, RadioUse};
pub use registry::{ObjectRegistry, ObjectStore, DEFAULT_MAX_OBJECTS};
pub use sampler::{SampleFeed, SamplerHandle};
pub use scan::{ScanController, ScanOutcome};
pub use session::{
    DisconnectCause, PairingOutcome, PairingSession, SessionConfig, SessionEvent, SessionStatus,
};
pub use sim::{ScriptedPermissions, SimulatedTransport};
pub use storage::{default_data_dir, Storage};
pub use transport::{ServiceSummary, Transport, TransportError, TransportResult};
pub use types::{
    Capability, ConnectionState, DeviceId, DiscoveredDevice, ScanState, TrackedObject,
};
