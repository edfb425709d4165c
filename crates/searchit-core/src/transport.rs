//! The radio transport seam.
//!
//! The pairing engine never talks to a Bluetooth stack directly. It drives an
//! implementation of [`Transport`]: [`BluerTransport`](crate::bluetooth::BluerTransport)
//! on Linux, or [`SimulatedTransport`](crate::sim::SimulatedTransport) for
//! tests and hardware-less runs.

use std::future::Future;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::types::{DeviceId, DiscoveredDevice};

/// Errors reported by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No usable adapter (missing, powered off, daemon not running).
    #[error("Bluetooth adapter unavailable: {message}")]
    AdapterUnavailable {
        /// Underlying cause.
        message: String,
    },

    /// Discovery could not be started.
    #[error("Discovery failed: {message}")]
    ScanFailed {
        /// Underlying cause.
        message: String,
    },

    /// The transport-level connect failed.
    #[error("Connect to {device} failed: {message}")]
    ConnectFailed {
        /// Target device.
        device: DeviceId,
        /// Underlying cause.
        message: String,
    },

    /// Service or characteristic enumeration failed.
    #[error("Service discovery on {device} failed: {message}")]
    DiscoveryFailed {
        /// Target device.
        device: DeviceId,
        /// Underlying cause.
        message: String,
    },

    /// A signal-strength read failed.
    #[error("RSSI read failed: {message}")]
    ReadFailed {
        /// Underlying cause.
        message: String,
    },

    /// Tearing the connection down failed.
    #[error("Disconnect failed: {message}")]
    DisconnectFailed {
        /// Underlying cause.
        message: String,
    },

    /// The handle no longer refers to an open connection.
    #[error("Not connected")]
    NotConnected,
}

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// What service discovery found on the beacon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceSummary {
    /// Number of GATT services.
    pub services: usize,
    /// Number of characteristics across all services.
    pub characteristics: usize,
}

/// A BLE central capable of scanning, connecting and reading RSSI.
///
/// Implementations must be cheap to share behind an `Arc`; every method takes `&self`.
pub trait Transport: Send + Sync + 'static {
    /// An open connection.
    type Handle: Clone + Send + Sync + 'static;

    /// Start device discovery.
    ///
    /// Every advertisement is delivered on the returned channel. Discovery
    /// stops when the receiver is dropped.
    fn discover(
        &self,
    ) -> impl Future<Output = TransportResult<mpsc::Receiver<DiscoveredDevice>>> + Send;

    /// Open a transport-level connection.
    fn connect(
        &self,
        device: &DeviceId,
    ) -> impl Future<Output = TransportResult<Self::Handle>> + Send;

    /// Enumerate the services and characteristics of a connected beacon.
    fn discover_services(
        &self,
        handle: &Self::Handle,
    ) -> impl Future<Output = TransportResult<ServiceSummary>> + Send;

    /// Read the current signal strength in dBm.
    fn read_signal_strength(
        &self,
        handle: &Self::Handle,
    ) -> impl Future<Output = TransportResult<i16>> + Send;

    /// Subscribe to the link-loss notification of `handle`.
    ///
    /// The receiver resolves once, when the link drops. If the sender is
    /// dropped without firing, no disconnect was observed.
    fn on_disconnected(
        &self,
        handle: &Self::Handle,
    ) -> impl Future<Output = TransportResult<oneshot::Receiver<()>>> + Send;

    /// Close the connection.
    fn disconnect(&self, handle: &Self::Handle) -> impl Future<Output = TransportResult<()>> + Send;
}
