//! Runtime choice of radio transport.
//!
//! The server is built against one concrete [`Transport`], [`BeaconTransport`],
//! which forwards to either the simulated radio or BlueZ depending on
//! configuration and enabled features.

use searchit_core::sim::SimHandle;
use searchit_core::{
    Config, DeviceId, DiscoveredDevice, ServiceSummary, SimulatedTransport, Transport,
    TransportError, TransportResult,
};
#[cfg(feature = "bluetooth")]
use searchit_core::{BluerHandle, BluerTransport};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

/// The transport the server drives.
#[derive(Debug, Clone)]
pub enum BeaconTransport {
    /// In-process simulated beacon.
    Simulated(SimulatedTransport),
    /// BlueZ over D-Bus.
    #[cfg(feature = "bluetooth")]
    Bluez(BluerTransport),
}

/// Connection handle of a [`BeaconTransport`].
#[derive(Debug, Clone)]
pub enum BeaconHandle {
    /// Simulated connection.
    Simulated(SimHandle),
    /// BlueZ connection.
    #[cfg(feature = "bluetooth")]
    Bluez(BluerHandle),
}

impl BeaconTransport {
    /// Pick the transport for `config`.
    ///
    /// BlueZ is used when the `bluetooth` feature is enabled and
    /// `beacon.simulate` is off; otherwise the simulated beacon advertises
    /// under the configured name.
    ///
    /// # Errors
    ///
    /// Returns an error if BlueZ was requested but no adapter is usable.
    #[allow(clippy::unused_async)]
    pub async fn from_config(config: &Config) -> TransportResult<Self> {
        #[cfg(feature = "bluetooth")]
        if !config.beacon.simulate {
            return Ok(Self::Bluez(BluerTransport::new().await?));
        }

        #[cfg(not(feature = "bluetooth"))]
        if !config.beacon.simulate {
            tracing::warn!("built without the bluetooth feature, using the simulated beacon");
        }

        info!(name = %config.beacon.name, "using simulated beacon");
        Ok(Self::simulated(SimulatedTransport::demo(&config.beacon.name)))
    }

    /// Wrap a simulated transport.
    #[must_use]
    pub const fn simulated(sim: SimulatedTransport) -> Self {
        Self::Simulated(sim)
    }

    /// Short name of the backend, for status output.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::Simulated(_) => "simulated",
            #[cfg(feature = "bluetooth")]
            Self::Bluez(_) => "bluez",
        }
    }
}

// A handle always comes from the transport it is passed back to.
#[allow(unreachable_patterns)]
impl Transport for BeaconTransport {
    type Handle = BeaconHandle;

    async fn discover(&self) -> TransportResult<mpsc::Receiver<DiscoveredDevice>> {
        match self {
            Self::Simulated(t) => t.discover().await,
            #[cfg(feature = "bluetooth")]
            Self::Bluez(t) => t.discover().await,
        }
    }

    async fn connect(&self, device: &DeviceId) -> TransportResult<BeaconHandle> {
        match self {
            Self::Simulated(t) => t.connect(device).await.map(BeaconHandle::Simulated),
            #[cfg(feature = "bluetooth")]
            Self::Bluez(t) => t.connect(device).await.map(BeaconHandle::Bluez),
        }
    }

    async fn discover_services(&self, handle: &BeaconHandle) -> TransportResult<ServiceSummary> {
        match (self, handle) {
            (Self::Simulated(t), BeaconHandle::Simulated(h)) => t.discover_services(h).await,
            #[cfg(feature = "bluetooth")]
            (Self::Bluez(t), BeaconHandle::Bluez(h)) => t.discover_services(h).await,
            _ => Err(TransportError::NotConnected),
        }
    }

    async fn read_signal_strength(&self, handle: &BeaconHandle) -> TransportResult<i16> {
        match (self, handle) {
            (Self::Simulated(t), BeaconHandle::Simulated(h)) => t.read_signal_strength(h).await,
            #[cfg(feature = "bluetooth")]
            (Self::Bluez(t), BeaconHandle::Bluez(h)) => t.read_signal_strength(h).await,
            _ => Err(TransportError::NotConnected),
        }
    }

    async fn on_disconnected(&self, handle: &BeaconHandle) -> TransportResult<oneshot::Receiver<()>> {
        match (self, handle) {
            (Self::Simulated(t), BeaconHandle::Simulated(h)) => t.on_disconnected(h).await,
            #[cfg(feature = "bluetooth")]
            (Self::Bluez(t), BeaconHandle::Bluez(h)) => t.on_disconnected(h).await,
            _ => Err(TransportError::NotConnected),
        }
    }

    async fn disconnect(&self, handle: &BeaconHandle) -> TransportResult<()> {
        match (self, handle) {
            (Self::Simulated(t), BeaconHandle::Simulated(h)) => t.disconnect(h).await,
            #[cfg(feature = "bluetooth")]
            (Self::Bluez(t), BeaconHandle::Bluez(h)) => t.disconnect(h).await,
            _ => Err(TransportError::NotConnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulate_flag_selects_simulated_backend() {
        let mut config = Config::default();
        config.beacon.simulate = true;
        let transport = tokio_test::assert_ok!(BeaconTransport::from_config(&config).await);
        assert_eq!(transport.backend(), "simulated");
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_to_simulated_radio() {
        let sim = SimulatedTransport::new();
        let transport = BeaconTransport::simulated(sim.clone());

        let handle = transport.connect(&DeviceId::new("AA")).await.unwrap();
        assert!(matches!(handle, BeaconHandle::Simulated(_)));
        assert!(transport.read_signal_strength(&handle).await.is_ok());
        assert_eq!(sim.connect_calls(), 1);
        assert_eq!(sim.read_calls(), 1);
    }
}
