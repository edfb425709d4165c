//! BlueZ transport.
//!
//! Talks to `bluetoothd` over D-Bus through `bluer`. Device identifiers are
//! MAC addresses. Linux only; enabled with the `bluetooth` feature.

use bluer::{Adapter, AdapterEvent, Address, Device, DeviceEvent, DeviceProperty};
use futures::{pin_mut, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

use crate::transport::{ServiceSummary, Transport, TransportError, TransportResult};
use crate::types::{DeviceId, DiscoveredDevice};

/// Connection to one BlueZ device.
#[derive(Debug, Clone)]
pub struct BluerHandle {
    id: DeviceId,
    device: Device,
}

/// [`Transport`] over the default BlueZ adapter.
#[derive(Debug, Clone)]
pub struct BluerTransport {
    adapter: Adapter,
}

impl BluerTransport {
    /// Open a D-Bus session and power on the default adapter.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AdapterUnavailable`] if `bluetoothd` is not
    /// reachable or there is no adapter.
    pub async fn new() -> TransportResult<Self> {
        let session = bluer::Session::new().await.map_err(unavailable)?;
        let adapter = session.default_adapter().await.map_err(unavailable)?;
        adapter.set_powered(true).await.map_err(unavailable)?;

        info!(adapter = adapter.name(), "using Bluetooth adapter");
        Ok(Self { adapter })
    }

    /// Name of the adapter in use, e.g. `hci0`.
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    fn device(&self, id: &DeviceId) -> TransportResult<Device> {
        let address: Address = id.as_str().parse().map_err(|_| TransportError::ConnectFailed {
            device: id.clone(),
            message: "not a Bluetooth address".into(),
        })?;
        self.adapter
            .device(address)
            .map_err(|e| TransportError::ConnectFailed {
                device: id.clone(),
                message: e.to_string(),
            })
    }
}

fn unavailable(e: bluer::Error) -> TransportError {
    TransportError::AdapterUnavailable {
        message: e.to_string(),
    }
}

/// Re-announce a device once BlueZ learns its name.
async fn forward_late_name(device: Device, id: DeviceId, tx: mpsc::Sender<DiscoveredDevice>) {
    let Ok(events) = device.events().await else {
        return;
    };
    pin_mut!(events);
    loop {
        let event = tokio::select! {
            () = tx.closed() => return,
            event = events.next() => event,
        };
        match event {
            Some(DeviceEvent::PropertyChanged(DeviceProperty::Name(name))) => {
                trace!(%id, %name, "name resolved");
                let advert = DiscoveredDevice {
                    id,
                    name: Some(name),
                    rssi: device.rssi().await.ok().flatten(),
                };
                let _ = tx.send(advert).await;
                return;
            }
            Some(_) => {}
            None => return,
        }
    }
}

impl Transport for BluerTransport {
    type Handle = BluerHandle;

    async fn discover(&self) -> TransportResult<mpsc::Receiver<DiscoveredDevice>> {
        let events = self
            .adapter
            .discover_devices()
            .await
            .map_err(|e| TransportError::ScanFailed {
                message: e.to_string(),
            })?;
        let adapter = self.adapter.clone();
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            pin_mut!(events);
            loop {
                let event = tokio::select! {
                    () = tx.closed() => break,
                    event = events.next() => event,
                };
                let Some(event) = event else { break };
                let AdapterEvent::DeviceAdded(address) = event else {
                    continue;
                };
                let Ok(device) = adapter.device(address) else {
                    continue;
                };

                let advert = DiscoveredDevice {
                    id: DeviceId::new(address.to_string()),
                    name: device.name().await.ok().flatten(),
                    rssi: device.rssi().await.ok().flatten(),
                };
                trace!(id = %advert.id, name = ?advert.name, "advertisement");
                if advert.name.is_none() {
                    // The name often arrives later, in a scan response.
                    tokio::spawn(forward_late_name(device, advert.id.clone(), tx.clone()));
                }
                if tx.send(advert).await.is_err() {
                    break;
                }
            }
            // Dropping the event stream ends the BlueZ discovery session.
            debug!("discovery stopped");
        });

        Ok(rx)
    }

    async fn connect(&self, device: &DeviceId) -> TransportResult<BluerHandle> {
        let handle = BluerHandle {
            id: device.clone(),
            device: self.device(device)?,
        };
        handle
            .device
            .connect()
            .await
            .map_err(|e| TransportError::ConnectFailed {
                device: device.clone(),
                message: e.to_string(),
            })?;
        Ok(handle)
    }

    async fn discover_services(&self, handle: &BluerHandle) -> TransportResult<ServiceSummary> {
        let failed = |e: bluer::Error| TransportError::DiscoveryFailed {
            device: handle.id.clone(),
            message: e.to_string(),
        };

        let services = handle.device.services().await.map_err(failed)?;
        let mut summary = ServiceSummary {
            services: services.len(),
            characteristics: 0,
        };
        for service in &services {
            summary.characteristics += service.characteristics().await.map_err(failed)?.len();
        }
        debug!(
            device = %handle.id,
            services = summary.services,
            characteristics = summary.characteristics,
            "services resolved"
        );
        Ok(summary)
    }

    async fn read_signal_strength(&self, handle: &BluerHandle) -> TransportResult<i16> {
        match handle.device.rssi().await {
            Ok(Some(rssi)) => Ok(rssi),
            // BlueZ only reports RSSI it has seen recently.
            Ok(None) => Err(TransportError::ReadFailed {
                message: "no RSSI reported".into(),
            }),
            Err(e) => Err(TransportError::ReadFailed {
                message: e.to_string(),
            }),
        }
    }

    async fn on_disconnected(&self, handle: &BluerHandle) -> TransportResult<oneshot::Receiver<()>> {
        let events = handle
            .device
            .events()
            .await
            .map_err(|e| TransportError::DiscoveryFailed {
                device: handle.id.clone(),
                message: e.to_string(),
            })?;
        let (mut tx, rx) = oneshot::channel();
        let id = handle.id.clone();

        tokio::spawn(async move {
            pin_mut!(events);
            let lost = loop {
                let event = tokio::select! {
                    () = tx.closed() => break false,
                    event = events.next() => event,
                };
                match event {
                    Some(DeviceEvent::PropertyChanged(DeviceProperty::Connected(false))) => {
                        break true
                    }
                    Some(_) => {}
                    None => break false,
                }
            };
            if lost {
                debug!(device = %id, "BlueZ reported disconnect");
                let _ = tx.send(());
            }
        });

        Ok(rx)
    }

    async fn disconnect(&self, handle: &BluerHandle) -> TransportResult<()> {
        handle
            .device
            .disconnect()
            .await
            .map_err(|e| TransportError::DisconnectFailed {
                message: e.to_string(),
            })
    }
}
