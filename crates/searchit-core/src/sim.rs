//! A scripted, in-process beacon.
//!
//! [`SimulatedTransport`] plays back advertisements on a timeline, answers
//! connect and service discovery with scripted outcomes, serves RSSI from a
//! script or a repeating pattern, and lets the caller drop the link at will.
//! It backs the test suite and lets the server run without Bluetooth hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

use crate::permissions::{PermissionGate, PermissionReport};
use crate::transport::{ServiceSummary, Transport, TransportError, TransportResult};
use crate::types::{Capability, DeviceId, DiscoveredDevice};

/// Scripted outcome of a connect or service-discovery step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Complete successfully after the configured delay.
    Succeed,
    /// Fail with the given message after the configured delay.
    Fail(String),
    /// Never complete.
    Hang,
}

/// Handle to a simulated connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimHandle {
    /// Connected device.
    pub device: DeviceId,
    link: u64,
}

#[derive(Debug)]
struct SimState {
    advertisements: Vec<(Duration, DiscoveredDevice)>,
    scan_failure: Option<String>,
    connect: Step,
    connect_delay: Duration,
    discovery: Step,
    discovery_delay: Duration,
    rssi_script: VecDeque<Result<i16, String>>,
    rssi_pattern: Vec<i16>,
    pattern_pos: usize,
    link: u64,
    connected: Option<u64>,
    disconnect_tx: Option<oneshot::Sender<()>>,
    discovering: bool,
}

#[derive(Debug, Default)]
struct Counters {
    discover: AtomicUsize,
    connect: AtomicUsize,
    reads: AtomicUsize,
    disconnect: AtomicUsize,
}

/// In-process stand-in for a BLE central and one beacon.
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    state: Arc<Mutex<SimState>>,
    counters: Arc<Counters>,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTransport {
    /// A transport with nothing advertising, where connect and discovery succeed at once.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                advertisements: Vec::new(),
                scan_failure: None,
                connect: Step::Succeed,
                connect_delay: Duration::ZERO,
                discovery: Step::Succeed,
                discovery_delay: Duration::ZERO,
                rssi_script: VecDeque::new(),
                rssi_pattern: vec![-60],
                pattern_pos: 0,
                link: 0,
                connected: None,
                disconnect_tx: None,
                discovering: false,
            })),
            counters: Arc::new(Counters::default()),
        }
    }

    /// A beacon named `name` that shows up two seconds into a scan and
    /// drifts between near and far while connected.
    #[must_use]
    pub fn demo(name: &str) -> Self {
        Self::new()
            .with_advertisement(
                Duration::from_secs(1),
                DiscoveredDevice {
                    id: DeviceId::new("3C:71:BF:00:00:01"),
                    name: Some("Kitchen-Speaker".into()),
                    rssi: Some(-82),
                },
            )
            .with_beacon(Duration::from_secs(2), "24:6F:28:00:00:01", name)
            .with_connect_delay(Duration::from_millis(300))
            .with_discovery_delay(Duration::from_millis(200))
            .with_rssi_pattern(vec![-48, -55, -61, -67, -72, -79, -74, -66, -58, -51])
    }

    /// Advertise `device` once, `after` the scan starts.
    #[must_use]
    pub fn with_advertisement(self, after: Duration, device: DiscoveredDevice) -> Self {
        self.lock().advertisements.push((after, device));
        self
    }

    /// Advertise a named beacon once, `after` the scan starts.
    #[must_use]
    pub fn with_beacon(self, after: Duration, id: &str, name: &str) -> Self {
        self.with_advertisement(
            after,
            DiscoveredDevice {
                id: DeviceId::new(id),
                name: Some(name.to_string()),
                rssi: Some(-60),
            },
        )
    }

    /// Make `discover` fail.
    #[must_use]
    pub fn with_scan_failure(self, message: &str) -> Self {
        self.lock().scan_failure = Some(message.to_string());
        self
    }

    /// Script the connect outcome.
    #[must_use]
    pub fn with_connect(self, step: Step) -> Self {
        self.lock().connect = step;
        self
    }

    /// Delay before the connect outcome.
    #[must_use]
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.lock().connect_delay = delay;
        self
    }

    /// Script the service discovery outcome.
    #[must_use]
    pub fn with_discovery(self, step: Step) -> Self {
        self.lock().discovery = step;
        self
    }

    /// Delay before the service discovery outcome.
    #[must_use]
    pub fn with_discovery_delay(self, delay: Duration) -> Self {
        self.lock().discovery_delay = delay;
        self
    }

    /// Readings served in order before falling back to the pattern.
    #[must_use]
    pub fn with_rssi_script<I>(self, readings: I) -> Self
    where
        I: IntoIterator<Item = Result<i16, String>>,
    {
        self.lock().rssi_script.extend(readings);
        self
    }

    /// Readings served round-robin once the script is exhausted.
    #[must_use]
    pub fn with_rssi_pattern(self, pattern: Vec<i16>) -> Self {
        if !pattern.is_empty() {
            let mut state = self.lock();
            state.rssi_pattern = pattern;
            state.pattern_pos = 0;
        }
        self
    }

    /// Change the connect outcome of later attempts.
    pub fn set_connect(&self, step: Step) {
        self.lock().connect = step;
    }

    /// Drop the live link, firing its disconnect notification.
    ///
    /// Returns `false` if nothing was connected.
    pub fn trigger_disconnect(&self) -> bool {
        let mut state = self.lock();
        state.connected = None;
        match state.disconnect_tx.take() {
            Some(tx) => {
                debug!("simulated link loss");
                tx.send(()).is_ok()
            }
            None => false,
        }
    }

    /// Number of `discover` calls.
    #[must_use]
    pub fn discover_calls(&self) -> usize {
        self.counters.discover.load(Ordering::SeqCst)
    }

    /// Number of `connect` calls.
    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.counters.connect.load(Ordering::SeqCst)
    }

    /// Number of RSSI reads.
    #[must_use]
    pub fn read_calls(&self) -> usize {
        self.counters.reads.load(Ordering::SeqCst)
    }

    /// Number of `disconnect` calls.
    #[must_use]
    pub fn disconnect_calls(&self) -> usize {
        self.counters.disconnect.load(Ordering::SeqCst)
    }

    /// Returns `true` while an advertisement stream is open.
    #[must_use]
    pub fn is_discovering(&self) -> bool {
        self.lock().discovering
    }

    /// Returns `true` while a simulated link is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock().connected.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_rssi(&self) -> Result<i16, String> {
        let mut state = self.lock();
        if let Some(reading) = state.rssi_script.pop_front() {
            return reading;
        }
        let pos = state.pattern_pos % state.rssi_pattern.len();
        state.pattern_pos = pos + 1;
        Ok(state.rssi_pattern[pos])
    }
}

async fn play_step(step: Step, delay: Duration) -> Result<(), String> {
    if step == Step::Hang {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(delay).await;
    match step {
        Step::Fail(message) => Err(message),
        Step::Succeed | Step::Hang => Ok(()),
    }
}

impl Transport for SimulatedTransport {
    type Handle = SimHandle;

    async fn discover(&self) -> TransportResult<mpsc::Receiver<DiscoveredDevice>> {
        self.counters.discover.fetch_add(1, Ordering::SeqCst);

        let mut timeline = {
            let mut state = self.lock();
            if let Some(message) = state.scan_failure.clone() {
                return Err(TransportError::ScanFailed { message });
            }
            state.discovering = true;
            state.advertisements.clone()
        };
        timeline.sort_by_key(|(after, _)| *after);

        let (tx, rx) = mpsc::channel(16);
        let state = Arc::clone(&self.state);
        let start = Instant::now();

        tokio::spawn(async move {
            for (after, device) in timeline {
                tokio::select! {
                    () = tx.closed() => break,
                    () = tokio::time::sleep_until(start + after) => {
                        if tx.send(device).await.is_err() {
                            break;
                        }
                    }
                }
            }
            tx.closed().await;
            state.lock().unwrap_or_else(PoisonError::into_inner).discovering = false;
        });

        Ok(rx)
    }

    async fn connect(&self, device: &DeviceId) -> TransportResult<SimHandle> {
        self.counters.connect.fetch_add(1, Ordering::SeqCst);
        let (step, delay) = {
            let state = self.lock();
            (state.connect.clone(), state.connect_delay)
        };

        play_step(step, delay)
            .await
            .map_err(|message| TransportError::ConnectFailed {
                device: device.clone(),
                message,
            })?;

        let mut state = self.lock();
        state.link += 1;
        state.connected = Some(state.link);
        Ok(SimHandle {
            device: device.clone(),
            link: state.link,
        })
    }

    async fn discover_services(&self, handle: &SimHandle) -> TransportResult<ServiceSummary> {
        let (step, delay) = {
            let state = self.lock();
            (state.discovery.clone(), state.discovery_delay)
        };

        play_step(step, delay)
            .await
            .map_err(|message| TransportError::DiscoveryFailed {
                device: handle.device.clone(),
                message,
            })?;

        Ok(ServiceSummary {
            services: 1,
            characteristics: 2,
        })
    }

    async fn read_signal_strength(&self, handle: &SimHandle) -> TransportResult<i16> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        if self.lock().connected != Some(handle.link) {
            return Err(TransportError::NotConnected);
        }
        self.next_rssi()
            .map_err(|message| TransportError::ReadFailed { message })
    }

    async fn on_disconnected(&self, handle: &SimHandle) -> TransportResult<oneshot::Receiver<()>> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();
        if state.connected != Some(handle.link) {
            return Err(TransportError::NotConnected);
        }
        state.disconnect_tx = Some(tx);
        Ok(rx)
    }

    async fn disconnect(&self, handle: &SimHandle) -> TransportResult<()> {
        self.counters.disconnect.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if state.connected == Some(handle.link) {
            state.connected = None;
            // A requested teardown is not a link loss: drop the sender unfired.
            state.disconnect_tx = None;
        }
        Ok(())
    }
}

/// Permission gate that refuses a fixed set of capabilities.
#[derive(Debug, Default)]
pub struct ScriptedPermissions {
    denied: Vec<Capability>,
    requests: AtomicUsize,
}

impl ScriptedPermissions {
    /// Grant everything.
    #[must_use]
    pub fn granting() -> Self {
        Self::default()
    }

    /// Refuse `denied`, grant the rest.
    #[must_use]
    pub fn denying(denied: &[Capability]) -> Self {
        Self {
            denied: denied.to_vec(),
            requests: AtomicUsize::new(0),
        }
    }

    /// Number of times permissions were requested.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PermissionGate for ScriptedPermissions {
    async fn request(&self, capabilities: &[Capability]) -> PermissionReport {
        self.requests.fetch_add(1, Ordering::SeqCst);
        capabilities
            .iter()
            .map(|cap| (*cap, !self.denied.contains(cap)))
            .collect()
    }
}
