//! Pairing session.
//!
//! Binds the selected tracked object to one connection for the lifetime of a
//! pairing flow and composes the scan controller, connection manager and
//! RSSI sampler into it:
//!
//! - `Scanning -> Found` connects automatically.
//! - Entering `Monitoring` starts the sampler; leaving it stops the sampler.
//! - Losing the link surfaces a [`SessionEvent::Disconnected`] notice. The
//!   session never reconnects by itself; the caller decides.
//! - [`PairingSession::end`] forces a disconnect so nothing outlives the session.
//!
//! Consumers observe the session through [`SessionEvent`]s, the sample stream
//! and [`PairingSession::status`]; they change it only through its methods.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::config::Config;
use crate::connection::{Connection, ConnectionManager};
use crate::error::{Result, SearchItError};
use crate::permissions::PermissionGate;
use crate::proximity::{ProximitySample, ProximityThresholds};
use crate::radio::Radio;
use crate::registry::ObjectRegistry;
use crate::sampler::{self, SampleFeed, SamplerHandle};
use crate::scan::{ScanController, ScanOutcome};
use crate::transport::Transport;
use crate::types::{ConnectionState, DeviceId, DiscoveredDevice, ScanState, TrackedObject};

const EVENT_CAPACITY: usize = 64;
const SAMPLE_CAPACITY: usize = 64;

/// Tunables for one pairing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Exact advertised beacon name.
    pub target_name: String,
    /// How long a scan may run.
    pub scan_timeout: Duration,
    /// Time between RSSI reads while monitoring.
    pub sample_interval: Duration,
    /// Classifier thresholds.
    pub thresholds: ProximityThresholds,
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            target_name: config.beacon.name.clone(),
            scan_timeout: config.beacon.scan_timeout(),
            sample_interval: config.sampler.interval(),
            thresholds: config.proximity.thresholds(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectCause {
    /// The owner asked for it.
    Requested,
    /// The transport reported the link gone.
    LinkLost,
}

/// Something the presentation layer should know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A scan began for the selected object.
    ScanStarted {
        /// The object being paired.
        object: TrackedObject,
    },
    /// The beacon was found.
    DeviceFound {
        /// The accepted advertisement.
        device: DiscoveredDevice,
    },
    /// No beacon within the timeout.
    ScanTimedOut {
        /// The elapsed timeout.
        timeout_secs: u64,
    },
    /// The scan was cancelled.
    ScanCancelled,
    /// Radio permissions were refused.
    PermissionDenied {
        /// Refused capabilities.
        message: String,
    },
    /// Discovery could not run.
    ScanFailed {
        /// Failure description.
        message: String,
    },
    /// A connect or reconnect began.
    Connecting {
        /// Target device.
        device_id: DeviceId,
    },
    /// The beacon is connected and being monitored.
    Paired {
        /// Connected device.
        device_id: DeviceId,
    },
    /// Connect or service discovery failed.
    ConnectionFailed {
        /// Failure description.
        message: String,
    },
    /// The connection ended. Reconnecting is up to the caller.
    Disconnected {
        /// Why it ended.
        cause: DisconnectCause,
    },
    /// The session was ended.
    Ended,
}

/// What a successful [`PairingSession::start_scan`] led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// The beacon is connected and monitored.
    Paired(Connection),
    /// The scan was cancelled, or the link closed before pairing completed.
    Cancelled,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SessionStatus {
    /// The object bound to the connection.
    pub object: Option<TrackedObject>,
    /// Scan controller state.
    pub scan: ScanState,
    /// Connection state.
    pub connection_state: ConnectionState,
    /// Connection details, once a device was bound.
    pub connection: Option<Connection>,
    /// Latest proximity reading.
    pub latest_sample: Option<ProximitySample>,
    /// Whether the sampler loop is running.
    pub sampling: bool,
    /// Whether the session was ended.
    pub ended: bool,
}

type SamplerSlot = Arc<Mutex<Option<SamplerHandle>>>;

/// One pairing flow: scan, connect, monitor, disconnect, reconnect.
pub struct PairingSession<T: Transport, P: PermissionGate> {
    config: SessionConfig,
    registry: Arc<dyn ObjectRegistry>,
    scanner: ScanController<T, P>,
    connection: Arc<ConnectionManager<T>>,
    events: broadcast::Sender<SessionEvent>,
    samples: SampleFeed,
    sampler: SamplerSlot,
    bound: Mutex<Option<TrackedObject>>,
    ended: AtomicBool,
    supervisor: CancellationToken,
}

impl<T: Transport, P: PermissionGate> PairingSession<T, P> {
    /// Create a session on the shared radio.
    ///
    /// Spawns the task that starts and stops the sampler, so this must be
    /// called from within a tokio runtime.
    pub fn new(
        config: SessionConfig,
        radio: Radio<T>,
        permissions: P,
        registry: Arc<dyn ObjectRegistry>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let session = Self {
            scanner: ScanController::new(radio.clone(), permissions, Arc::clone(&registry)),
            connection: Arc::new(ConnectionManager::new(radio)),
            registry,
            events,
            samples: SampleFeed::new(SAMPLE_CAPACITY),
            sampler: Arc::new(Mutex::new(None)),
            bound: Mutex::new(None),
            ended: AtomicBool::new(false),
            supervisor: CancellationToken::new(),
            config,
        };

        tokio::spawn(supervise(Supervisor {
            connection: Arc::clone(&session.connection),
            states: session.connection.subscribe(),
            lost: session.connection.subscribe_link_loss(),
            events: session.events.clone(),
            samples: session.samples.clone(),
            sampler: Arc::clone(&session.sampler),
            interval: session.config.sample_interval,
            thresholds: session.config.thresholds,
            token: session.supervisor.clone(),
        }));

        session
    }

    /// Check that a scan could start now, without starting one.
    ///
    /// # Errors
    ///
    /// - [`SearchItError::InvalidState`] if the session has ended
    /// - [`SearchItError::Precondition`] if no object is selected or a
    ///   connection is already active
    /// - [`SearchItError::Conflict`] if a scan is running
    pub fn ensure_ready_to_scan(&self) -> Result<()> {
        self.ensure_open("start a scan")?;
        if self.registry.selected_object().is_none() {
            return Err(SearchItError::Precondition(
                "select an object before scanning".into(),
            ));
        }
        let state = self.connection.state();
        if state.is_active() {
            return Err(SearchItError::Precondition(format!(
                "a beacon connection is already {state}"
            )));
        }
        if self.scanner.is_scanning() {
            return Err(SearchItError::Conflict("scan already in progress".into()));
        }
        Ok(())
    }

    /// Scan for the beacon and, on a match, connect to it.
    ///
    /// # Errors
    ///
    /// Any error of [`Self::ensure_ready_to_scan`], or the scan or connection
    /// failure. Each failure is also published as a [`SessionEvent`].
    pub async fn start_scan(&self) -> Result<PairingOutcome> {
        self.ensure_ready_to_scan()?;
        let object = self
            .registry
            .selected_object()
            .ok_or_else(|| SearchItError::Precondition("select an object before scanning".into()))?;
        self.emit(SessionEvent::ScanStarted {
            object: object.clone(),
        });

        let scanned = self
            .scanner
            .start_scan(&self.config.target_name, self.config.scan_timeout)
            .await;
        let device = match scanned {
            Ok(ScanOutcome::Found(device)) => device,
            Ok(ScanOutcome::Cancelled) => {
                self.emit(SessionEvent::ScanCancelled);
                return Ok(PairingOutcome::Cancelled);
            }
            Err(e) => {
                if let Some(event) = scan_failure_event(&e) {
                    self.emit(event);
                }
                return Err(e);
            }
        };
        self.emit(SessionEvent::DeviceFound {
            device: device.clone(),
        });

        if self.is_ended() {
            return Ok(PairingOutcome::Cancelled);
        }
        *self.bound() = Some(object);

        self.emit(SessionEvent::Connecting {
            device_id: device.id.clone(),
        });
        let connected = self.connection.connect(device.id.clone()).await;
        self.finish_connect(connected)
            .map(|connection| connection.map_or(PairingOutcome::Cancelled, PairingOutcome::Paired))
    }

    /// Stop a running scan. Idempotent.
    pub fn cancel_scan(&self) -> bool {
        self.scanner.cancel_scan()
    }

    /// Reconnect to the last paired beacon after a disconnect.
    ///
    /// # Errors
    ///
    /// Returns [`SearchItError::InvalidState`], with no side effects, unless
    /// the connection is `Disconnected` with a known device; otherwise the
    /// connection failure.
    pub async fn reconnect(&self) -> Result<Connection> {
        self.ensure_open("reconnect")?;
        let device_id = match self.connection.snapshot() {
            Some(c) if c.state == ConnectionState::Disconnected => c.device_id,
            Some(c) => {
                return Err(SearchItError::InvalidState {
                    operation: "reconnect",
                    state: c.state.to_string(),
                })
            }
            None => {
                return Err(SearchItError::InvalidState {
                    operation: "reconnect",
                    state: "no device bound".into(),
                })
            }
        };

        self.emit(SessionEvent::Connecting { device_id });
        let connected = self.connection.reconnect().await;
        self.finish_connect(connected)?
            .ok_or_else(|| SearchItError::Connection("link closed during reconnect".into()))
    }

    /// Disconnect the beacon. Always legal; always ends in `Disconnected`.
    pub async fn disconnect(&self) {
        let was = self.connection.state();
        self.stop_sampler();
        self.connection.disconnect().await;

        if was.is_active() {
            self.emit(SessionEvent::Disconnected {
                cause: DisconnectCause::Requested,
            });
        }
    }

    /// End the session: cancel any scan, force a disconnect, stop all tasks.
    ///
    /// Idempotent. Every later operation fails with [`SearchItError::InvalidState`].
    pub async fn end(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        self.scanner.cancel_scan();
        self.disconnect().await;
        self.supervisor.cancel();
        *self.bound() = None;
        info!("pairing session ended");
        self.emit(SessionEvent::Ended);
    }

    /// Receive session events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Receive proximity samples published from now on.
    #[must_use]
    pub fn subscribe_samples(&self) -> broadcast::Receiver<ProximitySample> {
        self.samples.subscribe()
    }

    /// Watch connection state changes.
    #[must_use]
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    /// Snapshot of everything observable about the session.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            object: self.bound().clone(),
            scan: self.scanner.state(),
            connection_state: self.connection.state(),
            connection: self.connection.snapshot(),
            latest_sample: self.samples.latest(),
            sampling: self
                .sampler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .is_some_and(|s| !s.is_finished()),
            ended: self.is_ended(),
        }
    }

    /// Returns `true` once [`Self::end`] was called.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Session tunables.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn finish_connect(&self, connected: Result<()>) -> Result<Option<Connection>> {
        match connected {
            Ok(()) => {
                let connection = self.connection.snapshot();
                if let Some(c) = &connection {
                    self.emit(SessionEvent::Paired {
                        device_id: c.device_id.clone(),
                    });
                }
                Ok(connection)
            }
            // Interrupted by a disconnect, which has its own notice.
            Err(SearchItError::Connection(_))
                if self.connection.state() == ConnectionState::Disconnected =>
            {
                Ok(None)
            }
            Err(e) => {
                if self.connection.state() == ConnectionState::Failed {
                    self.emit(SessionEvent::ConnectionFailed {
                        message: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.is_ended() {
            return Err(SearchItError::InvalidState {
                operation,
                state: "the session has ended".into(),
            });
        }
        Ok(())
    }

    fn stop_sampler(&self) {
        if let Some(handle) = self
            .sampler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.stop();
        }
    }

    fn emit(&self, event: SessionEvent) {
        debug!(?event, "session event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn bound(&self) -> MutexGuard<'_, Option<TrackedObject>> {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Transport, P: PermissionGate> Drop for PairingSession<T, P> {
    fn drop(&mut self) {
        self.supervisor.cancel();
        self.scanner.cancel_scan();
    }
}

fn scan_failure_event(error: &SearchItError) -> Option<SessionEvent> {
    match error {
        SearchItError::ScanTimeout { timeout_secs } => Some(SessionEvent::ScanTimedOut {
            timeout_secs: *timeout_secs,
        }),
        SearchItError::PermissionDenied(message) => Some(SessionEvent::PermissionDenied {
            message: message.clone(),
        }),
        SearchItError::ScanFailed(message) | SearchItError::BluetoothUnavailable(message) => {
            Some(SessionEvent::ScanFailed {
                message: message.clone(),
            })
        }
        _ => None,
    }
}

struct Supervisor<T: Transport> {
    connection: Arc<ConnectionManager<T>>,
    states: watch::Receiver<ConnectionState>,
    lost: broadcast::Receiver<DeviceId>,
    events: broadcast::Sender<SessionEvent>,
    samples: SampleFeed,
    sampler: SamplerSlot,
    interval: Duration,
    thresholds: ProximityThresholds,
    token: CancellationToken,
}

/// Keeps the sampler in step with the connection and reports link loss.
async fn supervise<T: Transport>(mut s: Supervisor<T>) {
    loop {
        tokio::select! {
            biased;
            () = s.token.cancelled() => break,
            lost = s.lost.recv() => {
                match lost {
                    Ok(device) => {
                        warn!(%device, "beacon disconnected");
                        let _ = s.events.send(SessionEvent::Disconnected {
                            cause: DisconnectCause::LinkLost,
                        });
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "link loss notices dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
                continue;
            }
            changed = s.states.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        // Intermediate states may be skipped; only the latest one counts.
        let current = *s.states.borrow_and_update();
        let mut slot = s.sampler.lock().unwrap_or_else(PoisonError::into_inner);
        if current == ConnectionState::Monitoring {
            if !slot.as_ref().is_some_and(|h| !h.is_finished()) {
                *slot = Some(sampler::spawn(
                    Arc::clone(&s.connection),
                    s.interval,
                    s.thresholds,
                    s.samples.clone(),
                ));
            }
        } else if let Some(old) = slot.take() {
            old.stop();
        }
    }

    if let Some(handle) = s
        .sampler
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
    {
        handle.stop();
    }
    debug!("session supervisor stopped");
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::Instant;

    use super::*;
    use crate::error::ErrorKind;
    use crate::permissions::AlwaysGranted;
    use crate::proximity::ProximityLabel;
    use crate::registry::{ObjectStore, DEFAULT_MAX_OBJECTS};
    use crate::sim::{SimulatedTransport, Step};

    const BEACON: &str = "ESP32-Locator";

    type Session = PairingSession<SimulatedTransport, AlwaysGranted>;

    struct Fixture {
        session: Session,
        sim: SimulatedTransport,
        store: Arc<ObjectStore>,
        object: TrackedObject,
    }

    fn fixture(sim: SimulatedTransport) -> Fixture {
        let store = Arc::new(ObjectStore::in_memory(DEFAULT_MAX_OBJECTS));
        let object = store.add("Keys", "hallway shelf").unwrap();
        store.select(object.id).unwrap();

        let session = PairingSession::new(
            SessionConfig {
                target_name: BEACON.into(),
                scan_timeout: Duration::from_secs(10),
                sample_interval: Duration::from_secs(1),
                thresholds: ProximityThresholds::DEFAULT,
            },
            Radio::new(sim.clone()),
            AlwaysGranted,
            Arc::clone(&store) as Arc<dyn ObjectRegistry>,
        );
        Fixture {
            session,
            sim,
            store,
            object,
        }
    }

    fn beacon_at(secs: u64) -> SimulatedTransport {
        SimulatedTransport::new()
            .with_beacon(Duration::from_secs(1), "11:22", "Headphones")
            .with_beacon(Duration::from_secs(secs), "24:6F:28:AA:BB:CC", BEACON)
            .with_rssi_pattern(vec![-45, -58, -70, -82])
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn drain<E: Clone>(rx: &mut broadcast::Receiver<E>) -> Vec<E> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_pairing() {
        let f = fixture(beacon_at(3));
        let mut events = f.session.subscribe();
        let mut samples = f.session.subscribe_samples();
        let start = Instant::now();

        let outcome = f.session.start_scan().await.unwrap();
        let PairingOutcome::Paired(connection) = outcome else {
            panic!("expected a pairing");
        };
        assert_eq!(connection.state, ConnectionState::Monitoring);
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(4));

        let labels: Vec<ProximityLabel> = [
            samples.recv().await.unwrap(),
            samples.recv().await.unwrap(),
            samples.recv().await.unwrap(),
        ]
        .iter()
        .map(|s| s.label)
        .collect();
        assert_eq!(
            labels,
            vec![ProximityLabel::VeryNear, ProximityLabel::Near, ProximityLabel::Far]
        );
        assert!(f.session.status().sampling);

        tokio::time::sleep_until(start + Duration::from_secs(40)).await;
        assert!(f.sim.trigger_disconnect());
        settle().await;

        let status = f.session.status();
        assert_eq!(status.connection_state, ConnectionState::Disconnected);
        assert!(!status.sampling);
        assert_eq!(status.object.map(|o| o.id), Some(f.object.id));

        drain(&mut samples);
        let reads = f.sim.read_calls();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.sim.read_calls(), reads);
        assert!(matches!(samples.try_recv(), Err(TryRecvError::Empty)));

        let events = drain(&mut events);
        assert!(matches!(events[0], SessionEvent::ScanStarted { .. }));
        assert!(matches!(events[1], SessionEvent::DeviceFound { .. }));
        assert!(matches!(events[2], SessionEvent::Connecting { .. }));
        assert!(matches!(events[3], SessionEvent::Paired { .. }));
        assert_eq!(
            events[4],
            SessionEvent::Disconnected {
                cause: DisconnectCause::LinkLost
            }
        );
        assert_eq!(events.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_selection_is_precondition() {
        let f = fixture(beacon_at(3));
        f.store.clear_selection();

        let err = f.session.start_scan().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(f.sim.discover_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_reported() {
        let f = fixture(SimulatedTransport::new());
        let mut events = f.session.subscribe();

        let err = f.session.start_scan().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScanTimeout);
        assert_eq!(f.session.status().scan, ScanState::TimedOut);
        assert_eq!(f.session.status().connection_state, ConnectionState::Disconnected);

        let events = drain(&mut events);
        assert_eq!(
            events.last(),
            Some(&SessionEvent::ScanTimedOut { timeout_secs: 10 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failure_is_reported() {
        let f = fixture(beacon_at(2).with_connect(Step::Fail("refused".into())));
        let mut events = f.session.subscribe();

        let err = f.session.start_scan().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(f.session.status().connection_state, ConnectionState::Failed);
        assert!(matches!(
            drain(&mut events).last(),
            Some(SessionEvent::ConnectionFailed { .. })
        ));

        // A failed pairing does not block the next scan.
        f.sim.set_connect(Step::Succeed);
        let outcome = f.session.start_scan().await.unwrap();
        assert!(matches!(outcome, PairingOutcome::Paired(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_while_paired_is_precondition() {
        let f = fixture(beacon_at(1));
        f.session.start_scan().await.unwrap();

        let err = f.session.start_scan().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(f.sim.discover_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_link_loss() {
        let f = fixture(beacon_at(1));
        f.session.start_scan().await.unwrap();

        let err = f.session.reconnect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(f.sim.connect_calls(), 1);

        f.sim.trigger_disconnect();
        settle().await;
        assert_eq!(f.session.status().connection_state, ConnectionState::Disconnected);

        let connection = f.session.reconnect().await.unwrap();
        assert_eq!(connection.state, ConnectionState::Monitoring);
        assert_eq!(connection.device_id, DeviceId::new("24:6F:28:AA:BB:CC"));
        assert_eq!(f.sim.connect_calls(), 2);

        let mut samples = f.session.subscribe_samples();
        samples.recv().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_requested_disconnect_notice() {
        let f = fixture(beacon_at(1));
        f.session.start_scan().await.unwrap();
        let mut events = f.session.subscribe();

        f.session.disconnect().await;
        settle().await;

        assert_eq!(
            drain(&mut events),
            vec![SessionEvent::Disconnected {
                cause: DisconnectCause::Requested
            }]
        );
        assert!(!f.session.status().sampling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_after_quick_reconnect() {
        let f = fixture(beacon_at(1).with_connect_delay(Duration::from_millis(100)));
        f.session.start_scan().await.unwrap();
        let mut events = f.session.subscribe();

        f.session.disconnect().await;
        f.session.reconnect().await.unwrap();
        drain(&mut events);

        assert!(f.sim.trigger_disconnect());
        settle().await;

        assert_eq!(f.session.status().connection_state, ConnectionState::Disconnected);
        assert_eq!(
            drain(&mut events),
            vec![SessionEvent::Disconnected {
                cause: DisconnectCause::LinkLost
            }]
        );
        assert!(!f.session.status().sampling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampling_resumes_after_immediate_reconnect() {
        let f = fixture(beacon_at(1));
        f.session.start_scan().await.unwrap();

        f.session.disconnect().await;
        f.session.reconnect().await.unwrap();
        settle().await;

        assert!(f.session.status().sampling);
        let mut samples = f.session.subscribe_samples();
        samples.recv().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_scan() {
        let f = Arc::new(fixture(SimulatedTransport::new()));
        let scan = tokio::spawn({
            let f = Arc::clone(&f);
            async move { f.session.start_scan().await }
        });
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert!(f.session.cancel_scan());
        assert_eq!(scan.await.unwrap().unwrap(), PairingOutcome::Cancelled);
        assert_eq!(f.session.status().scan, ScanState::Idle);
        assert!(!f.session.cancel_scan());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_forces_disconnect() {
        let f = fixture(beacon_at(1));
        f.session.start_scan().await.unwrap();
        let mut events = f.session.subscribe();

        f.session.end().await;
        f.session.end().await;
        settle().await;

        assert!(!f.sim.is_connected());
        assert_eq!(f.sim.disconnect_calls(), 1);
        let status = f.session.status();
        assert!(status.ended);
        assert!(!status.sampling);
        assert!(status.object.is_none());
        assert_eq!(drain(&mut events).last(), Some(&SessionEvent::Ended));

        let err = f.session.start_scan().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = f.session.reconnect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rename_does_not_touch_bound_object() {
        let f = fixture(beacon_at(1));
        f.session.start_scan().await.unwrap();

        f.store
            .update(f.object.id, "Car keys", "hallway shelf")
            .unwrap();
        assert_eq!(f.session.status().object.unwrap().name, "Keys");
    }
}
