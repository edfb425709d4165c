//! Connection manager.
//!
//! Owns the lifecycle of the one beacon connection:
//!
//! ```text
//! Disconnected -> Connecting -> Discovering -> Monitoring -> Disconnected
//!                     |              |
//!                     +--> Failed <--+
//! ```
//!
//! A connection attempt holds the radio lease from `Connecting` until it
//! reaches `Monitoring` or `Failed`. Link loss is edge-triggered by the
//! transport and wins any race with an in-flight step: every transition is
//! applied under one lock and tagged with the link's epoch, so a completion
//! from a link that has since gone away is discarded.
//!
//! Link loss is also announced on its own channel
//! ([`ConnectionManager::subscribe_link_loss`]); the state `watch` keeps only
//! the latest value and may skip a `Disconnected`.
//!
//! Nothing here reconnects on its own. [`ConnectionManager::reconnect`] is
//! an explicit request from the owner.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::error::{Result, SearchItError};
use crate::radio::{Radio, RadioLease, RadioUse};
use crate::transport::Transport;
use crate::types::{ConnectionState, DeviceId};

/// Snapshot of the managed connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Connection {
    /// The bound beacon.
    pub device_id: DeviceId,
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Most recent signal strength in dBm.
    pub last_rssi: Option<i16>,
    /// When `last_rssi` was read.
    pub last_sample_at: Option<DateTime<Utc>>,
    /// Whether [`ConnectionManager::reconnect`] would be accepted.
    pub reconnect_eligible: bool,
}

struct Inner<H> {
    connection: Option<Connection>,
    handle: Option<H>,
    /// Cancelled when the current link ends, for whatever reason.
    link: Option<CancellationToken>,
    epoch: u64,
}

impl<H> Inner<H> {
    fn state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map_or(ConnectionState::Disconnected, |c| c.state)
    }

    fn transition(&mut self, tx: &watch::Sender<ConnectionState>, next: ConnectionState) {
        if let Some(connection) = self.connection.as_mut() {
            debug!(
                device = %connection.device_id,
                from = %connection.state,
                to = %next,
                "connection state changed"
            );
            connection.state = next;
            connection.reconnect_eligible = next == ConnectionState::Disconnected;
        }
        tx.send_replace(next);
    }

    fn end_link(&mut self) -> Option<H> {
        if let Some(link) = self.link.take() {
            link.cancel();
        }
        self.handle.take()
    }
}

struct Attempt {
    device: DeviceId,
    link: CancellationToken,
    epoch: u64,
    lease: RadioLease,
}

/// State machine for the single beacon connection.
pub struct ConnectionManager<T: Transport> {
    radio: Radio<T>,
    inner: Arc<Mutex<Inner<T::Handle>>>,
    state: Arc<watch::Sender<ConnectionState>>,
    lost: broadcast::Sender<DeviceId>,
}

const LINK_LOSS_CAPACITY: usize = 8;

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager with no connection.
    pub fn new(radio: Radio<T>) -> Self {
        Self {
            radio,
            inner: Arc::new(Mutex::new(Inner {
                connection: None,
                handle: None,
                link: None,
                epoch: 0,
            })),
            state: Arc::new(watch::Sender::new(ConnectionState::Disconnected)),
            lost: broadcast::channel(LINK_LOSS_CAPACITY).0,
        }
    }

    /// Connect to a device handed over by the scan controller and bring it to `Monitoring`.
    ///
    /// Not retried on failure.
    ///
    /// # Errors
    ///
    /// - [`SearchItError::Conflict`] if an attempt is already in flight or the radio is busy
    /// - [`SearchItError::InvalidState`] if already monitoring
    /// - [`SearchItError::Connection`] if connect or service discovery fails, or
    ///   the link goes away before `Monitoring`
    pub async fn connect(&self, device: DeviceId) -> Result<()> {
        let attempt = self.begin("connect", Some(device))?;
        self.establish(attempt).await
    }

    /// Connect again to the last bound device.
    ///
    /// # Errors
    ///
    /// Returns [`SearchItError::InvalidState`], with no side effects, unless the
    /// connection is `Disconnected` with a known device; otherwise as [`Self::connect`].
    pub async fn reconnect(&self) -> Result<()> {
        let attempt = self.begin("reconnect", None)?;
        info!(device = %attempt.device, "reconnecting");
        self.establish(attempt).await
    }

    /// Tear down whatever exists. Always ends in `Disconnected`.
    ///
    /// Interrupts an in-flight attempt. Transport teardown errors are logged, not returned.
    pub async fn disconnect(&self) {
        let handle = {
            let mut inner = self.lock();
            inner.epoch += 1;
            let handle = inner.end_link();
            if inner.connection.is_some() && inner.state() != ConnectionState::Disconnected {
                inner.transition(&self.state, ConnectionState::Disconnected);
                info!("disconnected on request");
            }
            handle
        };

        if let Some(handle) = handle {
            if let Err(e) = self.radio.transport().disconnect(&handle).await {
                warn!(error = %e, "transport disconnect failed");
            }
        }
    }

    /// Read the live signal strength and record it on the connection.
    ///
    /// # Errors
    ///
    /// Returns [`SearchItError::InvalidState`] outside `Monitoring`, or
    /// [`SearchItError::Read`] if the transport read fails.
    pub async fn read_signal_strength(&self) -> Result<i16> {
        let (handle, epoch) = {
            let inner = self.lock();
            match (&inner.handle, inner.state()) {
                (Some(handle), ConnectionState::Monitoring) => (handle.clone(), inner.epoch),
                (_, state) => {
                    return Err(SearchItError::InvalidState {
                        operation: "read signal strength",
                        state: state.to_string(),
                    })
                }
            }
        };

        let rssi = self.radio.transport().read_signal_strength(&handle).await?;

        let mut inner = self.lock();
        if inner.epoch == epoch {
            if let Some(connection) = inner.connection.as_mut() {
                connection.last_rssi = Some(rssi);
                connection.last_sample_at = Some(Utc::now());
            }
        }
        Ok(rssi)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Receive the device of every link the transport reports lost.
    ///
    /// Requested disconnects are not reported here.
    #[must_use]
    pub fn subscribe_link_loss(&self) -> broadcast::Receiver<DeviceId> {
        self.lost.subscribe()
    }

    /// Copy of the connection, if a device has been bound.
    #[must_use]
    pub fn snapshot(&self) -> Option<Connection> {
        self.lock().connection.clone()
    }

    fn begin(&self, operation: &'static str, device: Option<DeviceId>) -> Result<Attempt> {
        let mut inner = self.lock();
        let state = inner.state();

        let device = match device {
            Some(device) => {
                match state {
                    ConnectionState::Connecting | ConnectionState::Discovering => {
                        return Err(SearchItError::Conflict(
                            "connection attempt already in progress".into(),
                        ))
                    }
                    ConnectionState::Monitoring => {
                        return Err(SearchItError::InvalidState {
                            operation,
                            state: state.to_string(),
                        })
                    }
                    ConnectionState::Disconnected | ConnectionState::Failed => {}
                }
                device
            }
            None => match &inner.connection {
                Some(c) if c.state == ConnectionState::Disconnected => c.device_id.clone(),
                Some(c) => {
                    return Err(SearchItError::InvalidState {
                        operation,
                        state: c.state.to_string(),
                    })
                }
                None => {
                    return Err(SearchItError::InvalidState {
                        operation,
                        state: "no device bound".into(),
                    })
                }
            },
        };

        let lease = self.radio.try_acquire(RadioUse::Connect)?;

        inner.epoch += 1;
        let link = CancellationToken::new();
        inner.link = Some(link.clone());
        inner.handle = None;
        inner.connection = Some(Connection {
            device_id: device.clone(),
            state: ConnectionState::Connecting,
            last_rssi: None,
            last_sample_at: None,
            reconnect_eligible: false,
        });
        inner.transition(&self.state, ConnectionState::Connecting);

        Ok(Attempt {
            device,
            link,
            epoch: inner.epoch,
            lease,
        })
    }

    async fn establish(&self, attempt: Attempt) -> Result<()> {
        let Attempt {
            device,
            link,
            epoch,
            lease,
        } = attempt;
        let transport = self.radio.transport();
        info!(%device, "connecting");

        let handle = tokio::select! {
            biased;
            () = link.cancelled() => return Err(interrupted("connect")),
            result = transport.connect(&device) => match result {
                Ok(handle) => handle,
                Err(e) => return Err(self.fail(epoch, None, e.into()).await),
            },
        };

        let notice = match transport.on_disconnected(&handle).await {
            Ok(notice) => notice,
            Err(e) => return Err(self.fail(epoch, Some(handle), e.into()).await),
        };

        let superseded = {
            let mut inner = self.lock();
            let superseded = inner.epoch != epoch;
            if !superseded {
                inner.handle = Some(handle.clone());
                inner.transition(&self.state, ConnectionState::Discovering);
            }
            superseded
        };
        if superseded {
            self.teardown(&handle).await;
            return Err(interrupted("connect"));
        }
        self.watch_link(notice, link.clone(), epoch);

        let summary = tokio::select! {
            biased;
            () = link.cancelled() => return Err(interrupted("service discovery")),
            result = transport.discover_services(&handle) => match result {
                Ok(summary) => summary,
                Err(e) => return Err(self.fail(epoch, Some(handle), e.into()).await),
            },
        };

        {
            let mut inner = self.lock();
            if inner.epoch != epoch || inner.state() != ConnectionState::Discovering {
                return Err(interrupted("service discovery"));
            }
            inner.transition(&self.state, ConnectionState::Monitoring);
        }
        drop(lease);

        info!(
            %device,
            services = summary.services,
            characteristics = summary.characteristics,
            "beacon paired, monitoring"
        );
        Ok(())
    }

    async fn fail(
        &self,
        epoch: u64,
        handle: Option<T::Handle>,
        error: SearchItError,
    ) -> SearchItError {
        {
            let mut inner = self.lock();
            if inner.epoch == epoch {
                inner.end_link();
                inner.transition(&self.state, ConnectionState::Failed);
                warn!(error = %error, "connection attempt failed");
            }
        }
        if let Some(handle) = handle {
            self.teardown(&handle).await;
        }
        error
    }

    async fn teardown(&self, handle: &T::Handle) {
        if let Err(e) = self.radio.transport().disconnect(handle).await {
            warn!(error = %e, "transport disconnect failed");
        }
    }

    /// Apply the transport's disconnect notification for this link, if it ever fires.
    fn watch_link(&self, notice: oneshot::Receiver<()>, link: CancellationToken, epoch: u64) {
        let inner = Arc::clone(&self.inner);
        let state = Arc::clone(&self.state);
        let lost = self.lost.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = link.cancelled() => {}
                fired = notice => {
                    if fired.is_err() {
                        return;
                    }
                    let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                    if inner.epoch != epoch {
                        return;
                    }
                    let was = inner.state();
                    inner.end_link();
                    inner.transition(&state, ConnectionState::Disconnected);
                    info!(previous = %was, "beacon link lost");
                    if let Some(connection) = &inner.connection {
                        let _ = lost.send(connection.device_id.clone());
                    }
                }
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T::Handle>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn interrupted(step: &str) -> SearchItError {
    SearchItError::Connection(format!("link closed during {step}"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;
    use crate::sim::{SimulatedTransport, Step};

    type Manager = ConnectionManager<SimulatedTransport>;

    fn setup(sim: &SimulatedTransport) -> (Arc<Manager>, Radio<SimulatedTransport>) {
        let radio = Radio::new(sim.clone());
        (Arc::new(ConnectionManager::new(radio.clone())), radio)
    }

    fn beacon() -> DeviceId {
        DeviceId::new("24:6F:28:AA:BB:CC")
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_reaches_monitoring() {
        let sim = SimulatedTransport::new();
        let (manager, radio) = setup(&sim);

        manager.connect(beacon()).await.unwrap();

        assert_eq!(manager.state(), ConnectionState::Monitoring);
        let snapshot = manager.snapshot().unwrap();
        assert_eq!(snapshot.device_id, beacon());
        assert!(!snapshot.reconnect_eligible);
        assert!(!radio.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_is_terminal() {
        let sim = SimulatedTransport::new().with_connect(Step::Fail("out of range".into()));
        let (manager, radio) = setup(&sim);

        let err = manager.connect(beacon()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert_eq!(sim.connect_calls(), 1);
        assert!(!radio.is_busy());

        // Failed is not Disconnected: reconnect is refused.
        let err = manager.reconnect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(sim.connect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_failure_tears_down() {
        let sim = SimulatedTransport::new().with_discovery(Step::Fail("no services".into()));
        let (manager, _radio) = setup(&sim);

        let err = manager.connect(beacon()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert_eq!(sim.disconnect_calls(), 1);
        assert!(!sim.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_wins_over_discovery() {
        let sim = SimulatedTransport::new().with_discovery_delay(Duration::from_secs(5));
        let (manager, radio) = setup(&sim);

        let task = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.connect(beacon()).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(manager.state(), ConnectionState::Discovering);

        assert!(sim.trigger_disconnect());
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        assert!(task.await.unwrap().is_err());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.snapshot().unwrap().reconnect_eligible);
        assert!(!radio.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_while_monitoring() {
        let sim = SimulatedTransport::new();
        let (manager, _radio) = setup(&sim);
        manager.connect(beacon()).await.unwrap();

        let mut states = manager.subscribe();
        sim.trigger_disconnect();
        states.changed().await.unwrap();

        assert_eq!(*states.borrow(), ConnectionState::Disconnected);
        assert!(manager.snapshot().unwrap().reconnect_eligible);
        assert!(manager.read_signal_strength().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_link_loss_is_announced() {
        let sim = SimulatedTransport::new().with_connect_delay(Duration::from_millis(100));
        let (manager, _radio) = setup(&sim);
        let mut lost = manager.subscribe_link_loss();

        manager.connect(beacon()).await.unwrap();
        manager.disconnect().await;
        manager.reconnect().await.unwrap();
        assert!(lost.try_recv().is_err());

        assert!(sim.trigger_disconnect());
        settle().await;
        assert_eq!(lost.try_recv().unwrap(), beacon());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_only_from_disconnected() {
        let sim = SimulatedTransport::new();
        let (manager, _radio) = setup(&sim);

        let err = manager.reconnect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        manager.connect(beacon()).await.unwrap();
        let before = manager.snapshot();
        let err = manager.reconnect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(manager.snapshot(), before);
        assert_eq!(sim.connect_calls(), 1);

        manager.disconnect().await;
        manager.reconnect().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Monitoring);
        assert_eq!(manager.snapshot().unwrap().device_id, beacon());
        assert_eq!(sim.connect_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_interrupts_hung_connect() {
        let sim = SimulatedTransport::new().with_connect(Step::Hang);
        let (manager, radio) = setup(&sim);

        let task = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.connect(beacon()).await }
        });
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(radio.is_busy());

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(task.await.unwrap().is_err());
        assert!(!radio.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_attempt_at_a_time() {
        let sim = SimulatedTransport::new().with_connect_delay(Duration::from_secs(2));
        let (manager, _radio) = setup(&sim);

        let task = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.connect(beacon()).await }
        });
        settle().await;

        let err = manager.connect(beacon()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        task.await.unwrap().unwrap();
        let err = manager.connect(beacon()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_always_legal() {
        let sim = SimulatedTransport::new();
        let (manager, _radio) = setup(&sim);

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.snapshot().is_none());

        manager.connect(beacon()).await.unwrap();
        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(sim.disconnect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_are_recorded() {
        let sim = SimulatedTransport::new().with_rssi_script([Ok(-58)]);
        let (manager, _radio) = setup(&sim);

        let err = manager.read_signal_strength().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        manager.connect(beacon()).await.unwrap();
        assert_eq!(manager.read_signal_strength().await.unwrap(), -58);

        let snapshot = manager.snapshot().unwrap();
        assert_eq!(snapshot.last_rssi, Some(-58));
        assert!(snapshot.last_sample_at.is_some());
    }
}
