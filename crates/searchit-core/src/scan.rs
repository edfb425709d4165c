//! Scan controller.
//!
//! Runs one time-bounded discovery at a time, filtered by exact advertised
//! name, and accepts the first match. State moves
//! `Idle -> Scanning -> {Found, TimedOut, PermissionDenied, Error}` and is
//! published on a watch channel; the next scan starts over from `Scanning`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, SearchItError};
use crate::permissions::PermissionGate;
use crate::radio::{Radio, RadioUse};
use crate::registry::ObjectRegistry;
use crate::transport::Transport;
use crate::types::{Capability, DiscoveredDevice, ScanState};

/// How a scan that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The first advertisement with the target name.
    Found(DiscoveredDevice),
    /// [`ScanController::cancel_scan`] was called.
    Cancelled,
}

enum Ending {
    Found(DiscoveredDevice),
    Cancelled,
    TimedOut,
    StreamClosed,
}

/// Drives device discovery against the shared radio.
pub struct ScanController<T: Transport, P: PermissionGate> {
    radio: Radio<T>,
    permissions: P,
    registry: Arc<dyn ObjectRegistry>,
    state: watch::Sender<ScanState>,
    active: Mutex<Option<CancellationToken>>,
}

impl<T: Transport, P: PermissionGate> ScanController<T, P> {
    /// Create an idle controller.
    pub fn new(radio: Radio<T>, permissions: P, registry: Arc<dyn ObjectRegistry>) -> Self {
        Self {
            radio,
            permissions,
            registry,
            state: watch::Sender::new(ScanState::Idle),
            active: Mutex::new(None),
        }
    }

    /// Scan for a device advertising exactly `target` for at most `timeout`.
    ///
    /// Discovery stops as soon as the first match arrives; later
    /// advertisements are never looked at.
    ///
    /// # Errors
    ///
    /// - [`SearchItError::Conflict`] if this controller is already scanning or
    ///   the radio is held elsewhere
    /// - [`SearchItError::Precondition`] if no object is selected; no radio
    ///   operation is performed
    /// - [`SearchItError::PermissionDenied`] if any capability is refused
    /// - [`SearchItError::ScanTimeout`] if nothing matched in time
    /// - [`SearchItError::ScanFailed`] if discovery could not run
    pub async fn start_scan(&self, target: &str, timeout: Duration) -> Result<ScanOutcome> {
        let token = CancellationToken::new();
        let _slot = self.claim_slot(&token)?;

        if self.registry.selected_object().is_none() {
            return Err(SearchItError::Precondition(
                "select an object before scanning".into(),
            ));
        }
        let _lease = self.radio.try_acquire(RadioUse::Scan)?;

        self.state.send_replace(ScanState::Scanning);
        info!(target, timeout_secs = timeout.as_secs(), "scan started");

        let report = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(self.cancelled()),
            report = self.permissions.request(&Capability::REQUIRED) => report,
        };
        if !report.is_granted() {
            let denied: Vec<String> = report.denied().iter().map(ToString::to_string).collect();
            let denied = denied.join(", ");
            warn!(%denied, "scan refused: permissions denied");
            self.state.send_replace(ScanState::PermissionDenied);
            return Err(SearchItError::PermissionDenied(denied));
        }

        let mut adverts = match self.radio.transport().discover().await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "discovery failed to start");
                self.state.send_replace(ScanState::Error {
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let ending = loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break Ending::Cancelled,
                () = &mut deadline => break Ending::TimedOut,
                advert = adverts.recv() => match advert {
                    Some(device) if device.matches_name(target) => break Ending::Found(device),
                    Some(device) => trace!(id = %device.id, name = ?device.name, "ignoring advertisement"),
                    None => break Ending::StreamClosed,
                },
            }
        };
        // Dropping the receiver stops discovery.
        drop(adverts);

        match ending {
            Ending::Found(device) => {
                info!(id = %device.id, rssi = ?device.rssi, "beacon found");
                self.state.send_replace(ScanState::Found {
                    device: device.clone(),
                });
                Ok(ScanOutcome::Found(device))
            }
            Ending::Cancelled => Ok(self.cancelled()),
            Ending::TimedOut => {
                info!(timeout_secs = timeout.as_secs(), "scan timed out");
                self.state.send_replace(ScanState::TimedOut);
                Err(SearchItError::ScanTimeout {
                    timeout_secs: timeout.as_secs(),
                })
            }
            Ending::StreamClosed => {
                let message = "advertisement stream ended unexpectedly".to_string();
                warn!("{message}");
                self.state.send_replace(ScanState::Error {
                    message: message.clone(),
                });
                Err(SearchItError::ScanFailed(message))
            }
        }
    }

    /// Stop the running scan, if any. Returns `true` if one was running.
    pub fn cancel_scan(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(token) = active.as_ref() else {
            return false;
        };
        debug!("scan cancellation requested");
        token.cancel();
        true
    }

    /// Returns `true` while a scan holds the controller.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ScanState {
        self.state.borrow().clone()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ScanState> {
        self.state.subscribe()
    }

    fn cancelled(&self) -> ScanOutcome {
        info!("scan cancelled");
        self.state.send_replace(ScanState::Idle);
        ScanOutcome::Cancelled
    }

    fn claim_slot(&self, token: &CancellationToken) -> Result<ActiveScan<'_>> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.is_some() {
            return Err(SearchItError::Conflict("scan already in progress".into()));
        }
        *active = Some(token.clone());
        Ok(ActiveScan {
            slot: &self.active,
            state: &self.state,
        })
    }
}

/// Frees the scan slot however `start_scan` exits, including when its future is dropped.
struct ActiveScan<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
    state: &'a watch::Sender<ScanState>,
}

impl Drop for ActiveScan<'_> {
    fn drop(&mut self) {
        if let Some(token) = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
        self.state.send_if_modified(|state| {
            let abandoned = state.is_scanning();
            if abandoned {
                *state = ScanState::Idle;
            }
            abandoned
        });
    }
}
