//! Application state shared across handlers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use searchit_core::{
    AlwaysGranted, Config, ObjectRegistry, ObjectStore, PairingSession, Radio, SessionConfig,
    SessionEvent, Storage,
};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::beacon::BeaconTransport;

/// How many session events the server remembers.
pub const EVENT_LOG_CAPACITY: usize = 100;

/// The pairing session type the server runs.
pub type Session = PairingSession<BeaconTransport, AlwaysGranted>;

/// State handed to every handler.
pub type SharedState = Arc<AppState>;

/// A session event with the time the server saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LoggedEvent {
    /// When the event was recorded.
    pub at: DateTime<Utc>,
    /// The event itself.
    pub event: SessionEvent,
}

/// Ring buffer of the most recent session events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<VecDeque<LoggedEvent>>>,
}

impl EventLog {
    /// Append an event, dropping the oldest beyond [`EVENT_LOG_CAPACITY`].
    pub fn record(&self, event: SessionEvent) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == EVENT_LOG_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(LoggedEvent {
            at: Utc::now(),
            event,
        });
    }

    /// Events in arrival order, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LoggedEvent> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// Shared application state.
pub struct AppState {
    config: Config,
    objects: Arc<ObjectStore>,
    session: Arc<Session>,
    events: EventLog,
    backend: &'static str,
}

impl AppState {
    /// Build state from configuration: open the object store and the radio.
    ///
    /// # Errors
    ///
    /// Returns an error if stored objects cannot be loaded or the Bluetooth
    /// adapter is unusable.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let storage = match &config.registry.data_dir {
            Some(dir) => Storage::new(dir.clone()),
            None => Storage::default_location()?,
        };
        let objects = Arc::new(ObjectStore::open(storage, config.registry.max_objects)?);
        let transport = BeaconTransport::from_config(&config).await?;
        Ok(Self::with_parts(config, objects, transport))
    }

    /// Assemble state from already-built parts.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn with_parts(config: Config, objects: Arc<ObjectStore>, transport: BeaconTransport) -> Self {
        let backend = transport.backend();
        let registry: Arc<dyn ObjectRegistry> = Arc::<ObjectStore>::clone(&objects);
        let session = Arc::new(PairingSession::new(
            SessionConfig::from(&config),
            Radio::new(transport),
            AlwaysGranted,
            registry,
        ));

        let events = EventLog::default();
        tokio::spawn(record_events(session.subscribe(), events.clone()));
        info!(backend, beacon = %config.beacon.name, "pairing session ready");

        Self {
            config,
            objects,
            session,
            events,
            backend,
        }
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The tracked-object registry.
    #[must_use]
    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// The pairing session.
    #[must_use]
    pub const fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Recent session events.
    #[must_use]
    pub const fn events(&self) -> &EventLog {
        &self.events
    }

    /// Which radio backend is in use.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        self.backend
    }
}

async fn record_events(mut rx: broadcast::Receiver<SessionEvent>, log: EventLog) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                debug!(?event, "session event");
                let ended = event == SessionEvent::Ended;
                log.record(event);
                if ended {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}
