//! RSSI sampler.
//!
//! A periodic loop that reads signal strength from a `Monitoring` connection,
//! classifies it, and publishes a [`ProximitySample`]. A failed read is logged
//! and the tick skipped. The loop ends by itself as soon as the connection
//! leaves `Monitoring`, or when its owner stops it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::ConnectionManager;
use crate::proximity::{ProximitySample, ProximityThresholds};
use crate::transport::Transport;
use crate::types::ConnectionState;

/// Where samples go: a stream for live subscribers plus the latest value.
#[derive(Debug, Clone)]
pub struct SampleFeed {
    stream: broadcast::Sender<ProximitySample>,
    latest: Arc<watch::Sender<Option<ProximitySample>>>,
}

impl SampleFeed {
    /// A feed whose stream buffers up to `capacity` samples per slow subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (stream, _) = broadcast::channel(capacity);
        Self {
            stream,
            latest: Arc::new(watch::Sender::new(None)),
        }
    }

    /// Publish a sample, replacing the latest one.
    pub fn publish(&self, sample: ProximitySample) {
        self.latest.send_replace(Some(sample));
        // No subscribers is fine.
        let _ = self.stream.send(sample);
    }

    /// Forget the latest sample.
    pub fn clear(&self) {
        self.latest.send_replace(None);
    }

    /// Receive every sample published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProximitySample> {
        self.stream.subscribe()
    }

    /// The most recent sample, if any.
    #[must_use]
    pub fn latest(&self) -> Option<ProximitySample> {
        self.latest.borrow().clone()
    }
}

/// Running sampler loop. Dropping the handle stops the loop.
#[derive(Debug)]
pub struct SamplerHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl SamplerHandle {
    /// Ask the loop to stop. Any in-flight read is abandoned.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Err(e) = (&mut self.join).await {
            warn!(error = %e, "sampler task ended abnormally");
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Start sampling `manager` every `interval`.
///
/// Returns immediately; the loop runs on the tokio runtime.
pub fn spawn<T: Transport>(
    manager: Arc<ConnectionManager<T>>,
    interval: Duration,
    thresholds: ProximityThresholds,
    feed: SampleFeed,
) -> SamplerHandle {
    let token = CancellationToken::new();
    let join = tokio::spawn(run(manager, interval, thresholds, feed, token.clone()));
    SamplerHandle { token, join }
}

async fn run<T: Transport>(
    manager: Arc<ConnectionManager<T>>,
    interval: Duration,
    thresholds: ProximityThresholds,
    feed: SampleFeed,
    token: CancellationToken,
) {
    let mut states = manager.subscribe();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_ms = interval.as_millis(), "sampler started");

    loop {
        if *states.borrow_and_update() != ConnectionState::Monitoring {
            break;
        }

        tokio::select! {
            biased;
            () = token.cancelled() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let read = tokio::select! {
            biased;
            () = token.cancelled() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            read = manager.read_signal_strength() => read,
        };

        match read {
            Ok(rssi) if *states.borrow() == ConnectionState::Monitoring => {
                let sample = ProximitySample::new(rssi, &thresholds);
                debug!(rssi, label = %sample.label, "proximity sample");
                feed.publish(sample);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "signal strength read failed, skipping tick"),
        }
    }

    info!("sampler stopped");
}
