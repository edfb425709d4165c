//! The process-wide radio, shared explicitly.
//!
//! There is one radio per process and it can serve one scan or one connection
//! attempt at a time. [`Radio`] wraps the transport together with a
//! mutual-exclusion lease: whoever holds a [`RadioLease`] owns the radio until
//! the lease is dropped. Acquisition never waits; a busy radio is a conflict.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{Result, SearchItError};
use crate::transport::Transport;

/// What the radio is being used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioUse {
    /// Device discovery.
    Scan,
    /// A connect + service discovery attempt.
    Connect,
}

impl fmt::Display for RadioUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scan => "scan",
            Self::Connect => "connection attempt",
        })
    }
}

/// Shared handle to the transport and its exclusive-use lease.
pub struct Radio<T> {
    transport: Arc<T>,
    permits: Arc<Semaphore>,
    holder: Arc<Mutex<Option<RadioUse>>>,
}

impl<T> Clone for Radio<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            permits: Arc::clone(&self.permits),
            holder: Arc::clone(&self.holder),
        }
    }
}

impl<T: Transport> Radio<T> {
    /// Wrap a transport. Create one per process and clone it into every session.
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            permits: Arc::new(Semaphore::new(1)),
            holder: Arc::new(Mutex::new(None)),
        }
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Take exclusive use of the radio.
    ///
    /// # Errors
    ///
    /// Returns [`SearchItError::Conflict`] if another scan or connection attempt holds it.
    pub fn try_acquire(&self, purpose: RadioUse) -> Result<RadioLease> {
        let permit = Arc::clone(&self.permits).try_acquire_owned().map_err(|_| {
            let busy_with = self.current_use().map_or_else(
                || "another operation".to_string(),
                |current| current.to_string(),
            );
            SearchItError::Conflict(format!("{busy_with} in progress"))
        })?;

        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = Some(purpose);
        debug!(%purpose, "radio acquired");

        Ok(RadioLease {
            purpose,
            holder: Arc::clone(&self.holder),
            _permit: permit,
        })
    }

    /// Returns `true` while a lease is held.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.permits.available_permits() == 0
    }

    /// What the current lease holder is doing, if anyone holds one.
    #[must_use]
    pub fn current_use(&self) -> Option<RadioUse> {
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive use of the radio. Dropping it frees the radio.
#[must_use = "the radio is released as soon as the lease is dropped"]
pub struct RadioLease {
    purpose: RadioUse,
    holder: Arc<Mutex<Option<RadioUse>>>,
    _permit: OwnedSemaphorePermit,
}

impl RadioLease {
    /// What this lease was taken for.
    #[must_use]
    pub const fn purpose(&self) -> RadioUse {
        self.purpose
    }
}

impl fmt::Debug for RadioLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RadioLease")
            .field("purpose", &self.purpose)
            .finish_non_exhaustive()
    }
}

impl Drop for RadioLease {
    fn drop(&mut self) {
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = None;
        debug!(purpose = %self.purpose, "radio released");
    }
}
