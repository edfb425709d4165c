//! RSSI to distance-category classification.
//!
//! Each sample is classified on its own: there is no smoothing or hysteresis,
//! so a signal hovering around a boundary flips between neighbouring labels.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lower bound (inclusive) of [`ProximityLabel::VeryNear`], in dBm.
pub const VERY_NEAR_DBM: i16 = -50;
/// Lower bound (inclusive) of [`ProximityLabel::Near`], in dBm.
pub const NEAR_DBM: i16 = -63;
/// Lower bound (inclusive) of [`ProximityLabel::Far`], in dBm.
pub const FAR_DBM: i16 = -75;

/// Discrete distance category derived from RSSI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProximityLabel {
    /// `rssi >= -50`
    VeryNear,
    /// `-63 <= rssi < -50`
    Near,
    /// `-75 <= rssi < -63`
    Far,
    /// `rssi < -75`
    VeryFar,
}

impl fmt::Display for ProximityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::VeryNear => "Very Near",
            Self::Near => "Near",
            Self::Far => "Far",
            Self::VeryFar => "Very Far",
        })
    }
}

/// Classify a signal-strength sample with the reference thresholds.
#[must_use]
pub const fn classify(rssi: i16) -> ProximityLabel {
    ProximityThresholds::DEFAULT.classify(rssi)
}

/// Inclusive lower bounds of each category, from the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProximityThresholds {
    /// Lower bound of `VeryNear`.
    #[schema(example = -50)]
    pub very_near_dbm: i16,
    /// Lower bound of `Near`.
    #[schema(example = -63)]
    pub near_dbm: i16,
    /// Lower bound of `Far`. Anything weaker is `VeryFar`.
    #[schema(example = -75)]
    pub far_dbm: i16,
}

impl ProximityThresholds {
    /// The reference thresholds.
    pub const DEFAULT: Self = Self {
        very_near_dbm: VERY_NEAR_DBM,
        near_dbm: NEAR_DBM,
        far_dbm: FAR_DBM,
    };

    /// Map a sample to its category. Boundary values belong to the upper category.
    #[must_use]
    pub const fn classify(&self, rssi: i16) -> ProximityLabel {
        if rssi >= self.very_near_dbm {
            ProximityLabel::VeryNear
        } else if rssi >= self.near_dbm {
            ProximityLabel::Near
        } else if rssi >= self.far_dbm {
            ProximityLabel::Far
        } else {
            ProximityLabel::VeryFar
        }
    }

    /// Returns `true` if the bounds are strictly descending.
    #[must_use]
    pub const fn is_descending(&self) -> bool {
        self.very_near_dbm > self.near_dbm && self.near_dbm > self.far_dbm
    }
}

impl Default for ProximityThresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One signal-strength reading and its derived label. Only the latest is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "rssi": -58,
    "label": "near",
    "sampled_at": "2025-01-15T03:30:00Z"
}))]
pub struct ProximitySample {
    /// Signal strength in dBm.
    #[schema(example = -58)]
    pub rssi: i16,

    /// Derived distance category.
    pub label: ProximityLabel,

    /// When the reading was taken (UTC).
    pub sampled_at: DateTime<Utc>,
}

impl ProximitySample {
    /// Classify `rssi` and stamp it with the current time.
    #[must_use]
    pub fn new(rssi: i16, thresholds: &ProximityThresholds) -> Self {
        Self {
            rssi,
            label: thresholds.classify(rssi),
            sampled_at: Utc::now(),
        }
    }
}
