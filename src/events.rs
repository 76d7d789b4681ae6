//! Occupancy events
//!
//! Events are the only way state changes enter the engine. The host maps
//! raw sensor signals onto these kinds; the engine never sees devices.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Type of occupancy event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Transient pulse that (re)arms a fixed-duration timer
    Momentary,
    /// Continuous-presence assertion starts, pausing the timer
    HoldStart,
    /// Continuous-presence assertion ends, starting the trailing timer
    HoldEnd,
    /// Manual override, honoured even while locked
    Manual,
    /// Lock state toggle
    LockChange,
    /// Synthetic event carrying child occupancy up the hierarchy
    Propagated,
}

/// An occupancy event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyEvent {
    /// Target location
    pub location_id: String,
    /// Event kind
    pub kind: EventKind,
    /// Timeout-lookup key, e.g. "motion" or "presence"
    pub category: String,
    /// Device id; the key into the hold set for hold events
    pub source_id: String,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Optional occupant identity carried by the event
    pub occupant_id: Option<String>,
    /// Optional explicit duration, overriding the category timeout
    pub duration: Option<Duration>,
}

impl OccupancyEvent {
    /// Create an event without identity or duration override
    pub fn new(
        location_id: impl Into<String>,
        kind: EventKind,
        category: impl Into<String>,
        source_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            location_id: location_id.into(),
            kind,
            category: category.into(),
            source_id: source_id.into(),
            timestamp,
            occupant_id: None,
            duration: None,
        }
    }

    /// Attach an occupant identity
    pub fn with_occupant(mut self, occupant_id: impl Into<String>) -> Self {
        self.occupant_id = Some(occupant_id.into());
        self
    }

    /// Override the category timeout with an explicit duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}
