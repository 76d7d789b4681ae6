//! Runtime state and transition types

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lock state for a location
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Normal operation
    #[default]
    Unlocked,
    /// Administrative freeze: only manual and lock events are honoured,
    /// timers do not elapse, propagation is absorbed
    LockedFrozen,
}

impl LockState {
    /// Wire name used in snapshots
    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Unlocked => "unlocked",
            LockState::LockedFrozen => "locked_frozen",
        }
    }

    /// Parse a wire name; `None` for unknown strings
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unlocked" => Some(LockState::Unlocked),
            "locked_frozen" => Some(LockState::LockedFrozen),
            _ => None,
        }
    }
}

/// Runtime state for a location
///
/// A value type: the evaluator builds a candidate locally and commits it by
/// replacing the stored state wholesale. `occupied_until` is absent while
/// holds or occupants keep the location open (occupancy is then indefinite).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRuntimeState {
    /// Whether the location is currently occupied
    pub is_occupied: bool,
    /// When occupancy expires, if it is timer-driven
    pub occupied_until: Option<DateTime<Utc>>,
    /// Occupant ids currently present
    pub active_occupants: BTreeSet<String>,
    /// Source ids currently holding the location open
    pub active_holds: BTreeSet<String>,
    /// Current lock state
    pub lock_state: LockState,
}

impl LocationRuntimeState {
    /// The default-vacant state every location starts in
    pub fn vacant() -> Self {
        Self::default()
    }

    /// True when the state carries no information worth snapshotting
    pub fn is_default(&self) -> bool {
        !self.is_occupied
            && self.occupied_until.is_none()
            && self.active_occupants.is_empty()
            && self.active_holds.is_empty()
            && self.lock_state == LockState::Unlocked
    }
}

/// Why a transition was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionReason {
    /// Direct result of an external event
    Event,
    /// A timer elapsed during a timeout sweep
    Timeout,
    /// Caused by hierarchy propagation
    Propagated,
}

/// A committed state change on one location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    /// The location that changed
    pub location_id: String,
    /// State before the change
    pub previous_state: LocationRuntimeState,
    /// State after the change
    pub new_state: LocationRuntimeState,
    /// Why the change happened
    pub reason: TransitionReason,
}

/// Result of one engine call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineOutput {
    /// State transitions committed during the call, in commit order
    pub transitions: Vec<StateTransition>,
    /// Earliest future timer across all locations that need a wakeup,
    /// or `None` when no timer is pending
    pub next_expiration: Option<DateTime<Utc>>,
}
