//! Deterministic occupancy engine for a hierarchy of locations
//!
//! This crate provides the state-evaluation and propagation core of an
//! occupancy system. It:
//! - Ingests discrete occupancy events (pulses, holds, manual overrides,
//!   lock toggles) from heterogeneous sensors
//! - Maintains a derived `is_occupied` per location together with the
//!   supporting evidence (pending timer, identity set, active holds, lock)
//! - Propagates occupancy upward through the location hierarchy and drives
//!   follow-parent children downward
//! - Reports, after every input, the instant at which the host must call
//!   back for timer housekeeping
//! - Exports and restores state as a JSON-serialisable attribute bag with
//!   stale-data defences
//!
//! The engine owns no clock and performs no I/O. All time is injected as
//! `chrono::DateTime<Utc>`; the host schedules wakeups and owns persistence.
//! Callers must serialise access (single-writer contract).

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod snapshot;
pub mod state;

pub use config::{
    load_configs_from_json, load_configs_from_yaml, LocationConfig, LocationKind,
    OccupancyStrategy,
};
pub use engine::OccupancyEngine;
pub use error::{EngineError, EngineResult};
pub use events::{EventKind, OccupancyEvent};
pub use snapshot::{LocationSnapshot, Snapshot};
pub use state::{
    EngineOutput, LocationRuntimeState, LockState, StateTransition, TransitionReason,
};
