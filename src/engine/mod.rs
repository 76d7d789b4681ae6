//! Occupancy engine: event handling, propagation and timeout sweeping
//!
//! The engine owns the per-location state map and drives the evaluator.
//! Every committed change triggers propagation: upward to contributing
//! parents first, then downward to follow-parent children, recursively,
//! until no further location changes.

mod evaluator;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::{LocationConfig, OccupancyStrategy, PROPAGATED_CATEGORY};
use crate::error::EngineResult;
use crate::events::{EventKind, OccupancyEvent};
use crate::snapshot::{self, Snapshot};
use crate::state::{
    EngineOutput, LocationRuntimeState, LockState, StateTransition, TransitionReason,
};

/// The functional core of the occupancy system
///
/// Single-writer: the engine performs no I/O, holds no clock and never
/// blocks. Callers inject `now` on every entry point and serialise access.
pub struct OccupancyEngine {
    /// Immutable location configs keyed by id
    configs: HashMap<String, LocationConfig>,
    /// Config insertion order, used for deterministic sweeps
    order: Vec<String>,
    /// Parent id to child ids, for downward follow-parent re-evaluation
    children: HashMap<String, Vec<String>>,
    /// Mutable runtime state per location
    state: HashMap<String, LocationRuntimeState>,
}

impl OccupancyEngine {
    /// Create an engine with every location default-vacant.
    ///
    /// Fails when two configs share an id or a `parent_id` references a
    /// location that is not in the set.
    pub fn new(configs: Vec<LocationConfig>) -> EngineResult<Self> {
        Self::with_initial_state(configs, HashMap::new())
    }

    /// Create an engine with a typed initial state, e.g. carried over from a
    /// previous engine instance.
    ///
    /// Locations missing from `initial_state` start default-vacant; ids in
    /// the map without a config are dropped.
    pub fn with_initial_state(
        configs: Vec<LocationConfig>,
        mut initial_state: HashMap<String, LocationRuntimeState>,
    ) -> EngineResult<Self> {
        crate::config::validate_configs(&configs)?;

        let order: Vec<String> = configs.iter().map(|c| c.id.clone()).collect();

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for config in &configs {
            if let Some(parent_id) = &config.parent_id {
                children
                    .entry(parent_id.clone())
                    .or_default()
                    .push(config.id.clone());
            }
        }

        let state = configs
            .iter()
            .map(|c| {
                let state = initial_state.remove(&c.id).unwrap_or_default();
                (c.id.clone(), state)
            })
            .collect();

        Ok(Self {
            configs: configs.into_iter().map(|c| (c.id.clone(), c)).collect(),
            order,
            children,
            state,
        })
    }

    /// Process a single external event.
    ///
    /// Events for unknown locations are logged and ignored; the result then
    /// carries no transitions but still reports the next expiration.
    pub fn handle_event(&mut self, event: &OccupancyEvent, now: DateTime<Utc>) -> EngineOutput {
        if !self.configs.contains_key(&event.location_id) {
            tracing::warn!(location = %event.location_id, "event for unknown location");
            return EngineOutput {
                transitions: Vec::new(),
                next_expiration: self.next_expiration(now),
            };
        }

        tracing::info!(
            location = %event.location_id,
            kind = ?event.kind,
            category = %event.category,
            source = %event.source_id,
            "handling event"
        );

        let mut transitions = Vec::new();
        let location_id = event.location_id.clone();
        self.process_location(
            &location_id,
            Some(event),
            now,
            TransitionReason::Event,
            &mut transitions,
        );

        EngineOutput {
            next_expiration: self.next_expiration(now),
            transitions,
        }
    }

    /// Periodic timer housekeeping.
    ///
    /// Runs in two phases. First, every locked, occupied, contributing
    /// location re-asserts itself upward so its ancestors stay armed while
    /// it is frozen (a locked room in party mode keeps the house awake).
    /// Second, every unlocked location is re-evaluated so elapsed timers
    /// retire; follow-parent children track the results through the normal
    /// propagation path.
    pub fn check_timeouts(&mut self, now: DateTime<Utc>) -> EngineOutput {
        tracing::debug!(%now, "checking timeouts");
        let mut transitions = Vec::new();

        let reasserting: Vec<(String, String)> = self
            .order
            .iter()
            .filter_map(|id| {
                let state = self.state.get(id)?;
                if state.lock_state != LockState::LockedFrozen || !state.is_occupied {
                    return None;
                }
                let config = self.configs.get(id)?;
                if !config.contributes_to_parent {
                    return None;
                }
                let parent_id = config.parent_id.clone()?;
                Some((id.clone(), parent_id))
            })
            .collect();
        for (child_id, parent_id) in reasserting {
            tracing::debug!(location = %child_id, parent = %parent_id, "locked re-assertion");
            let synthetic = OccupancyEvent::new(
                parent_id.clone(),
                EventKind::Propagated,
                PROPAGATED_CATEGORY,
                child_id,
                now,
            );
            self.process_location(
                &parent_id,
                Some(&synthetic),
                now,
                TransitionReason::Propagated,
                &mut transitions,
            );
        }

        for location_id in self.order.clone() {
            let Some(state) = self.state.get(&location_id) else {
                continue;
            };
            if state.lock_state == LockState::LockedFrozen {
                tracing::debug!(location = %location_id, "skipped (locked)");
                continue;
            }
            if !state.is_occupied {
                continue;
            }
            self.process_location(
                &location_id,
                None,
                now,
                TransitionReason::Timeout,
                &mut transitions,
            );
        }

        EngineOutput {
            next_expiration: self.next_expiration(now),
            transitions,
        }
    }

    /// Export the current state as a JSON-serialisable snapshot.
    ///
    /// Default-vacant locations are omitted; collections are copies.
    pub fn export_state(&self) -> Snapshot {
        snapshot::export(self.state.iter().map(|(id, state)| (id.as_str(), state)))
    }

    /// Rehydrate state from a snapshot with stale-data defences.
    ///
    /// Locked entries restore verbatim; entries with occupants or holds are
    /// trusted and forced occupied; expired timers force default-vacant;
    /// everything else restores verbatim. Unknown locations and malformed
    /// entries are skipped without failing the restore.
    pub fn restore_state(&mut self, snapshot: &Snapshot, now: DateTime<Utc>, max_age_minutes: u32) {
        tracing::debug!(
            entries = snapshot.len(),
            max_age_minutes,
            "restoring state snapshot"
        );
        for (location_id, entry) in snapshot {
            if !self.configs.contains_key(location_id) {
                tracing::debug!(location = %location_id, "snapshot entry for unknown location ignored");
                continue;
            }
            if let Some(state) = snapshot::restore_entry(location_id, entry, now) {
                self.state.insert(location_id.clone(), state);
            }
        }
    }

    /// Runtime state of a location, if it exists
    pub fn state(&self, location_id: &str) -> Option<&LocationRuntimeState> {
        self.state.get(location_id)
    }

    /// All runtime states keyed by location id
    pub fn states(&self) -> &HashMap<String, LocationRuntimeState> {
        &self.state
    }

    /// Config of a location, if it exists
    pub fn config(&self, location_id: &str) -> Option<&LocationConfig> {
        self.configs.get(location_id)
    }

    /// Recursive update handler: evaluate one location, then propagate.
    ///
    /// Upward runs before downward so follow-parent children read the
    /// parent's freshly committed state. Recursion terminates because every
    /// step either strictly grows the state (holds, occupants, a later
    /// timer) or commits nothing and stops.
    fn process_location(
        &mut self,
        location_id: &str,
        event: Option<&OccupancyEvent>,
        now: DateTime<Utc>,
        cause: TransitionReason,
        transitions: &mut Vec<StateTransition>,
    ) {
        let Some(config) = self.configs.get(location_id) else {
            return;
        };
        let parent_id = config.parent_id.clone();
        let contributes = config.contributes_to_parent;

        let next = {
            let Some(current) = self.state.get(location_id) else {
                return;
            };
            let parent_state = parent_id.as_deref().and_then(|p| self.state.get(p));
            evaluator::evaluate(config, current, parent_state, event, now)
        };
        let Some(new_state) = next else {
            return;
        };

        let previous_state = self
            .state
            .insert(location_id.to_string(), new_state.clone())
            .unwrap_or_default();

        let reason = match event {
            Some(ev) if ev.kind == EventKind::Propagated => TransitionReason::Propagated,
            _ => cause,
        };
        tracing::info!(
            location = %location_id,
            occupied = new_state.is_occupied,
            reason = ?reason,
            "state transition"
        );
        transitions.push(StateTransition {
            location_id: location_id.to_string(),
            previous_state,
            new_state: new_state.clone(),
            reason,
        });

        // Upward: bubble occupancy to a contributing parent. Vacancy never
        // bubbles. A locked parent absorbs the synthetic event silently.
        if let Some(parent_id) = parent_id.as_deref() {
            let should_propagate =
                contributes && (new_state.is_occupied || !new_state.active_occupants.is_empty());
            if should_propagate {
                tracing::debug!(location = %location_id, parent = %parent_id, "propagating upward");
                let synthetic = OccupancyEvent::new(
                    parent_id,
                    EventKind::Propagated,
                    PROPAGATED_CATEGORY,
                    location_id,
                    now,
                );
                self.process_location(
                    parent_id,
                    Some(&synthetic),
                    now,
                    TransitionReason::Propagated,
                    transitions,
                );
            }
        }

        // Downward: follow-parent children re-evaluate against the state
        // committed above. Timeout-driven cascades keep the timeout reason.
        let child_cause = match cause {
            TransitionReason::Timeout => TransitionReason::Timeout,
            _ => TransitionReason::Propagated,
        };
        let child_ids = self.children.get(location_id).cloned().unwrap_or_default();
        for child_id in child_ids {
            let follows = self
                .configs
                .get(&child_id)
                .is_some_and(|c| c.strategy == OccupancyStrategy::FollowParent);
            if follows {
                tracing::debug!(location = %location_id, child = %child_id, "re-evaluating follow-parent child");
                self.process_location(&child_id, None, now, child_cause, transitions);
            }
        }
    }

    /// Earliest future timer across locations that need a wakeup. Held and
    /// identified locations are indefinite and excluded.
    fn next_expiration(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut next: Option<DateTime<Utc>> = None;
        for state in self.state.values() {
            if !state.active_holds.is_empty() || !state.active_occupants.is_empty() {
                continue;
            }
            if let Some(until) = state.occupied_until {
                if until > now && next.map_or(true, |n| until < n) {
                    next = Some(until);
                }
            }
        }
        next
    }
}
