//! Single-location evaluation step
//!
//! The evaluator is a pure function: given the current state, an optional
//! event (`None` is a re-evaluate tick), the injected `now` and the parent's
//! state, it either produces a replacement state or decides nothing changed.
//! Two calls with identical inputs produce identical outputs.

use chrono::{DateTime, Duration, Utc};

use crate::config::{LocationConfig, OccupancyStrategy};
use crate::events::{EventKind, OccupancyEvent};
use crate::state::{LocationRuntimeState, LockState};

/// Evaluate one location. Returns the replacement state if anything changed.
pub(crate) fn evaluate(
    config: &LocationConfig,
    current: &LocationRuntimeState,
    parent: Option<&LocationRuntimeState>,
    event: Option<&OccupancyEvent>,
    now: DateTime<Utc>,
) -> Option<LocationRuntimeState> {
    // Lock gate: a frozen location honours only manual and lock events.
    // Re-evaluate ticks are rejected too, so frozen state never decays.
    if current.lock_state == LockState::LockedFrozen {
        match event {
            Some(ev) if matches!(ev.kind, EventKind::Manual | EventKind::LockChange) => {}
            _ => {
                tracing::debug!(
                    location = %config.id,
                    kind = ?event.map(|ev| ev.kind),
                    "ignored while locked"
                );
                return None;
            }
        }
    }

    let mut next_occupants = current.active_occupants.clone();
    let mut next_holds = current.active_holds.clone();
    let mut next_until = current.occupied_until;
    let mut next_lock = current.lock_state;

    if let Some(ev) = event {
        // Lock toggle
        if ev.kind == EventKind::LockChange {
            next_lock = match next_lock {
                LockState::LockedFrozen => LockState::Unlocked,
                LockState::Unlocked => LockState::LockedFrozen,
            };
            tracing::info!(location = %config.id, lock = ?next_lock, "lock toggled");
        }

        // Identity rides on continuous presence. A pulse may name an
        // occupant for the host's benefit, but only hold events move the
        // occupant set; otherwise an expired pulse could leave a ghost
        // identity holding the room open forever.
        if let Some(occupant_id) = &ev.occupant_id {
            match ev.kind {
                EventKind::HoldStart => {
                    next_occupants.insert(occupant_id.clone());
                }
                EventKind::HoldEnd => {
                    next_occupants.remove(occupant_id);
                }
                _ => {}
            }
        }

        // Hold set mutation
        match ev.kind {
            EventKind::HoldStart => {
                next_holds.insert(ev.source_id.clone());
            }
            EventKind::HoldEnd => {
                next_holds.remove(&ev.source_id);
            }
            _ => {}
        }

        // Timer mutation. Timers never shrink: a new expiry only replaces a
        // shorter one. Propagated events arm from `now` rather than their
        // carried timestamp so an old timestamp cannot re-propagate.
        match ev.kind {
            EventKind::Momentary | EventKind::Manual => {
                let expiry = ev.timestamp + timeout_delta(ev, config);
                next_until = Some(next_until.map_or(expiry, |cur| cur.max(expiry)));
            }
            EventKind::Propagated => {
                let expiry = now + timeout_delta(ev, config);
                next_until = Some(next_until.map_or(expiry, |cur| cur.max(expiry)));
            }
            EventKind::HoldEnd => {
                // Fudge factor: when the last hold drops, a trailing timer
                // allows brief exits without flipping straight to vacant.
                if next_holds.is_empty() && !current.active_holds.is_empty() {
                    next_until = Some(ev.timestamp + timeout_delta(ev, config));
                }
            }
            _ => {}
        }
    }

    // While holds or occupants keep the location open, occupancy is
    // indefinite and any pending timer is meaningless.
    if !next_holds.is_empty() || !next_occupants.is_empty() {
        next_until = None;
    }

    // Occupancy derivation: timer still running, held, identified, or
    // inherited from the parent under the follow-parent strategy.
    let mut occupied = next_until.is_some_and(|until| until > now)
        || !next_holds.is_empty()
        || !next_occupants.is_empty();

    if config.strategy == OccupancyStrategy::FollowParent {
        if let Some(parent_state) = parent {
            if parent_state.is_occupied {
                occupied = true;
                // A held parent makes the child indefinite as well.
                if !parent_state.active_holds.is_empty()
                    || !parent_state.active_occupants.is_empty()
                {
                    next_until = None;
                }
            }
        }
    }

    // Vacancy scrub: nothing ephemeral survives vacancy, so a stale
    // identity can never linger past the room going empty.
    if !occupied {
        next_occupants.clear();
        next_holds.clear();
        next_until = None;
    }

    let next = LocationRuntimeState {
        is_occupied: occupied,
        occupied_until: next_until,
        active_occupants: next_occupants,
        active_holds: next_holds,
        lock_state: next_lock,
    };

    if next == *current {
        return None;
    }

    debug_assert!(
        next.is_occupied
            || (next.occupied_until.is_none()
                && next.active_occupants.is_empty()
                && next.active_holds.is_empty()),
        "vacant state must carry no evidence: {next:?}"
    );
    debug_assert!(
        (next.active_holds.is_empty() && next.active_occupants.is_empty())
            || next.occupied_until.is_none(),
        "held state must have no timer: {next:?}"
    );

    Some(next)
}

/// Resolve the effective timer duration for an event: an explicit duration
/// wins, otherwise the location's category timeout applies.
fn timeout_delta(event: &OccupancyEvent, config: &LocationConfig) -> Duration {
    event
        .duration
        .unwrap_or_else(|| Duration::minutes(i64::from(config.timeout_minutes(&event.category))))
}
