//! Snapshot codec
//!
//! Exports engine state as a JSON-serialisable attribute bag and restores
//! it with stale-data defences. The format is deliberately loose on the way
//! in: a malformed timestamp degrades to no timer, an unknown lock state
//! skips the entry, and nothing aborts the restore as a whole.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{LocationRuntimeState, LockState};

/// Serialisable state snapshot keyed by location id
pub type Snapshot = BTreeMap<String, LocationSnapshot>;

/// One location's entry in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSnapshot {
    /// Whether the location was occupied
    pub is_occupied: bool,
    /// Timer expiry as an RFC 3339 string, or null
    pub occupied_until: Option<String>,
    /// Occupant ids present at export time
    pub active_occupants: Vec<String>,
    /// Hold source ids active at export time
    pub active_holds: Vec<String>,
    /// Lock state wire name, "unlocked" or "locked_frozen"
    pub lock_state: String,
}

impl LocationSnapshot {
    fn from_state(state: &LocationRuntimeState) -> Self {
        Self {
            is_occupied: state.is_occupied,
            occupied_until: state.occupied_until.map(|until| until.to_rfc3339()),
            active_occupants: state.active_occupants.iter().cloned().collect(),
            active_holds: state.active_holds.iter().cloned().collect(),
            lock_state: state.lock_state.as_str().to_string(),
        }
    }
}

/// Export all non-default states. Default-vacant locations are omitted to
/// keep snapshots small.
pub(crate) fn export<'a>(
    states: impl Iterator<Item = (&'a str, &'a LocationRuntimeState)>,
) -> Snapshot {
    states
        .filter(|(_, state)| !state.is_default())
        .map(|(id, state)| (id.to_string(), LocationSnapshot::from_state(state)))
        .collect()
}

/// Rehydrate one snapshot entry, applying the stale-data rules in order:
///
/// 1. Locked states are timeless and restore verbatim.
/// 2. Occupants or holds are trusted over any timer; the location comes
///    back occupied and indefinite (the host is expected to re-verify the
///    holds shortly after restart).
/// 3. An expired timer means the occupancy lapsed while the engine was
///    down; the location comes back default-vacant.
/// 4. Anything else is fresh and restores verbatim.
///
/// Returns `None` when the entry cannot be interpreted at all (unknown lock
/// state), in which case the location keeps its current state.
pub(crate) fn restore_entry(
    location_id: &str,
    entry: &LocationSnapshot,
    now: DateTime<Utc>,
) -> Option<LocationRuntimeState> {
    let Some(lock_state) = LockState::parse(&entry.lock_state) else {
        tracing::warn!(
            location = %location_id,
            lock_state = %entry.lock_state,
            "unknown lock state in snapshot, entry skipped"
        );
        return None;
    };

    let occupied_until = entry.occupied_until.as_deref().and_then(|raw| {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => Some(parsed.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!(
                    location = %location_id,
                    raw,
                    error = %e,
                    "malformed timestamp in snapshot, treated as absent"
                );
                None
            }
        }
    });
    let active_occupants: BTreeSet<String> = entry.active_occupants.iter().cloned().collect();
    let active_holds: BTreeSet<String> = entry.active_holds.iter().cloned().collect();

    if lock_state == LockState::LockedFrozen {
        return Some(LocationRuntimeState {
            is_occupied: entry.is_occupied,
            occupied_until,
            active_occupants,
            active_holds,
            lock_state,
        });
    }

    if !active_occupants.is_empty() || !active_holds.is_empty() {
        return Some(LocationRuntimeState {
            is_occupied: true,
            occupied_until: None,
            active_occupants,
            active_holds,
            lock_state,
        });
    }

    if occupied_until.is_some_and(|until| until < now) {
        tracing::debug!(location = %location_id, "snapshot timer expired, restoring vacant");
        return Some(LocationRuntimeState::vacant());
    }

    Some(LocationRuntimeState {
        is_occupied: entry.is_occupied,
        occupied_until,
        active_occupants,
        active_holds,
        lock_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        match Utc.with_ymd_and_hms(2025, 1, 1, hour, minute, 0) {
            chrono::LocalResult::Single(dt) => dt,
            _ => panic!("invalid test timestamp"),
        }
    }

    #[test]
    fn export_omits_default_states() {
        let vacant = LocationRuntimeState::vacant();
        let occupied = LocationRuntimeState {
            is_occupied: true,
            occupied_until: Some(at(12, 10)),
            ..LocationRuntimeState::vacant()
        };
        let snapshot = export([("home", &vacant), ("kitchen", &occupied)].into_iter());
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("kitchen"));
    }

    #[test]
    fn timestamps_round_trip_through_rfc3339() {
        let state = LocationRuntimeState {
            is_occupied: true,
            occupied_until: Some(at(12, 10)),
            ..LocationRuntimeState::vacant()
        };
        let entry = LocationSnapshot::from_state(&state);
        let restored = match restore_entry("kitchen", &entry, at(12, 0)) {
            Some(restored) => restored,
            None => panic!("entry should restore"),
        };
        assert_eq!(restored, state);
    }

    #[test]
    fn expired_timer_restores_vacant() {
        let entry = LocationSnapshot {
            is_occupied: true,
            occupied_until: Some(at(12, 10).to_rfc3339()),
            active_occupants: Vec::new(),
            active_holds: Vec::new(),
            lock_state: "unlocked".to_string(),
        };
        let restored = restore_entry("kitchen", &entry, at(14, 0));
        assert_eq!(restored, Some(LocationRuntimeState::vacant()));
    }

    #[test]
    fn holds_override_expired_timer() {
        let entry = LocationSnapshot {
            is_occupied: true,
            occupied_until: Some(at(12, 10).to_rfc3339()),
            active_occupants: Vec::new(),
            active_holds: vec!["radar".to_string()],
            lock_state: "unlocked".to_string(),
        };
        let restored = match restore_entry("kitchen", &entry, at(14, 0)) {
            Some(restored) => restored,
            None => panic!("entry should restore"),
        };
        assert!(restored.is_occupied);
        assert_eq!(restored.occupied_until, None);
        assert!(restored.active_holds.contains("radar"));
    }

    #[test]
    fn locked_entry_restores_verbatim_even_when_expired() {
        let entry = LocationSnapshot {
            is_occupied: true,
            occupied_until: Some(at(12, 10).to_rfc3339()),
            active_occupants: Vec::new(),
            active_holds: Vec::new(),
            lock_state: "locked_frozen".to_string(),
        };
        let restored = match restore_entry("kitchen", &entry, at(14, 0)) {
            Some(restored) => restored,
            None => panic!("entry should restore"),
        };
        assert!(restored.is_occupied);
        assert_eq!(restored.occupied_until, Some(at(12, 10)));
        assert_eq!(restored.lock_state, LockState::LockedFrozen);
    }

    #[test]
    fn malformed_timestamp_degrades_to_absent() {
        let entry = LocationSnapshot {
            is_occupied: true,
            occupied_until: Some("not-a-timestamp".to_string()),
            active_occupants: Vec::new(),
            active_holds: Vec::new(),
            lock_state: "unlocked".to_string(),
        };
        let restored = match restore_entry("kitchen", &entry, at(12, 0)) {
            Some(restored) => restored,
            None => panic!("entry should restore"),
        };
        assert!(restored.is_occupied);
        assert_eq!(restored.occupied_until, None);
    }

    #[test]
    fn unknown_lock_state_skips_entry() {
        let entry = LocationSnapshot {
            is_occupied: true,
            occupied_until: None,
            active_occupants: Vec::new(),
            active_holds: Vec::new(),
            lock_state: "frozen".to_string(),
        };
        assert_eq!(restore_entry("kitchen", &entry, at(12, 0)), None);
    }
}
