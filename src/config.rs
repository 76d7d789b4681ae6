//! Location configuration and config-document loaders
//!
//! A `LocationConfig` is immutable for the engine's lifetime. Configs are
//! usually assembled by the host, but they can also be loaded from JSON or
//! YAML documents with the same validation the engine constructor applies.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Final fallback timeout in minutes when a category has no entry and the
/// location defines no `default` either.
pub const FALLBACK_TIMEOUT_MINUTES: u32 = 10;

/// Timeout category used by synthetic propagation events. Parents that want
/// a non-default linger should define a timeout for this key.
pub const PROPAGATED_CATEGORY: &str = "propagated";

/// Type of location
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    /// Physical area with its own sensors
    #[default]
    Area,
    /// Virtual aggregator composed from children
    Virtual,
}

/// Strategy for deriving a location's occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyStrategy {
    /// Occupied only by own sensors or propagation from children
    #[default]
    Independent,
    /// Occupied by own sensors, or whenever the parent is occupied
    FollowParent,
}

/// Configuration for a location
///
/// `timeouts` maps event categories to minutes. For hold sources the entry
/// is the trailing timeout applied when the last hold releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Unique identifier for the location
    pub id: String,
    /// Optional parent location id for hierarchy
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Type of location
    #[serde(default)]
    pub kind: LocationKind,
    /// Strategy for deriving occupancy
    #[serde(default)]
    pub strategy: OccupancyStrategy,
    /// If false, occupancy never bubbles up to the parent
    #[serde(default = "default_contributes")]
    pub contributes_to_parent: bool,
    /// Event category to timeout minutes
    #[serde(default = "default_timeouts")]
    pub timeouts: HashMap<String, u32>,
}

fn default_contributes() -> bool {
    true
}

fn default_timeouts() -> HashMap<String, u32> {
    HashMap::from([
        ("motion".to_string(), 10),
        ("presence".to_string(), 2),
        ("media".to_string(), 5),
    ])
}

impl LocationConfig {
    /// Create a config with default kind, strategy and timeouts
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            kind: LocationKind::default(),
            strategy: OccupancyStrategy::default(),
            contributes_to_parent: true,
            timeouts: default_timeouts(),
        }
    }

    /// Set the parent location
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set the location kind
    pub fn with_kind(mut self, kind: LocationKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the occupancy strategy
    pub fn with_strategy(mut self, strategy: OccupancyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set whether occupancy bubbles up to the parent
    pub fn with_contributes_to_parent(mut self, contributes: bool) -> Self {
        self.contributes_to_parent = contributes;
        self
    }

    /// Replace the timeout table
    pub fn with_timeouts<I, K>(mut self, timeouts: I) -> Self
    where
        I: IntoIterator<Item = (K, u32)>,
        K: Into<String>,
    {
        self.timeouts = timeouts.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self
    }

    /// Resolve the timeout in minutes for an event category.
    ///
    /// Lookup order: the category itself, then the `default` entry, then
    /// [`FALLBACK_TIMEOUT_MINUTES`].
    pub fn timeout_minutes(&self, category: &str) -> u32 {
        if let Some(minutes) = self.timeouts.get(category) {
            return *minutes;
        }
        if let Some(minutes) = self.timeouts.get("default") {
            return *minutes;
        }
        FALLBACK_TIMEOUT_MINUTES
    }
}

/// Validate a config set: ids must be unique, parents must exist.
pub fn validate_configs(configs: &[LocationConfig]) -> EngineResult<()> {
    let mut seen = std::collections::HashSet::new();
    for config in configs {
        if !seen.insert(config.id.as_str()) {
            return Err(EngineError::DuplicateLocation {
                id: config.id.clone(),
            });
        }
    }
    for config in configs {
        if let Some(parent_id) = &config.parent_id {
            if !seen.contains(parent_id.as_str()) {
                return Err(EngineError::UnknownParent {
                    id: config.id.clone(),
                    parent_id: parent_id.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Load and validate a config list from a JSON document
pub fn load_configs_from_json(content: &str) -> EngineResult<Vec<LocationConfig>> {
    let configs: Vec<LocationConfig> =
        serde_json::from_str(content).map_err(|e| EngineError::ConfigParse(e.to_string()))?;
    validate_configs(&configs)?;
    Ok(configs)
}

/// Load and validate a config list from a YAML document
pub fn load_configs_from_yaml(content: &str) -> EngineResult<Vec<LocationConfig>> {
    let configs: Vec<LocationConfig> =
        serde_yaml::from_str(content).map_err(|e| EngineError::ConfigParse(e.to_string()))?;
    validate_configs(&configs)?;
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("motion", 10; "category entry")]
    #[test_case("presence", 2; "presence entry")]
    #[test_case("door", 10; "unknown category falls back")]
    fn timeout_lookup_defaults(category: &str, expected: u32) {
        let config = LocationConfig::new("kitchen");
        assert_eq!(config.timeout_minutes(category), expected);
    }

    #[test]
    fn timeout_lookup_prefers_default_entry() {
        let config =
            LocationConfig::new("hall").with_timeouts([("default", 7), ("motion", 3)]);
        assert_eq!(config.timeout_minutes("motion"), 3);
        assert_eq!(config.timeout_minutes("media"), 7);
    }

    #[test]
    fn validation_rejects_duplicate_ids() {
        let configs = vec![LocationConfig::new("kitchen"), LocationConfig::new("kitchen")];
        assert!(matches!(
            validate_configs(&configs),
            Err(EngineError::DuplicateLocation { .. })
        ));
    }

    #[test]
    fn validation_rejects_dangling_parent() {
        let configs = vec![LocationConfig::new("kitchen").with_parent("main_floor")];
        assert!(matches!(
            validate_configs(&configs),
            Err(EngineError::UnknownParent { .. })
        ));
    }

    #[test]
    fn json_loader_applies_defaults() {
        let doc = r#"[
            {"id": "home", "kind": "virtual"},
            {"id": "kitchen", "parent_id": "home", "timeouts": {"motion": 15}}
        ]"#;
        let configs = match load_configs_from_json(doc) {
            Ok(configs) => configs,
            Err(e) => panic!("load failed: {e}"),
        };
        assert_eq!(configs[0].kind, LocationKind::Virtual);
        assert!(configs[1].contributes_to_parent);
        assert_eq!(configs[1].timeout_minutes("motion"), 15);
    }

    #[test]
    fn yaml_loader_parses_strategy() {
        let doc = "
- id: main_floor
  kind: virtual
- id: living_room
  parent_id: main_floor
  strategy: follow_parent
";
        let configs = match load_configs_from_yaml(doc) {
            Ok(configs) => configs,
            Err(e) => panic!("load failed: {e}"),
        };
        assert_eq!(configs[1].strategy, OccupancyStrategy::FollowParent);
    }
}
