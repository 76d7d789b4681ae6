//! Error types for the occupancy engine

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Error types for the occupancy engine
///
/// Construction errors are fatal; everything else (unknown event locations,
/// malformed snapshot entries) is logged and tolerated rather than raised.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Two location configs share the same id
    #[error("Duplicate location id: {id}")]
    DuplicateLocation {
        /// The offending location id
        id: String,
    },

    /// A config references a parent that is not in the config set
    #[error("Location {id} references unknown parent {parent_id}")]
    UnknownParent {
        /// The location with the dangling reference
        id: String,
        /// The missing parent id
        parent_id: String,
    },

    /// A configuration document failed to parse
    #[error("Config parse error: {0}")]
    ConfigParse(String),
}
