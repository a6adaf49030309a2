//! Error types for the game simulation.
//!
//! Expected, frequent failures (a command that cannot run) are not
//! errors at this level; they are [`CommandRejection`] values returned
//! by the pipeline. [`GameError`] covers hard failures only: malformed
//! payloads from the outside and corrupt serialized state.
//!
//! [`CommandRejection`]: crate::command::CommandRejection

use thiserror::Error;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for hard simulation failures.
#[derive(Debug, Error)]
pub enum GameError {
    /// A command payload from an external source could not be decoded.
    ///
    /// Distinct from validation failure: a command that decodes but
    /// cannot run is rejected by `validate`, never by this error.
    #[error("Failed to decode command payload: {0}")]
    CommandDecode(String),

    /// Snapshot or replay bytes could not be read back.
    #[error("Corrupt serialized state: {0}")]
    CorruptState(String),

    /// Snapshot restore referenced an entity that does not exist.
    #[error("Dangling reference in snapshot: {kind} {id}")]
    DanglingReference {
        /// Entity kind name.
        kind: &'static str,
        /// Raw id of the missing entity.
        id: u32,
    },

    /// Snapshot format version mismatch.
    #[error("Snapshot version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Version this build writes and reads.
        expected: u32,
        /// Version found in the data.
        actual: u32,
    },

    /// Registry/map/ownership consistency was violated during restore.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
