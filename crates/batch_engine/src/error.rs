//! Error types for the execution engine.
//!
//! The engine exposes a single typed error enum, [`EngineError`]. User-supplied
//! code (datasets, translators, transforms, compute backends) returns
//! `anyhow::Result` so arbitrary failures can flow in; the engine wraps those
//! into the appropriate typed kind at its boundary.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A record's tensor shape disagrees with the rest of its batch.
    #[error("shape mismatch in slot {slot}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        slot: usize,
        expected: Vec<i64>,
        found: Vec<i64>,
    },

    /// A record carries a different number of tensor slots than its batch.
    #[error("record has {found} tensor slots, expected {expected}")]
    SlotCountMismatch { expected: usize, found: usize },

    /// Batchify was handed no records at all.
    #[error("cannot batchify an empty record list")]
    EmptyBatch,

    /// User encode/decode code failed.
    #[error("translation failed during {phase}")]
    Translation {
        phase: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A prefetch unit failed. `sequence` is the position the batch would
    /// have occupied in the delivery order.
    #[error("worker failed while preparing batch {sequence}")]
    Worker {
        sequence: usize,
        #[source]
        source: anyhow::Error,
    },

    /// The compute backend failed.
    #[error("compute failed")]
    Compute(#[source] anyhow::Error),

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread")]
    Spawn(#[source] std::io::Error),

    /// Use of a closed arena or a released tensor handle. Programmer error.
    #[error("resource lifecycle violation: {0}")]
    ResourceViolation(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no translator registered under name '{0}'")]
    UnknownTranslator(String),
}

impl EngineError {
    /// Wraps a translation-phase failure, preserving an already-typed
    /// `EngineError` instead of wrapping it a second time.
    pub(crate) fn translation(phase: &'static str, err: anyhow::Error) -> EngineError {
        match err.downcast::<EngineError>() {
            Ok(engine) => engine,
            Err(other) => EngineError::Translation {
                phase,
                source: other,
            },
        }
    }
}
