// src/core/error.rs

use thiserror::Error;

/// Errors raised around the enumeration stages.
///
/// The stages themselves never fail a record: invalid or duplicate input is
/// dropped. These errors come from collaborators and from setup.
#[derive(Debug, Error)]
pub enum EnumError {
    #[error("occurrence counter has been stopped")]
    CounterStopped,

    #[error("pipeline entry is closed (stage: {stage})")]
    PipelineClosed { stage: String },

    #[error("unknown pipeline stage: {0}")]
    UnknownStage(String),

    #[error("enumeration has already been started")]
    AlreadyStarted,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by graph stores. A missing node is ordinary control flow.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("node not found: {name} ({kind})")]
    NotFound { name: String, kind: String },

    #[error("graph storage error: {0}")]
    Storage(String),
}
