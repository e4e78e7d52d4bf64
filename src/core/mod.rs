// src/core/mod.rs

// The `core` module holds the enumeration stages and everything they are
// built from. The binary only wires it to the command line and logging.

/// Records exchanged between pipeline stages and handed to data sources.
pub mod models;

/// Error types for the stages and their collaborators.
pub mod error;

/// Run settings with defaults and JSON loading.
pub mod config;

/// Traits for the collaborators the stages depend on.
pub mod ports;

pub mod queue;
pub mod stringfilter;
pub mod sanitize;
pub mod graph;
pub mod counter;

/// The duplicate name filter and its reconciliation task.
pub mod filter;

/// Subdomain derivation, recursive resubmission and the output drain.
pub mod subdomain;

pub mod sources;

/// Wires both stages into a runnable enumeration.
pub mod enumeration;
