// src/lib.rs

//! Deduplication and subdomain expansion stages for a domain enumeration
//! pipeline.
//!
//! Discovered names pass through [`FqdnFilter`], which admits each name once
//! per trust tier, and then through [`SubdomainTask`], which derives proper
//! subdomains, counts them and feeds new ones back into the pipeline. Records
//! that survive are handed to registered [`DataSource`]s in bounded batches.

pub mod core;

pub use crate::core::config::EnumConfig;
pub use crate::core::enumeration::{Enumeration, RunStats, parse_input_line};
pub use crate::core::error::{EnumError, GraphError};
pub use crate::core::filter::FqdnFilter;
pub use crate::core::graph::MemoryGraph;
pub use crate::core::models::{
    AddrRequest, DnsAnswer, DnsRequest, PipelineData, ResolvedRequest, SubdomainRequest, Tag,
};
pub use crate::core::ports::{DataSource, GraphStore, PipelineEntry, Sanitizer, ScopeChecker};
pub use crate::core::sources::JsonLinesSource;
pub use crate::core::subdomain::SubdomainTask;
