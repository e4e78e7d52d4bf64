// src/core/ports.rs

//! Collaborators the enumeration stages depend on but do not implement.
//!
//! The crate ships in-memory implementations of each (see `sanitize` and
//! `graph`) so the stages can run without a database or a resolver.

use async_trait::async_trait;
use strum::Display;

use crate::core::error::{EnumError, GraphError};
use crate::core::models::{DnsRequest, PipelineData, Tag};

/// Name of the stage where new data enters the pipeline.
pub const ROOT_STAGE: &str = "root";

/// Normalizes freshly discovered names and checks that they are well formed.
pub trait Sanitizer: Send + Sync {
    /// Cleans up the name and domain in place. Must be idempotent.
    fn sanitize(&self, req: &mut DnsRequest);

    /// Returns true when the name is syntactically valid and lies inside its domain.
    fn valid(&self, req: &DnsRequest) -> bool;
}

pub trait ScopeChecker: Send + Sync {
    fn is_domain_in_scope(&self, name: &str) -> bool;
}

/// Kinds of node the graph store can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    Fqdn,
    Address,
}

/// The persistent knowledge graph of the enumeration.
///
/// Implementations provide their own synchronization; every call is treated
/// as atomic.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn read_node(&self, name: &str, kind: NodeKind) -> Result<(), GraphError>;

    /// Records that `source` reported `name` during run `run_id`.
    async fn insert_fqdn(
        &self,
        name: &str,
        source: &str,
        tag: Tag,
        run_id: &str,
    ) -> Result<(), GraphError>;

    /// Returns true when the name is known to be an alias (owner of a CNAME record).
    async fn is_cname_node(&self, name: &str) -> bool;
}

/// A downstream data source that wants to hear about discovered names.
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    /// Hands a record to the source. Must not block; sources queue internally.
    fn request(&self, data: PipelineData);
}

/// The entry point used to feed data back into the pipeline.
#[async_trait]
pub trait PipelineEntry: Send + Sync {
    async fn send_data(&self, stage: &str, data: PipelineData) -> Result<(), EnumError>;
}
