// src/core/graph.rs

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::core::error::GraphError;
use crate::core::models::Tag;
use crate::core::ports::{GraphStore, NodeKind};

/// One source that reported a name during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribution {
    pub source: String,
    pub tag: Tag,
    pub run_id: String,
}

#[derive(Debug, Default)]
struct Node {
    kinds: HashSet<NodeKind>,
    cname: bool,
    attributions: Vec<Attribution>,
}

/// An in-memory graph store.
///
/// Keeps just enough structure for the enumeration stages: which names exist,
/// which ones are aliases, and every source that reported each name.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    nodes: RwLock<HashMap<String, Node>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `name` as the owner of a CNAME record.
    pub fn mark_cname(&self, name: &str) {
        let mut nodes = self.nodes.write();
        let node = nodes.entry(name.to_string()).or_default();
        node.kinds.insert(NodeKind::Fqdn);
        node.cname = true;
    }

    pub fn attributions(&self, name: &str) -> Vec<Attribution> {
        self.nodes
            .read()
            .get(name)
            .map(|n| n.attributions.clone())
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn read_node(&self, name: &str, kind: NodeKind) -> Result<(), GraphError> {
        match self.nodes.read().get(name) {
            Some(node) if node.kinds.contains(&kind) => Ok(()),
            _ => Err(GraphError::NotFound {
                name: name.to_string(),
                kind: kind.to_string(),
            }),
        }
    }

    async fn insert_fqdn(
        &self,
        name: &str,
        source: &str,
        tag: Tag,
        run_id: &str,
    ) -> Result<(), GraphError> {
        if name.is_empty() {
            return Err(GraphError::Storage("empty node name".to_string()));
        }

        let mut nodes = self.nodes.write();
        let node = nodes.entry(name.to_string()).or_default();
        node.kinds.insert(NodeKind::Fqdn);

        let attribution = Attribution {
            source: source.to_string(),
            tag,
            run_id: run_id.to_string(),
        };
        if !node.attributions.contains(&attribution) {
            node.attributions.push(attribution);
        }
        Ok(())
    }

    async fn is_cname_node(&self, name: &str) -> bool {
        self.nodes.read().get(name).is_some_and(|n| n.cname)
    }
}
