//! Thread aggregate.
//!
//! # Invariants
//! - Identity is the root node's id.
//! - Edge order is significant and preserved by persistence.

use crate::model::edge::{Edge, EdgeId};
use crate::model::node::{kinds, Node, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Identifier of a thread; equal to its root node id.
pub type ThreadId = NodeId;

/// One free-form metadata entry attached to a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMetadata {
    pub key: String,
    pub value: Value,
}

/// Root node plus an ordered set of edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub node: Node,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub metadata: Vec<ThreadMetadata>,
}

impl Thread {
    /// Creates an empty thread around `node`.
    pub fn new(node: Node) -> Self {
        Self {
            node,
            edges: Vec::new(),
            metadata: Vec::new(),
        }
    }

    /// Creates a thread whose root is a fresh `Thread`-kind node.
    pub fn start(content_type: impl Into<String>, body: Value) -> Self {
        Self::new(Node::new(kinds::THREAD, content_type, body))
    }

    pub fn id(&self) -> ThreadId {
        self.node.id
    }

    pub fn push_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn push_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.push(ThreadMetadata {
            key: key.into(),
            value,
        });
    }

    /// Returns the root plus every node referenced by an edge, deduplicated.
    pub fn node_ids(&self) -> BTreeSet<NodeId> {
        let mut ids = BTreeSet::new();
        ids.insert(self.node.id);
        for edge in &self.edges {
            ids.insert(edge.source);
            ids.insert(edge.target);
        }
        ids
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges.iter().map(|edge| edge.id).collect()
    }
}
