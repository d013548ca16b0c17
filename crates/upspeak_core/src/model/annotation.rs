//! Annotation aggregate: a body node linked to its target by an edge.

use crate::model::edge::{Edge, EdgeKind, EdgeWeights};
use crate::model::node::{Node, NodeId};
use serde::{Deserialize, Serialize};

/// Commentary on another node. Identity is the annotation node's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub node: Node,
    /// Links `node` to the annotated target, conventionally typed `Annotation`.
    pub edge: Edge,
    /// Free text such as `commenting` or `highlighting`.
    pub motivation: String,
}

impl Annotation {
    /// Annotates `target` with `node` using the default annotation weight.
    pub fn new(node: Node, target: NodeId, motivation: impl Into<String>) -> Self {
        Self::with_weights(node, target, motivation, &EdgeWeights::default())
    }

    pub fn with_weights(
        node: Node,
        target: NodeId,
        motivation: impl Into<String>,
        weights: &EdgeWeights,
    ) -> Self {
        let edge = weights.edge(EdgeKind::Annotation, node.id, target);
        Self {
            node,
            edge,
            motivation: motivation.into(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.node.id
    }

    pub fn target(&self) -> NodeId {
        self.edge.target
    }
}
