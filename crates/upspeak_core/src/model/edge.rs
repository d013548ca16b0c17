//! Edge domain model and relation kinds.
//!
//! # Responsibility
//! - Define the typed, weighted, directed relation between two nodes.
//! - Keep default relation weights tunable instead of hard-coded.
//!
//! # Invariants
//! - An edge points from `source` to `target`; it is never implicitly
//!   reversed.
//! - An edge decoded without `weight` takes the default weight of its type.

use crate::model::new_id;
use crate::model::node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of an edge.
pub type EdgeId = Uuid;

/// Well-known relation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Source replies to target.
    Reply,
    /// Source belongs to target.
    Child,
    /// Source annotates target.
    Annotation,
    /// Source is attached to target.
    Attachment,
    /// Source is a fork of target.
    Fork,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reply => "Reply",
            Self::Child => "Child",
            Self::Annotation => "Annotation",
            Self::Attachment => "Attachment",
            Self::Fork => "Fork",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Reply" => Some(Self::Reply),
            "Child" => Some(Self::Child),
            "Annotation" => Some(Self::Annotation),
            "Attachment" => Some(Self::Attachment),
            "Fork" => Some(Self::Fork),
            _ => None,
        }
    }
}

/// Default weight per relation kind.
///
/// Weights are not part of the wire protocol; deployments may override them
/// through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeWeights {
    pub reply: f64,
    pub child: f64,
    pub annotation: f64,
    pub attachment: f64,
    pub fork: f64,
    /// Used for relation types outside [`EdgeKind`].
    pub other: f64,
}

impl Default for EdgeWeights {
    fn default() -> Self {
        Self {
            reply: 0.5,
            child: 1.0,
            annotation: 0.25,
            attachment: 0.5,
            fork: 0.5,
            other: 1.0,
        }
    }
}

impl EdgeWeights {
    pub fn weight_of(&self, kind: EdgeKind) -> f64 {
        match kind {
            EdgeKind::Reply => self.reply,
            EdgeKind::Child => self.child,
            EdgeKind::Annotation => self.annotation,
            EdgeKind::Attachment => self.attachment,
            EdgeKind::Fork => self.fork,
        }
    }

    /// Resolves the default weight for an arbitrary relation tag.
    pub fn weight_for(&self, edge_type: &str) -> f64 {
        EdgeKind::parse(edge_type).map_or(self.other, |kind| self.weight_of(kind))
    }

    /// Builds an edge of a well-known kind weighted by this table.
    pub fn edge(&self, kind: EdgeKind, source: NodeId, target: NodeId) -> Edge {
        Edge::new(kind.as_str(), source, target, "", self.weight_of(kind))
    }
}

/// Directed relation between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "EdgeRecord")]
pub struct Edge {
    pub id: EdgeId,
    /// Relation tag, e.g. `Reply` or `Annotation`.
    #[serde(rename = "type")]
    pub edge_type: String,
    pub source: NodeId,
    pub target: NodeId,
    pub label: String,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    /// Creates an edge with a generated id and `created_at = now`.
    pub fn new(
        edge_type: impl Into<String>,
        source: NodeId,
        target: NodeId,
        label: impl Into<String>,
        weight: f64,
    ) -> Self {
        Self {
            id: new_id(),
            edge_type: edge_type.into(),
            source,
            target,
            label: label.into(),
            weight,
            created_at: Utc::now(),
        }
    }

    /// `reply` is a reply to `in_reply_to`.
    pub fn reply(reply: NodeId, in_reply_to: NodeId) -> Self {
        EdgeWeights::default().edge(EdgeKind::Reply, reply, in_reply_to)
    }

    /// `child` belongs to `parent`.
    pub fn child(child: NodeId, parent: NodeId) -> Self {
        EdgeWeights::default().edge(EdgeKind::Child, child, parent)
    }

    /// `annotation` annotates `target`.
    pub fn annotation(annotation: NodeId, target: NodeId) -> Self {
        EdgeWeights::default().edge(EdgeKind::Annotation, annotation, target)
    }

    /// `attachment` is attached to `belongs_to`.
    pub fn attachment(attachment: NodeId, belongs_to: NodeId) -> Self {
        EdgeWeights::default().edge(EdgeKind::Attachment, attachment, belongs_to)
    }

    /// `forked` is a fork of `origin`.
    pub fn fork(forked: NodeId, origin: NodeId) -> Self {
        EdgeWeights::default().edge(EdgeKind::Fork, forked, origin)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Returns whether the edge touches `node_id` on either end.
    pub fn touches(&self, node_id: NodeId) -> bool {
        self.source == node_id || self.target == node_id
    }

    pub fn kind(&self) -> Option<EdgeKind> {
        EdgeKind::parse(&self.edge_type)
    }
}

/// Wire shape with optional fields filled in on decode.
#[derive(Deserialize)]
struct EdgeRecord {
    #[serde(default = "new_id")]
    id: EdgeId,
    #[serde(rename = "type")]
    edge_type: String,
    source: NodeId,
    target: NodeId,
    #[serde(default)]
    label: String,
    weight: Option<f64>,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl From<EdgeRecord> for Edge {
    fn from(record: EdgeRecord) -> Self {
        let weight = record
            .weight
            .unwrap_or_else(|| EdgeWeights::default().weight_for(&record.edge_type));
        Self {
            id: record.id,
            edge_type: record.edge_type,
            source: record.source,
            target: record.target,
            label: record.label,
            weight,
            created_at: record.created_at,
        }
    }
}
