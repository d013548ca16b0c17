//! Node domain model.
//!
//! # Responsibility
//! - Define the atomic content unit of the knowledge graph.
//!
//! # Invariants
//! - `id` is immutable and globally unique.
//! - `kind` is set at construction and never changes afterwards.
//! - A `null` body is "empty": archives store no blob for it.

use crate::model::new_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Stable identifier of a node.
pub type NodeId = Uuid;

/// Well-known structural kinds. The set is open; any string is accepted.
pub mod kinds {
    /// Standalone node that belongs to no thread.
    pub const NODE: &str = "Node";
    /// Root node of a thread.
    pub const THREAD: &str = "Thread";
    /// Node created as part of a thread discussion.
    pub const COMMENT: &str = "Comment";
    /// Body of an annotation.
    pub const ANNOTATION: &str = "Annotation";
}

/// Atomic content unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default = "new_id")]
    pub id: NodeId,
    /// Structural role, e.g. `Node`, `Thread`, `Comment`.
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub subject: String,
    /// MIME type of `body`.
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub body: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Node {
    /// Creates a node with a generated id and `created_at = now`.
    pub fn new(kind: impl Into<String>, content_type: impl Into<String>, body: Value) -> Self {
        Self {
            id: new_id(),
            kind: kind.into(),
            subject: String::new(),
            content_type: content_type.into(),
            metadata: Value::Null,
            body,
            created_at: Utc::now(),
        }
    }

    /// Creates a standalone plain-text node.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(kinds::NODE, "text/plain", Value::String(text.into()))
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns whether the body would produce a blob on save.
    pub fn has_body(&self) -> bool {
        !self.body.is_null()
    }
}

fn default_kind() -> String {
    kinds::NODE.to_string()
}
