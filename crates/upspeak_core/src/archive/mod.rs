//! Archive storage port and its local hybrid implementation.
//!
//! # Responsibility
//! - Define the storage contract consumed by [`crate::repo::Repository`].
//! - Provide typed errors that distinguish "absent" from storage failures.
//!
//! # Invariants
//! - `get_*` fails with [`ArchiveError::NotFound`] when the entity is absent;
//!   it never returns a zero value.
//! - `delete_*` tolerates an already-absent entity so retries are idempotent.

mod blob;
pub mod local;

use crate::db::DbError;
use crate::model::annotation::Annotation;
use crate::model::edge::{Edge, EdgeId};
use crate::model::node::{Node, NodeId};
use crate::model::thread::{Thread, ThreadId};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

pub use blob::BlobStore;
pub use local::LocalArchive;

pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Entity kinds addressed by an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Node,
    Edge,
    Thread,
    Annotation,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Edge => "edge",
            Self::Thread => "thread",
            Self::Annotation => "annotation",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage-level error. Every non-`NotFound` variant carries the operation
/// that failed.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: ResourceKind, id: Uuid },
    #[error("{context}: {source}")]
    Db {
        context: &'static str,
        #[source]
        source: DbError,
    },
    #[error("{context} `{}`: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid persisted archive data: {0}")]
    InvalidData(String),
    #[error("archive connection lock poisoned")]
    Poisoned,
}

impl ArchiveError {
    pub fn not_found(resource: ResourceKind, id: Uuid) -> Self {
        Self::NotFound { resource, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Storage port for one repository.
///
/// Implementations must tolerate concurrent calls for different entities.
/// Writes to the same entity are last-writer-wins.
pub trait Archive: Send + Sync {
    fn save_node(&self, node: &Node) -> ArchiveResult<()>;
    fn get_node(&self, id: NodeId) -> ArchiveResult<Node>;
    fn delete_node(&self, id: NodeId) -> ArchiveResult<()>;

    fn save_edge(&self, edge: &Edge) -> ArchiveResult<()>;
    fn get_edge(&self, id: EdgeId) -> ArchiveResult<Edge>;
    fn delete_edge(&self, id: EdgeId) -> ArchiveResult<()>;

    fn save_thread(&self, thread: &Thread) -> ArchiveResult<()>;
    fn get_thread(&self, id: ThreadId) -> ArchiveResult<Thread>;
    fn delete_thread(&self, id: ThreadId) -> ArchiveResult<()>;

    fn save_annotation(&self, annotation: &Annotation) -> ArchiveResult<()>;
    fn get_annotation(&self, id: NodeId) -> ArchiveResult<Annotation>;
    fn delete_annotation(&self, id: NodeId) -> ArchiveResult<()>;

    /// Lists every edge whose source or target is `id`.
    fn edges_by_node(&self, id: NodeId) -> ArchiveResult<Vec<Edge>>;
    /// Deletes every edge whose source or target is `id`; returns the count.
    fn delete_edges_by_node(&self, id: NodeId) -> ArchiveResult<usize>;
}
