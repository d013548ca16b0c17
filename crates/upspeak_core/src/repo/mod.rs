//! Command handling aggregate and the process-wide repository registry.
//!
//! # Responsibility
//! - Turn one command event into exactly one archive mutation and exactly one
//!   domain event.
//! - Hold the explicit mapping from repository id to its repository.
//!
//! # Invariants
//! - The repository never recovers locally from decode or archive failures;
//!   it returns a typed [`RepoError`] to its caller.
//! - Unregistered event types are rejected before any archive call.

pub mod registry;
pub mod repository;

use crate::archive::{ArchiveError, ResourceKind};
use crate::bus::BusError;
use crate::model::event::EventError;
use thiserror::Error;
use uuid::Uuid;

pub use registry::{RegistryError, RepoId, RepositoryRegistry};
pub use repository::Repository;

pub type RepoResult<T> = Result<T, RepoError>;

/// Error taxonomy surfaced to callers of a repository.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("not found error: could not find {resource} {id}")]
    NotFound { resource: ResourceKind, id: Uuid },
    #[error("unmarshal error: {0}")]
    Unmarshal(#[source] EventError),
    #[error("save error: {0}")]
    Save(#[source] ArchiveError),
    #[error("delete error: {0}")]
    Delete(#[source] ArchiveError),
    #[error("read error: {0}")]
    Read(#[source] ArchiveError),
    #[error("event creation error: {0}")]
    EventCreation(#[source] EventError),
    #[error("publish error: {0}")]
    Publish(#[source] BusError),
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
    #[error("unknown repository: {0}")]
    UnknownRepository(RepoId),
}

impl RepoError {
    /// Maps a read failure, keeping archive not-found distinct.
    pub(crate) fn from_read(err: ArchiveError) -> Self {
        match err {
            ArchiveError::NotFound { resource, id } => Self::NotFound { resource, id },
            other => Self::Read(other),
        }
    }
}
