//! Core of the Upspeak knowledge repository.
//! Nodes, edges, threads, and annotations are changed only through command
//! events; every accepted command yields exactly one domain event.

pub mod archive;
pub mod bus;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod runtime;
pub mod service;

pub use archive::{Archive, ArchiveError, ArchiveResult, LocalArchive, ResourceKind};
pub use bus::{
    inbound_subject, outbound_subject, BusError, LocalBus, Message, Publisher, SubscriptionId,
    OUTBOUND_WILDCARD,
};
pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::annotation::Annotation;
pub use model::edge::{Edge, EdgeId, EdgeKind, EdgeWeights};
pub use model::event::{Event, EventError, EventType, Payload};
pub use model::node::{Node, NodeId};
pub use model::thread::{Thread, ThreadId, ThreadMetadata};
pub use repo::{RegistryError, RepoError, RepoId, RepoResult, Repository, RepositoryRegistry};
pub use runtime::{Runtime, RuntimeError};
pub use service::{CascadeDeleteListener, CascadeOutcome, CommandService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
