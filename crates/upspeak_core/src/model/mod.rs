//! Knowledge-graph domain model and event envelope.
//!
//! # Responsibility
//! - Define the value types persisted by an archive: nodes, edges, threads
//!   and annotations.
//! - Define the command/domain event envelope shared on the message bus.
//!
//! # Invariants
//! - Every entity is identified by a time-sortable UUIDv7.
//! - Model types carry no behavior beyond construction and (de)serialization.

pub mod annotation;
pub mod edge;
pub mod event;
pub mod node;
pub mod thread;

use uuid::Uuid;

/// Generates a fresh time-sortable identifier.
pub fn new_id() -> Uuid {
    Uuid::now_v7()
}
