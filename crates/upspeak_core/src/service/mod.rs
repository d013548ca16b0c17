//! Bus-facing services.
//!
//! # Responsibility
//! - Bridge bus subjects to repository command handling.
//! - React to domain events with follow-up storage work.
//!
//! # Invariants
//! - Services never propagate failures back to the bus; they log and drop.
//! - Bus closures hold weak references so a dropped service or listener stops
//!   handling; the owner keeps the `Arc` alive.

pub mod cascade;
pub mod command_service;

pub use cascade::{CascadeDeleteListener, CascadeOutcome};
pub use command_service::CommandService;
