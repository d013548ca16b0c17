//! Cascade delete of edges after a node is removed.
//!
//! Runs asynchronously to the deleting command: a `NodeDeleted` event seen on
//! an outbound subject removes every edge touching that node. Failures are
//! logged and dropped, so an edge may survive its endpoint.

use crate::archive::Archive;
use crate::bus::{BusError, LocalBus, Message, SubscriptionId};
use crate::model::event::{Event, EventType, NodeDeletePayload, Payload};
use log::{debug, error, info};
use std::sync::Arc;

/// What one observed event led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeOutcome {
    /// Not a `NodeDeleted` event.
    Ignored,
    /// Edges removed for the deleted node.
    Deleted(usize),
    /// Decode or storage failure, already logged.
    Failed,
}

pub struct CascadeDeleteListener {
    archive: Arc<dyn Archive>,
}

impl CascadeDeleteListener {
    pub fn new(archive: Arc<dyn Archive>) -> Self {
        Self { archive }
    }

    pub fn handle_message(&self, message: &Message) -> CascadeOutcome {
        match Event::from_slice(&message.data) {
            Ok(event) => self.on_event(&event),
            Err(err) => {
                error!(
                    "event=cascade_delete module=cascade status=error subject={} error={err}",
                    message.subject
                );
                CascadeOutcome::Failed
            }
        }
    }

    pub fn on_event(&self, event: &Event) -> CascadeOutcome {
        if event.kind() != Some(EventType::NodeDeleted) {
            return CascadeOutcome::Ignored;
        }

        let node_id = match event.decode() {
            Ok(Payload::NodeDeleted(NodeDeletePayload { node_id })) => node_id,
            Ok(_) => return CascadeOutcome::Ignored,
            Err(err) => {
                error!(
                    "event=cascade_delete module=cascade status=error event_id={} error={err}",
                    event.id
                );
                return CascadeOutcome::Failed;
            }
        };

        match self.archive.delete_edges_by_node(node_id) {
            Ok(removed) => {
                debug!(
                    "event=cascade_delete module=cascade status=ok node_id={node_id} removed={removed}"
                );
                CascadeOutcome::Deleted(removed)
            }
            Err(err) => {
                error!(
                    "event=cascade_delete module=cascade status=error node_id={node_id} error={err}"
                );
                CascadeOutcome::Failed
            }
        }
    }

    /// Subscribes to `pattern`, usually one repository's outbound subject.
    pub fn attach(self: &Arc<Self>, bus: &LocalBus, pattern: &str) -> Result<SubscriptionId, BusError> {
        let listener = Arc::downgrade(self);
        let id = bus.subscribe(pattern, move |message| {
            if let Some(listener) = listener.upgrade() {
                listener.handle_message(message);
            }
        })?;
        info!("event=cascade_attach module=cascade status=ok pattern={pattern}");
        Ok(id)
    }
}
