//! Repository aggregate: command dispatch over one archive.

use crate::archive::Archive;
use crate::model::annotation::Annotation;
use crate::model::edge::{Edge, EdgeId, EdgeWeights};
use crate::model::event::{
    EdgeCreatePayload, EdgeDeletePayload, EdgeUpdatePayload, Event, EventType, NodeCreatePayload,
    NodeDeletePayload, NodeUpdatePayload, Payload, ThreadCreatePayload, ThreadDeletePayload,
    ThreadUpdatePayload,
};
use crate::model::new_id;
use crate::model::node::{Node, NodeId};
use crate::model::thread::{Thread, ThreadId};
use crate::repo::{RepoError, RepoId, RepoResult};
use log::{debug, warn};
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// One logical repository bound to its archive.
pub struct Repository {
    id: RepoId,
    name: String,
    archive: Arc<dyn Archive>,
    edge_weights: EdgeWeights,
}

impl Debug for Repository {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Repository {
    pub fn new(id: RepoId, name: impl Into<String>, archive: Arc<dyn Archive>) -> Self {
        Self {
            id,
            name: name.into(),
            archive,
            edge_weights: EdgeWeights::default(),
        }
    }

    /// Weights applied to inbound edges that carry no `weight`.
    pub fn with_edge_weights(mut self, edge_weights: EdgeWeights) -> Self {
        self.edge_weights = edge_weights;
        self
    }

    pub fn id(&self) -> RepoId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn archive(&self) -> &Arc<dyn Archive> {
        &self.archive
    }

    /// Applies one command event and returns the matching domain event.
    ///
    /// Exactly one archive mutation happens on success. Unregistered and
    /// domain-event types fail with [`RepoError::UnknownEventType`] before the
    /// archive is touched.
    pub fn handle_input_event(&self, command: &Event) -> RepoResult<Event> {
        let event_type = command
            .kind()
            .filter(|kind| kind.is_command())
            .ok_or_else(|| RepoError::UnknownEventType(command.event_type.clone()))?;

        let mut raw = command.payload.clone();
        fill_missing_weights(event_type, &mut raw, &self.edge_weights);
        let payload = event_type
            .decode_payload(&raw)
            .map_err(RepoError::Unmarshal)?;

        let result = self.apply(payload).and_then(|fact| {
            Event::new(fact).map_err(RepoError::EventCreation)
        });

        match &result {
            Ok(event) => debug!(
                "event=command_handle module=repo status=ok repo_id={} command={} command_id={} event_id={}",
                self.id, event_type, command.id, event.id
            ),
            Err(err) => warn!(
                "event=command_handle module=repo status=error repo_id={} command={} command_id={} error={}",
                self.id, event_type, command.id, err
            ),
        }

        result
    }

    fn apply(&self, payload: Payload) -> RepoResult<Payload> {
        let fact = match payload {
            Payload::CreateNode(NodeCreatePayload { mut node }) => {
                assign_if_nil(&mut node.id);
                self.archive.save_node(&node).map_err(RepoError::Save)?;
                Payload::NodeCreated(NodeCreatePayload { node })
            }
            Payload::UpdateNode(NodeUpdatePayload {
                node_id,
                mut updated_node,
            }) => {
                updated_node.id = node_id;
                self.archive
                    .save_node(&updated_node)
                    .map_err(RepoError::Save)?;
                Payload::NodeUpdated(NodeUpdatePayload {
                    node_id,
                    updated_node,
                })
            }
            Payload::DeleteNode(NodeDeletePayload { node_id }) => {
                self.archive
                    .delete_node(node_id)
                    .map_err(RepoError::Delete)?;
                Payload::NodeDeleted(NodeDeletePayload { node_id })
            }
            Payload::CreateEdge(EdgeCreatePayload { mut edge }) => {
                assign_if_nil(&mut edge.id);
                self.archive.save_edge(&edge).map_err(RepoError::Save)?;
                Payload::EdgeCreated(EdgeCreatePayload { edge })
            }
            Payload::UpdateEdge(EdgeUpdatePayload {
                edge_id,
                mut updated_edge,
            }) => {
                updated_edge.id = edge_id;
                self.archive
                    .save_edge(&updated_edge)
                    .map_err(RepoError::Save)?;
                Payload::EdgeUpdated(EdgeUpdatePayload {
                    edge_id,
                    updated_edge,
                })
            }
            Payload::DeleteEdge(EdgeDeletePayload { edge_id }) => {
                self.archive
                    .delete_edge(edge_id)
                    .map_err(RepoError::Delete)?;
                Payload::EdgeDeleted(EdgeDeletePayload { edge_id })
            }
            Payload::CreateThread(ThreadCreatePayload { mut thread }) => {
                assign_if_nil(&mut thread.node.id);
                self.archive
                    .save_thread(&thread)
                    .map_err(RepoError::Save)?;
                Payload::ThreadCreated(ThreadCreatePayload { thread })
            }
            Payload::UpdateThread(ThreadUpdatePayload {
                thread_id,
                mut updated_thread,
            }) => {
                updated_thread.node.id = thread_id;
                self.archive
                    .save_thread(&updated_thread)
                    .map_err(RepoError::Save)?;
                Payload::ThreadUpdated(ThreadUpdatePayload {
                    thread_id,
                    updated_thread,
                })
            }
            Payload::DeleteThread(ThreadDeletePayload { thread_id }) => {
                self.archive
                    .delete_thread(thread_id)
                    .map_err(RepoError::Delete)?;
                Payload::ThreadDeleted(ThreadDeletePayload { thread_id })
            }
            other => {
                return Err(RepoError::UnknownEventType(
                    other.event_type().as_str().to_string(),
                ))
            }
        };

        Ok(fact)
    }

    pub fn get_node(&self, id: NodeId) -> RepoResult<Node> {
        self.archive.get_node(id).map_err(RepoError::from_read)
    }

    pub fn get_edge(&self, id: EdgeId) -> RepoResult<Edge> {
        self.archive.get_edge(id).map_err(RepoError::from_read)
    }

    pub fn get_thread(&self, id: ThreadId) -> RepoResult<Thread> {
        self.archive.get_thread(id).map_err(RepoError::from_read)
    }

    pub fn get_annotation(&self, id: NodeId) -> RepoResult<Annotation> {
        self.archive.get_annotation(id).map_err(RepoError::from_read)
    }

    /// Edges touching `id`, in either direction.
    pub fn edges_of(&self, id: NodeId) -> RepoResult<Vec<Edge>> {
        self.archive.edges_by_node(id).map_err(RepoError::Read)
    }
}

fn assign_if_nil(id: &mut Uuid) {
    if id.is_nil() {
        *id = new_id();
    }
}

/// Writes the configured weight into edge objects that omit one.
fn fill_missing_weights(event_type: EventType, raw: &mut Value, weights: &EdgeWeights) {
    let edges: Vec<&mut Value> = match event_type {
        EventType::CreateEdge => raw.get_mut("edge").into_iter().collect(),
        EventType::UpdateEdge => raw.get_mut("updated_edge").into_iter().collect(),
        EventType::CreateThread => thread_edges(raw.get_mut("thread")),
        EventType::UpdateThread => thread_edges(raw.get_mut("updated_thread")),
        _ => return,
    };

    for edge in edges {
        let Some(fields) = edge.as_object_mut() else {
            continue;
        };
        if fields.get("weight").is_some_and(|weight| !weight.is_null()) {
            continue;
        }
        let weight = weights.weight_for(fields.get("type").and_then(Value::as_str).unwrap_or(""));
        fields.insert("weight".to_string(), Value::from(weight));
    }
}

fn thread_edges(thread: Option<&mut Value>) -> Vec<&mut Value> {
    thread
        .and_then(|thread| thread.get_mut("edges"))
        .and_then(Value::as_array_mut)
        .map(|edges| edges.iter_mut().collect())
        .unwrap_or_default()
}
