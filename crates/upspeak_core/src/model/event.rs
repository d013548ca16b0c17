//! Event envelope and type-directed payload registry.
//!
//! # Responsibility
//! - Define the single wire format shared by commands and domain events:
//!   `{"id": ..., "type": ..., "payload": ...}`.
//! - Map every registered type tag to exactly one payload shape.
//!
//! # Invariants
//! - Decoding looks up the payload shape for `type` before touching the
//!   payload; an unregistered tag is a hard error, never a silent no-op.
//! - Encoding serializes the typed payload first, then wraps it with a fresh
//!   id and its type tag.

use crate::model::edge::{Edge, EdgeId};
use crate::model::new_id;
use crate::model::node::{Node, NodeId};
use crate::model::thread::{Thread, ThreadId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier of one event.
pub type EventId = Uuid;

/// Errors raised while encoding or decoding events.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("unknown event type `{0}`")]
    UnknownType(String),
    #[error("invalid `{event_type}` payload: {source}")]
    Payload {
        event_type: EventType,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode `{event_type}` payload: {source}")]
    Encode {
        event_type: EventType,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid event envelope: {0}")]
    Envelope(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCreatePayload {
    pub node: Node,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdatePayload {
    pub node_id: NodeId,
    pub updated_node: Node,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDeletePayload {
    pub node_id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCreatePayload {
    pub edge: Edge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeUpdatePayload {
    pub edge_id: EdgeId,
    pub updated_edge: Edge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDeletePayload {
    pub edge_id: EdgeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadCreatePayload {
    pub thread: Thread,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadUpdatePayload {
    pub thread_id: ThreadId,
    pub updated_thread: Thread,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadDeletePayload {
    pub thread_id: ThreadId,
}

/// Declares the closed set of event types together with their payload shapes.
macro_rules! event_registry {
    ($($variant:ident => $payload:ty, $command:literal;)+) => {
        /// Closed enumeration of command and domain event types.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventType {
            $($variant,)+
        }

        impl EventType {
            /// Every registered type, commands first.
            pub const ALL: &'static [EventType] = &[$(EventType::$variant,)+];

            /// Wire tag for this type.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)+
                }
            }

            /// Resolves a wire tag; `None` for unregistered tags.
            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $(stringify!($variant) => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Returns whether this type is an inbound command.
            pub fn is_command(self) -> bool {
                match self {
                    $(Self::$variant => $command,)+
                }
            }

            /// Decodes `raw` into the payload shape registered for this type.
            pub fn decode_payload(self, raw: &Value) -> Result<Payload, EventError> {
                let wrap = move |source| EventError::Payload { event_type: self, source };
                match self {
                    $(Self::$variant => <$payload>::deserialize(raw)
                        .map(Payload::$variant)
                        .map_err(wrap),)+
                }
            }
        }

        /// Typed payload, one variant per [`EventType`].
        #[derive(Debug, Clone, PartialEq)]
        pub enum Payload {
            $($variant($payload),)+
        }

        impl Payload {
            pub fn event_type(&self) -> EventType {
                match self {
                    $(Self::$variant(_) => EventType::$variant,)+
                }
            }

            fn to_raw(&self) -> Result<Value, serde_json::Error> {
                match self {
                    $(Self::$variant(inner) => serde_json::to_value(inner),)+
                }
            }
        }
    };
}

event_registry! {
    CreateNode => NodeCreatePayload, true;
    UpdateNode => NodeUpdatePayload, true;
    DeleteNode => NodeDeletePayload, true;
    CreateEdge => EdgeCreatePayload, true;
    UpdateEdge => EdgeUpdatePayload, true;
    DeleteEdge => EdgeDeletePayload, true;
    CreateThread => ThreadCreatePayload, true;
    UpdateThread => ThreadUpdatePayload, true;
    DeleteThread => ThreadDeletePayload, true;
    NodeCreated => NodeCreatePayload, false;
    NodeUpdated => NodeUpdatePayload, false;
    NodeDeleted => NodeDeletePayload, false;
    EdgeCreated => EdgeCreatePayload, false;
    EdgeUpdated => EdgeUpdatePayload, false;
    EdgeDeleted => EdgeDeletePayload, false;
    ThreadCreated => ThreadCreatePayload, false;
    ThreadUpdated => ThreadUpdatePayload, false;
    ThreadDeleted => ThreadDeletePayload, false;
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw event envelope as it travels on the bus.
///
/// `event_type` stays a plain string so that unregistered tags survive
/// envelope decoding and can be rejected by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    /// Encodes `payload` and wraps it with a fresh id and its type tag.
    pub fn new(payload: Payload) -> Result<Self, EventError> {
        let event_type = payload.event_type();
        let raw = payload
            .to_raw()
            .map_err(|source| EventError::Encode { event_type, source })?;
        Ok(Self {
            id: new_id(),
            event_type: event_type.as_str().to_string(),
            payload: raw,
        })
    }

    /// Returns the registered type, if any.
    pub fn kind(&self) -> Option<EventType> {
        EventType::parse(&self.event_type)
    }

    /// Decodes the payload into the shape registered for `event_type`.
    pub fn decode(&self) -> Result<Payload, EventError> {
        let event_type = self
            .kind()
            .ok_or_else(|| EventError::UnknownType(self.event_type.clone()))?;
        event_type.decode_payload(&self.payload)
    }

    /// Parses an envelope from bus bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(data).map_err(EventError::Envelope)
    }

    /// Serializes the envelope to bus bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(EventError::Envelope)
    }
}
