//! Inbound command routing.
//!
//! # Responsibility
//! - Subscribe each registered repository to its inbound subject.
//! - Decode, dispatch, and publish the resulting domain event outbound.
//!
//! # Invariants
//! - One inbound message yields at most one outbound message.
//! - Failures are logged with the repository id and dropped.

use crate::bus::{
    inbound_subject, outbound_subject, BusError, LocalBus, Message, Publisher, SubscriptionId,
};
use crate::model::event::Event;
use crate::repo::{RepoError, RepoId, RepoResult, RepositoryRegistry};
use log::{error, info};
use std::sync::{Arc, Weak};

/// Routes `repos.<id>.in` messages through the registry.
pub struct CommandService {
    registry: Arc<RepositoryRegistry>,
    publisher: Arc<dyn Publisher>,
}

impl CommandService {
    pub fn new(registry: Arc<RepositoryRegistry>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            registry,
            publisher,
        }
    }

    /// Handles one inbound payload for `repo_id` and publishes the result.
    pub fn handle_message(&self, repo_id: RepoId, data: &[u8]) -> RepoResult<Event> {
        let repository = self
            .registry
            .get(repo_id)
            .map_err(|_| RepoError::UnknownRepository(repo_id))?;
        let command = Event::from_slice(data).map_err(RepoError::Unmarshal)?;
        let fact = repository.handle_input_event(&command)?;

        let bytes = fact.to_vec().map_err(RepoError::EventCreation)?;
        self.publisher
            .publish(&outbound_subject(repo_id), &bytes)
            .map_err(RepoError::Publish)?;
        Ok(fact)
    }

    /// Subscribes every registered repository's inbound subject on `bus`.
    ///
    /// The subscriptions hold a weak reference; once the last `Arc` to this
    /// service is dropped, inbound messages are ignored.
    pub fn attach(self: &Arc<Self>, bus: &LocalBus) -> Result<Vec<SubscriptionId>, BusError> {
        let mut subscriptions = Vec::with_capacity(self.registry.len());
        for repo_id in self.registry.repository_ids() {
            let service: Weak<Self> = Arc::downgrade(self);
            let subject = inbound_subject(repo_id);
            let id = bus.subscribe(&subject, move |message: &Message| {
                if let Some(service) = service.upgrade() {
                    service.on_message(repo_id, message);
                }
            })?;
            info!("event=command_attach module=service status=ok repo_id={repo_id} subject={subject}");
            subscriptions.push(id);
        }
        Ok(subscriptions)
    }

    fn on_message(&self, repo_id: RepoId, message: &Message) {
        if let Err(err) = self.handle_message(repo_id, &message.data) {
            error!(
                "event=command_handle module=service status=dropped repo_id={repo_id} subject={} error={err}",
                message.subject
            );
        }
    }
}
