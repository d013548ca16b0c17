//! Startup and shutdown wiring for one process.
//!
//! # Responsibility
//! - Open one archive per configured repository and register it.
//! - Attach the command service and one cascade listener per repository.
//! - Tear subscriptions and registrations down in reverse order.

use crate::archive::{Archive, ArchiveError, LocalArchive};
use crate::bus::{
    inbound_subject, outbound_subject, BusError, LocalBus, Publisher, SubscriptionId,
};
use crate::config::{ConfigError, CoreConfig};
use crate::model::edge::EdgeWeights;
use crate::model::event::{Event, EventError};
use crate::repo::{RegistryError, RepoId, Repository, RepositoryRegistry};
use crate::service::{CascadeDeleteListener, CommandService};
use log::{info, warn};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Everything a running process holds on to.
pub struct Runtime {
    edge_weights: EdgeWeights,
    bus: Arc<LocalBus>,
    registry: Arc<RepositoryRegistry>,
    commands: Arc<CommandService>,
    listeners: Vec<Arc<CascadeDeleteListener>>,
    subscriptions: Vec<SubscriptionId>,
}

impl Runtime {
    /// Builds the registry from `config` and attaches all services to a
    /// fresh bus.
    pub fn start(config: &CoreConfig) -> Result<Self, RuntimeError> {
        let mut registry = RepositoryRegistry::new();
        let mut archives: Vec<(RepoId, Arc<dyn Archive>)> = Vec::new();

        for repo in config.resolve_repos()? {
            let archive: Arc<dyn Archive> = Arc::new(LocalArchive::open(&repo.archive_root)?);
            registry.register(
                Repository::new(repo.id, repo.name, Arc::clone(&archive))
                    .with_edge_weights(config.edge_weights),
            )?;
            archives.push((repo.id, archive));
        }

        let bus = Arc::new(LocalBus::new());
        let registry = Arc::new(registry);
        let commands = Arc::new(CommandService::new(
            Arc::clone(&registry),
            Arc::clone(&bus) as Arc<dyn Publisher>,
        ));

        let mut subscriptions = commands.attach(&bus)?;
        let mut listeners = Vec::with_capacity(archives.len());
        for (repo_id, archive) in archives {
            let listener = Arc::new(CascadeDeleteListener::new(archive));
            subscriptions.push(listener.attach(&bus, &outbound_subject(repo_id))?);
            listeners.push(listener);
        }

        info!(
            "event=runtime_start module=runtime status=ok repos={} subscriptions={}",
            registry.len(),
            subscriptions.len()
        );

        Ok(Self {
            edge_weights: config.edge_weights,
            bus,
            registry,
            commands,
            listeners,
            subscriptions,
        })
    }

    pub fn bus(&self) -> &Arc<LocalBus> {
        &self.bus
    }

    pub fn registry(&self) -> &RepositoryRegistry {
        &self.registry
    }

    pub fn edge_weights(&self) -> &EdgeWeights {
        &self.edge_weights
    }

    /// Publishes `command` on the inbound subject of `repo_id`.
    pub fn submit(&self, repo_id: RepoId, command: &Event) -> Result<(), RuntimeError> {
        let bytes = command.to_vec()?;
        self.bus.publish(&inbound_subject(repo_id), &bytes)?;
        Ok(())
    }

    /// Detaches every subscription and releases all repositories.
    pub fn shutdown(self) -> Result<usize, RuntimeError> {
        for id in &self.subscriptions {
            self.bus.unsubscribe(*id)?;
        }
        drop(self.listeners);
        drop(self.commands);

        let released = match Arc::try_unwrap(self.registry) {
            Ok(mut registry) => registry.shutdown(),
            Err(shared) => {
                warn!(
                    "event=runtime_shutdown module=runtime status=error reason=registry_shared repos={}",
                    shared.len()
                );
                0
            }
        };
        info!("event=runtime_shutdown module=runtime status=ok released={released}");
        Ok(released)
    }
}
