//! Explicit repository registry, built once at startup.

use crate::repo::Repository;
use log::info;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub type RepoId = Uuid;

/// Registration and lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("repository id is invalid: {0}")]
    InvalidRepositoryId(RepoId),
    #[error("repository id already registered: {0}")]
    DuplicateRepositoryId(RepoId),
    #[error("repository not found: {0}")]
    RepositoryNotFound(RepoId),
}

/// Mapping from repository id to its repository.
///
/// Populated during startup and shared read-only afterwards.
#[derive(Debug, Default)]
pub struct RepositoryRegistry {
    repositories: BTreeMap<RepoId, Arc<Repository>>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one repository under its own id.
    pub fn register(&mut self, repository: Repository) -> Result<Arc<Repository>, RegistryError> {
        let repo_id = repository.id();
        if repo_id.is_nil() {
            return Err(RegistryError::InvalidRepositoryId(repo_id));
        }
        if self.repositories.contains_key(&repo_id) {
            return Err(RegistryError::DuplicateRepositoryId(repo_id));
        }

        let repository = Arc::new(repository);
        self.repositories.insert(repo_id, Arc::clone(&repository));
        info!(
            "event=repo_register module=registry status=ok repo_id={} name={}",
            repo_id,
            repository.name()
        );
        Ok(repository)
    }

    pub fn get(&self, repo_id: RepoId) -> Result<Arc<Repository>, RegistryError> {
        self.repositories
            .get(&repo_id)
            .cloned()
            .ok_or(RegistryError::RepositoryNotFound(repo_id))
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    /// Returns sorted repository ids.
    pub fn repository_ids(&self) -> Vec<RepoId> {
        self.repositories.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Repository>> {
        self.repositories.values()
    }

    /// Drops every registration; returns how many were released.
    pub fn shutdown(&mut self) -> usize {
        let released = self.repositories.len();
        self.repositories.clear();
        info!("event=registry_shutdown module=registry status=ok released={released}");
        released
    }
}
