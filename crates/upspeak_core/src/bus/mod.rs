//! In-process subject-addressed message bus.
//!
//! # Responsibility
//! - Route byte payloads to handlers whose subject pattern matches.
//! - Name the per-repository inbound and outbound subjects.
//!
//! # Invariants
//! - Subjects are dot-separated, non-empty tokens.
//! - `*` matches exactly one token; `>` matches one or more trailing tokens.
//! - Handlers run on the publishing thread, after the subscription lock is
//!   released, so a handler may publish or subscribe again.

use crate::repo::RepoId;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Prefix shared by every repository subject.
pub const REPOS_SUBJECT_PREFIX: &str = "repos";
/// Matches the outbound subject of every repository.
pub const OUTBOUND_WILDCARD: &str = "repos.*.out";

/// Subject carrying commands into repository `repo_id`.
pub fn inbound_subject(repo_id: RepoId) -> String {
    format!("{REPOS_SUBJECT_PREFIX}.{repo_id}.in")
}

/// Subject carrying domain events out of repository `repo_id`.
pub fn outbound_subject(repo_id: RepoId) -> String {
    format!("{REPOS_SUBJECT_PREFIX}.{repo_id}.out")
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("invalid subject: {0:?}")]
    InvalidSubject(String),
    #[error("invalid subscription pattern: {0:?}")]
    InvalidPattern(String),
    #[error("subscription table lock poisoned")]
    Poisoned,
}

/// One delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub data: Vec<u8>,
}

/// Outbound side of the bus, as seen by services that only emit.
pub trait Publisher: Send + Sync {
    fn publish(&self, subject: &str, data: &[u8]) -> Result<(), BusError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    pattern: String,
    handler: Handler,
}

/// Synchronous in-memory bus.
#[derive(Default)]
pub struct LocalBus {
    next_id: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every subject matching `pattern`.
    pub fn subscribe<F>(&self, pattern: &str, handler: F) -> Result<SubscriptionId, BusError>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        if !is_valid_pattern(pattern) {
            return Err(BusError::InvalidPattern(pattern.to_string()));
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscriptions = self.subscriptions.write().map_err(|_| BusError::Poisoned)?;
        subscriptions.push(Subscription {
            id,
            pattern: pattern.to_string(),
            handler: Arc::new(handler),
        });
        debug!("event=bus_subscribe module=bus status=ok pattern={pattern} subscription={}", id.0);
        Ok(id)
    }

    /// Removes one subscription; returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool, BusError> {
        let mut subscriptions = self.subscriptions.write().map_err(|_| BusError::Poisoned)?;
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        Ok(subscriptions.len() != before)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .read()
            .map(|subscriptions| subscriptions.len())
            .unwrap_or(0)
    }
}

impl Publisher for LocalBus {
    fn publish(&self, subject: &str, data: &[u8]) -> Result<(), BusError> {
        if !is_valid_subject(subject) {
            return Err(BusError::InvalidSubject(subject.to_string()));
        }

        let handlers: Vec<Handler> = {
            let subscriptions = self.subscriptions.read().map_err(|_| BusError::Poisoned)?;
            subscriptions
                .iter()
                .filter(|subscription| subject_matches(&subscription.pattern, subject))
                .map(|subscription| Arc::clone(&subscription.handler))
                .collect()
        };

        debug!(
            "event=bus_publish module=bus status=ok subject={subject} bytes={} receivers={}",
            data.len(),
            handlers.len()
        );

        let message = Message {
            subject: subject.to_string(),
            data: data.to_vec(),
        };
        for handler in handlers {
            handler(&message);
        }
        Ok(())
    }
}

/// Returns whether `subject` is matched by subscription `pattern`.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn is_valid_subject(subject: &str) -> bool {
    subject
        .split('.')
        .all(|token| !token.is_empty() && token != "*" && token != ">")
}

fn is_valid_pattern(pattern: &str) -> bool {
    let tokens: Vec<&str> = pattern.split('.').collect();
    let last = tokens.len() - 1;
    tokens
        .iter()
        .enumerate()
        .all(|(index, token)| !token.is_empty() && (*token != ">" || index == last))
}
