//! Process configuration loaded from JSON.

use crate::model::edge::EdgeWeights;
use crate::model::new_id;
use crate::repo::RepoId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

const DEFAULT_ARCHIVE_PATH: &str = "./data";
const DEFAULT_REPO_NAME: &str = "default";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("repository {name:?} has an invalid id {id:?}")]
    InvalidRepoId { name: String, id: String },
    #[error("repository name is invalid: {0:?}")]
    InvalidRepoName(String),
    #[error("repository configured twice: {0}")]
    DuplicateRepo(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub archive: ArchiveConfig,
    pub repos: Vec<RepoConfig>,
    pub edge_weights: EdgeWeights,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Parent directory; each repository gets `<path>/<name>`.
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

/// One repository with its id resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRepo {
    pub id: RepoId,
    pub name: String,
    pub archive_root: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            archive: ArchiveConfig::default(),
            repos: vec![RepoConfig {
                id: None,
                name: DEFAULT_REPO_NAME.to_string(),
            }],
            edge_weights: EdgeWeights::default(),
            log_level: None,
            log_dir: None,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_ARCHIVE_PATH),
        }
    }
}

impl CoreConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Resolves repository ids and archive roots.
    ///
    /// Missing ids are generated; names double as directory names and must be
    /// unique, as must explicit ids.
    pub fn resolve_repos(&self) -> Result<Vec<ResolvedRepo>, ConfigError> {
        let mut names = BTreeSet::new();
        let mut ids = BTreeSet::new();
        let mut resolved = Vec::with_capacity(self.repos.len());

        for repo in &self.repos {
            let name = repo.name.trim();
            if !is_valid_repo_name(name) {
                return Err(ConfigError::InvalidRepoName(repo.name.clone()));
            }
            if !names.insert(name.to_string()) {
                return Err(ConfigError::DuplicateRepo(name.to_string()));
            }

            let id = match repo.id.as_deref() {
                Some(raw) => Uuid::parse_str(raw.trim())
                    .ok()
                    .filter(|id| !id.is_nil())
                    .ok_or_else(|| ConfigError::InvalidRepoId {
                        name: name.to_string(),
                        id: raw.to_string(),
                    })?,
                None => new_id(),
            };
            if !ids.insert(id) {
                return Err(ConfigError::DuplicateRepo(id.to_string()));
            }

            resolved.push(ResolvedRepo {
                id,
                name: name.to_string(),
                archive_root: self.archive.path.join(name),
            });
        }

        Ok(resolved)
    }
}

fn is_valid_repo_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = CoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.archive.path, PathBuf::from("./data"));

        let repos = config.resolve_repos().unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].name, "default");
        assert_eq!(repos[0].archive_root, PathBuf::from("./data/default"));
    }

    #[test]
    fn explicit_values_are_kept() {
        let config = CoreConfig::from_json_str(
            r#"{
                "archive": {"path": "/srv/upspeak"},
                "repos": [{"id": "0190a3c4-8e2f-7000-8000-000000000001", "name": "notes"}],
                "edge_weights": {"reply": 0.9},
                "log_level": "debug"
            }"#,
        )
        .unwrap();

        assert_eq!(config.edge_weights.reply, 0.9);
        assert_eq!(config.edge_weights.child, 1.0);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        let repos = config.resolve_repos().unwrap();
        assert_eq!(
            repos[0].id.to_string(),
            "0190a3c4-8e2f-7000-8000-000000000001"
        );
        assert_eq!(repos[0].archive_root, PathBuf::from("/srv/upspeak/notes"));
    }

    #[test]
    fn bad_repo_entries_are_rejected() {
        let bad_id = CoreConfig::from_json_str(r#"{"repos": [{"id": "nope", "name": "a"}]}"#)
            .unwrap()
            .resolve_repos()
            .unwrap_err();
        assert!(matches!(bad_id, ConfigError::InvalidRepoId { .. }));

        let duplicate =
            CoreConfig::from_json_str(r#"{"repos": [{"name": "a"}, {"name": "a"}]}"#)
                .unwrap()
                .resolve_repos()
                .unwrap_err();
        assert!(matches!(duplicate, ConfigError::DuplicateRepo(name) if name == "a"));

        let traversal = CoreConfig::from_json_str(r#"{"repos": [{"name": "../x"}]}"#)
            .unwrap()
            .resolve_repos()
            .unwrap_err();
        assert!(matches!(traversal, ConfigError::InvalidRepoName(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = CoreConfig::from_json_file("/definitely/missing/upspeak.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { ref path, .. } if path.ends_with("upspeak.json")));
    }
}
