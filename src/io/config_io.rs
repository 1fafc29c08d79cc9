use std::fs;
use std::path::{Path, PathBuf};

use crate::io::store::{SnapshotStore, StoreError};
use crate::model::config::OrgConfig;

/// Error type for locating and loading a workspace
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("not an orgtree workspace: no org/org.toml found (run `ot init`)")]
    NotAWorkspace,
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse org.toml: {0}")]
    ConfigParseError(#[from] toml::de::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A discovered workspace: the directory holding `org/` and its config.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub org_dir: PathBuf,
    pub config: OrgConfig,
}

impl Workspace {
    /// Open the position and department records.
    pub fn open_store(&self) -> Result<SnapshotStore, WorkspaceError> {
        Ok(SnapshotStore::open(&self.org_dir, &self.config.store)?)
    }
}

pub fn config_path(org_dir: &Path) -> PathBuf {
    org_dir.join("org.toml")
}

/// Walk up from `start` looking for a directory containing `org/org.toml`.
pub fn discover_workspace(start: &Path) -> Result<PathBuf, WorkspaceError> {
    let mut current = start.to_path_buf();
    loop {
        if config_path(&current.join("org")).is_file() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(WorkspaceError::NotAWorkspace);
        }
    }
}

pub fn read_config(org_dir: &Path) -> Result<OrgConfig, WorkspaceError> {
    let path = config_path(org_dir);
    let text = fs::read_to_string(&path).map_err(|e| WorkspaceError::ReadError {
        path: path.clone(),
        source: e,
    })?;
    Ok(toml::from_str(&text)?)
}

/// Discover and load the workspace enclosing `start`.
pub fn load_workspace(start: &Path) -> Result<Workspace, WorkspaceError> {
    let root = discover_workspace(start)?;
    let org_dir = root.join("org");
    let config = read_config(&org_dir)?;
    Ok(Workspace {
        root,
        org_dir,
        config,
    })
}
