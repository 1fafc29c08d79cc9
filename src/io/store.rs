use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::io::api::{ApiError, OrgApi};
use crate::io::lock::{LockError, StoreLock};
use crate::model::config::StoreConfig;
use crate::model::position::{Department, Identifiable, Position};
use crate::ops::normalize::normalize_str;

/// Error type for snapshot file I/O
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("could not read {path}: {source}")]
    ReadError { path: PathBuf, source: io::Error },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError { path: PathBuf, source: io::Error },
    #[error("could not serialize records: {0}")]
    SerializeError(#[from] serde_json::Error),
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e.to_string())
    }
}

/// Write `content` to `path` atomically using a temp file + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Every position and department the backend knows about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrgSnapshot {
    pub positions: Vec<Position>,
    pub departments: Vec<Department>,
}

impl OrgSnapshot {
    pub fn department(&self, id: &str) -> Option<&Department> {
        let id = normalize_str(id);
        self.departments.iter().find(|d| d.key() == id)
    }

    pub fn position(&self, id: &str) -> Option<&Position> {
        let id = normalize_str(id);
        self.positions.iter().find(|p| p.key() == id)
    }

    /// Positions of a department, inactive ones included
    pub fn positions_in(&self, department_id: &str) -> Vec<Position> {
        let department = normalize_str(department_id);
        self.positions
            .iter()
            .filter(|p| p.department_key() == department)
            .cloned()
            .collect()
    }

    /// Point `position_id` at `reports_to`, rejecting anything the backend
    /// would: unknown ids, self links, cross-department or inactive
    /// targets, and links that close a reporting cycle.
    pub fn assign_reporting(&mut self, position_id: &str, reports_to: Option<&str>) -> Result<(), ApiError> {
        let position_id = normalize_str(position_id);
        let position = self
            .position(&position_id)
            .ok_or_else(|| ApiError::PositionNotFound(position_id.clone()))?;
        let department = position.department_key();

        let new_parent = match reports_to.map(normalize_str).filter(|t| !t.is_empty()) {
            None => Identifiable::Missing,
            Some(target_id) => {
                if target_id == position_id {
                    return Err(ApiError::SelfReport(position_id));
                }
                let target = self
                    .position(&target_id)
                    .ok_or_else(|| ApiError::PositionNotFound(target_id.clone()))?;
                if target.department_key() != department {
                    return Err(ApiError::OutsideDepartment {
                        position: target_id,
                        department,
                    });
                }
                if !target.is_active {
                    return Err(ApiError::Inactive(target_id));
                }
                if self.reaches(&target_id, &position_id, &department) {
                    return Err(ApiError::WouldCreateCycle {
                        position: position_id,
                        target: target_id,
                    });
                }
                Identifiable::Bare(target_id)
            }
        };

        if let Some(p) = self.positions.iter_mut().find(|p| p.key() == position_id) {
            p.reports_to_position_id = new_parent;
        }
        Ok(())
    }

    /// Set or clear a department's head.
    pub fn assign_head(&mut self, department_id: &str, head: Option<&str>) -> Result<(), ApiError> {
        let department_id = normalize_str(department_id);
        if self.department(&department_id).is_none() {
            return Err(ApiError::DepartmentNotFound(department_id));
        }

        let new_head = match head.map(normalize_str).filter(|h| !h.is_empty()) {
            None => Identifiable::Missing,
            Some(head_id) => {
                let position = self
                    .position(&head_id)
                    .ok_or_else(|| ApiError::PositionNotFound(head_id.clone()))?;
                if position.department_key() != department_id {
                    return Err(ApiError::OutsideDepartment {
                        position: head_id,
                        department: department_id,
                    });
                }
                if !position.is_active {
                    return Err(ApiError::Inactive(head_id));
                }
                Identifiable::Bare(head_id)
            }
        };

        if let Some(d) = self.departments.iter_mut().find(|d| d.key() == department_id) {
            d.head_position_id = new_head;
        }
        Ok(())
    }

    /// Whether following reports-to pointers up from `from` reaches `target`.
    /// The department head's pointer is not followed.
    fn reaches(&self, from: &str, target: &str, department: &str) -> bool {
        let head = self.department(department).and_then(Department::head_key);
        let mut visited = HashSet::new();
        let mut current = Some(from.to_string());
        while let Some(id) = current {
            if id == target {
                return true;
            }
            if head.as_deref() == Some(id.as_str()) || !visited.insert(id.clone()) {
                return false;
            }
            current = self.position(&id).and_then(Position::parent_key);
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Paths of the JSON record files inside an org/ directory.
#[derive(Debug, Clone)]
struct SnapshotFiles {
    org_dir: PathBuf,
    positions: PathBuf,
    departments: PathBuf,
    lock_timeout: Duration,
}

enum Backing {
    Memory(Mutex<OrgSnapshot>),
    Files(SnapshotFiles),
}

/// An [`OrgApi`] backed by JSON files (or memory) that validates writes the
/// way the remote service does.
pub struct SnapshotStore {
    backing: Backing,
}

impl SnapshotStore {
    pub fn in_memory(positions: Vec<Position>, departments: Vec<Department>) -> Self {
        SnapshotStore {
            backing: Backing::Memory(Mutex::new(OrgSnapshot {
                positions,
                departments,
            })),
        }
    }

    /// Open the record files of an org/ directory. Missing files read as empty.
    pub fn open(org_dir: &Path, config: &StoreConfig) -> Result<Self, StoreError> {
        let files = SnapshotFiles {
            org_dir: org_dir.to_path_buf(),
            positions: org_dir.join(&config.positions_file),
            departments: org_dir.join(&config.departments_file),
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
        };
        // Fail early on unreadable files rather than on the first request
        read_files(&files)?;
        Ok(SnapshotStore {
            backing: Backing::Files(files),
        })
    }

    /// A fresh copy of everything in the store.
    pub fn snapshot(&self) -> Result<OrgSnapshot, StoreError> {
        match &self.backing {
            Backing::Memory(state) => Ok(lock_state(state).clone()),
            Backing::Files(files) => read_files(files),
        }
    }

    /// Current snapshot for an async caller. File reads run on the blocking pool.
    async fn load(&self) -> Result<OrgSnapshot, ApiError> {
        match &self.backing {
            Backing::Memory(state) => {
                let snapshot = lock_state(state).clone();
                Ok(snapshot)
            }
            Backing::Files(files) => {
                let files = files.clone();
                off_runtime(move || read_files(&files).map_err(ApiError::from)).await
            }
        }
    }

    /// Apply `f` to the current snapshot and commit only if it succeeds.
    ///
    /// In file mode the lock wait and the read-modify-write run on the
    /// blocking pool, so concurrent gestures on one runtime keep moving.
    async fn mutate<F>(&self, f: F) -> Result<(), ApiError>
    where
        F: FnOnce(&mut OrgSnapshot) -> Result<(), ApiError> + Send + 'static,
    {
        match &self.backing {
            Backing::Memory(state) => {
                let mut state = lock_state(state);
                let mut next = state.clone();
                f(&mut next)?;
                *state = next;
                Ok(())
            }
            Backing::Files(files) => {
                let files = files.clone();
                off_runtime(move || {
                    let _lock = StoreLock::acquire(&files.org_dir, files.lock_timeout)
                        .map_err(StoreError::from)?;
                    let mut next = read_files(&files)?;
                    f(&mut next)?;
                    write_files(&files, &next)?;
                    Ok(())
                })
                .await
            }
        }
    }
}

async fn off_runtime<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Store(e.to_string()))?
}

fn lock_state(state: &Mutex<OrgSnapshot>) -> MutexGuard<'_, OrgSnapshot> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn read_files(files: &SnapshotFiles) -> Result<OrgSnapshot, StoreError> {
    Ok(OrgSnapshot {
        positions: read_records(&files.positions)?,
        departments: read_records(&files.departments)?,
    })
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).map_err(|e| StoreError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&text).map_err(|e| StoreError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_files(files: &SnapshotFiles, snapshot: &OrgSnapshot) -> Result<(), StoreError> {
    write_records(&files.positions, &snapshot.positions)?;
    write_records(&files.departments, &snapshot.departments)?;
    debug!(dir = %files.org_dir.display(), "wrote snapshot");
    Ok(())
}

fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let mut text = serde_json::to_string_pretty(records)?;
    text.push('\n');
    atomic_write(path, text.as_bytes()).map_err(|e| StoreError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

#[async_trait]
impl OrgApi for SnapshotStore {
    async fn positions_by_department(&self, department_id: &str) -> Result<Vec<Position>, ApiError> {
        Ok(self.load().await?.positions_in(department_id))
    }

    async fn departments(&self) -> Result<Vec<Department>, ApiError> {
        Ok(self.load().await?.departments)
    }

    async fn assign_reporting_position(
        &self,
        position_id: &str,
        reports_to: Option<&str>,
    ) -> Result<(), ApiError> {
        let position_id = position_id.to_string();
        let reports_to = reports_to.map(str::to_string);
        self.mutate(move |s| s.assign_reporting(&position_id, reports_to.as_deref()))
            .await
    }

    async fn assign_department_head(
        &self,
        department_id: &str,
        head_position_id: Option<&str>,
    ) -> Result<(), ApiError> {
        let department_id = department_id.to_string();
        let head_position_id = head_position_id.map(str::to_string);
        self.mutate(move |s| s.assign_head(&department_id, head_position_id.as_deref()))
            .await
    }
}
