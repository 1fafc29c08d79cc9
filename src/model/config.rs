use serde::{Deserialize, Serialize};

/// Configuration from org/org.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgConfig {
    pub org: OrgInfo,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgInfo {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Position records, relative to org/
    #[serde(default = "default_positions_file")]
    pub positions_file: String,
    /// Department records, relative to org/
    #[serde(default = "default_departments_file")]
    pub departments_file: String,
    /// How long a write waits for another process's lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            positions_file: default_positions_file(),
            departments_file: default_departments_file(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

fn default_positions_file() -> String {
    "positions.json".to_string()
}

fn default_departments_file() -> String {
    "departments.json".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Reject a reparent that would hang a position under its own descendant
    #[serde(default = "default_true")]
    pub cycle_check: bool,
    /// Department used by commands when none is given
    #[serde(default)]
    pub default_department: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cycle_check: true,
            default_department: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        JournalConfig { enabled: true }
    }
}

fn default_true() -> bool {
    true
}
