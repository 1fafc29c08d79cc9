use async_trait::async_trait;

use crate::model::position::{Department, Position};

/// Errors reported by the position/department backend.
///
/// The engine surfaces these as-is; it never interprets them beyond deciding
/// whether the failed call was authoritative.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("position not found: {0}")]
    PositionNotFound(String),
    #[error("department not found: {0}")]
    DepartmentNotFound(String),
    #[error("position {position} is not in department {department}")]
    OutsideDepartment { position: String, department: String },
    #[error("position {0} is inactive")]
    Inactive(String),
    #[error("position {0} cannot report to itself")]
    SelfReport(String),
    #[error("{position} cannot report to {target}: {target} already reports to {position}")]
    WouldCreateCycle { position: String, target: String },
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("store error: {0}")]
    Store(String),
}

/// The remote Position/Department service.
#[async_trait]
pub trait OrgApi: Send + Sync {
    async fn positions_by_department(&self, department_id: &str) -> Result<Vec<Position>, ApiError>;

    async fn departments(&self) -> Result<Vec<Department>, ApiError>;

    /// Set or clear the reports-to pointer of a position.
    async fn assign_reporting_position(
        &self,
        position_id: &str,
        reports_to: Option<&str>,
    ) -> Result<(), ApiError>;

    /// Set or clear the head position of a department.
    async fn assign_department_head(
        &self,
        department_id: &str,
        head_position_id: Option<&str>,
    ) -> Result<(), ApiError>;
}

/// Outbound notifications to whatever is displaying the hierarchy.
pub trait HostSignals: Send + Sync {
    /// Re-fetch the department and rebuild the tree.
    fn on_update(&self);

    /// The department's head pointer changed.
    fn on_head_changed(&self, new_head: Option<&str>);
}

/// Signals that go nowhere.
pub struct NoSignals;

impl HostSignals for NoSignals {
    fn on_update(&self) {}
    fn on_head_changed(&self, _new_head: Option<&str>) {}
}
