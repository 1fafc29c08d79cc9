use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::io::api::{ApiError, HostSignals, OrgApi};
use crate::model::config::EngineConfig;
use crate::model::position::Identifiable;
use crate::ops::pending::{BusyConflict, PendingOperationTracker};
use crate::ops::view::{DepartmentView, load_department};

// ---------------------------------------------------------------------------
// Gestures and plans
// ---------------------------------------------------------------------------

/// Where a dragged position was dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum DropTarget {
    Position(Identifiable),
    /// Dropped outside any node: detach from its parent
    EmptyArea,
}

/// A drag-and-drop gesture as delivered by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct DragGesture {
    pub source: Identifiable,
    pub target: DropTarget,
}

impl DragGesture {
    /// Drag `source` onto `target`
    pub fn onto(source: impl Into<Identifiable>, target: impl Into<Identifiable>) -> Self {
        DragGesture {
            source: source.into(),
            target: DropTarget::Position(target.into()),
        }
    }

    /// Drop `source` on empty space
    pub fn detach(source: impl Into<Identifiable>) -> Self {
        DragGesture {
            source: source.into(),
            target: DropTarget::EmptyArea,
        }
    }
}

/// A single write against the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum RemoteCall {
    AssignReportingPosition {
        position: String,
        reports_to: Option<String>,
    },
    AssignDepartmentHead {
        department: String,
        head: Option<String>,
    },
}

impl RemoteCall {
    fn link(position: &str, reports_to: Option<&str>) -> Self {
        RemoteCall::AssignReportingPosition {
            position: position.to_string(),
            reports_to: reports_to.map(str::to_string),
        }
    }

    fn head(department: &str, head: Option<&str>) -> Self {
        RemoteCall::AssignDepartmentHead {
            department: department.to_string(),
            head: head.map(str::to_string),
        }
    }
}

impl fmt::Display for RemoteCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteCall::AssignReportingPosition { position, reports_to } => write!(
                f,
                "assign {} to report to {}",
                position,
                reports_to.as_deref().unwrap_or("nobody")
            ),
            RemoteCall::AssignDepartmentHead { department, head } => write!(
                f,
                "assign head of {} to {}",
                department,
                head.as_deref().unwrap_or("nobody")
            ),
        }
    }
}

/// Whether a failed step aborts its branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Authoritative,
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub call: RemoteCall,
    pub kind: StepKind,
}

impl Step {
    fn authoritative(call: RemoteCall) -> Self {
        Step {
            call,
            kind: StepKind::Authoritative,
        }
    }

    fn best_effort(call: RemoteCall) -> Self {
        Step {
            call,
            kind: StepKind::BestEffort,
        }
    }
}

/// Which mutation a gesture resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "branch", rename_all = "snake_case")]
pub enum Branch {
    /// The head was dragged onto another node
    PromoteTarget { old_head: String, new_head: String },
    /// A node was dragged onto the head
    PromoteSource { old_head: String, new_head: String },
    /// Neither end is the head
    Reparent { source: String, target: String },
    /// The head was dropped on empty space
    DetachHead { head: String },
    /// A non-head node was dropped on empty space
    Detach { source: String },
}

impl Branch {
    /// Remote calls for this branch, in dispatch order.
    pub fn steps(&self, department: &str) -> Vec<Step> {
        match self {
            Branch::PromoteTarget { old_head, new_head } => vec![
                Step::authoritative(RemoteCall::head(department, Some(new_head.as_str()))),
                Step::best_effort(RemoteCall::link(old_head, Some(new_head.as_str()))),
            ],
            Branch::PromoteSource { old_head, new_head } => vec![
                Step::best_effort(RemoteCall::link(new_head, None)),
                Step::authoritative(RemoteCall::head(department, Some(new_head.as_str()))),
                Step::best_effort(RemoteCall::link(old_head, Some(new_head.as_str()))),
            ],
            Branch::Reparent { source, target } => {
                vec![Step::authoritative(RemoteCall::link(source, Some(target.as_str())))]
            }
            Branch::DetachHead { head } => vec![
                Step::authoritative(RemoteCall::head(department, None)),
                Step::best_effort(RemoteCall::link(head, None)),
            ],
            Branch::Detach { source } => vec![Step::authoritative(RemoteCall::link(source, None))],
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why a gesture was ignored without touching the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Source and target are the same position
    SameNode,
    /// A position named by the gesture has an operation in flight
    Busy(BusyConflict),
}

/// A best-effort follow-up call that failed. The authoritative change stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainingFailure {
    pub call: RemoteCall,
    #[serde(serialize_with = "serialize_display")]
    pub error: ApiError,
}

fn serialize_display<S: serde::Serializer>(error: &ApiError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReparentOutcome {
    pub branch: Branch,
    /// Every call dispatched, in order
    pub issued: Vec<RemoteCall>,
    pub warnings: Vec<ChainingFailure>,
    /// `Some(new head)` when the head pointer changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_head: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reparented {
    Skipped(SkipReason),
    Applied(ReparentOutcome),
}

/// Error type for reparent operations
#[derive(Debug, thiserror::Error)]
pub enum ReparentError {
    #[error("cannot move {position} under {target}: {target} already reports to {position}")]
    CycleDetected { position: String, target: String },
    #[error("{position} is not an active position of department {department}")]
    UnknownPosition { position: String, department: String },
    #[error("{call} failed: {source}")]
    Authoritative {
        call: RemoteCall,
        source: ApiError,
        /// Best-effort calls that had already failed before the abort
        warnings: Vec<ChainingFailure>,
    },
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Resolve a gesture against a snapshot into a branch.
///
/// `source` and `target` are normalized ids and must differ. The cycle check
/// only applies to a plain reparent; head transfers never hang a node under
/// its own descendant in the rebuilt tree.
pub fn plan(
    view: &DepartmentView,
    source: &str,
    target: Option<&str>,
    cycle_check: bool,
) -> Result<Branch, ReparentError> {
    for id in std::iter::once(source).chain(target) {
        if view.position(id).is_none() {
            return Err(ReparentError::UnknownPosition {
                position: id.to_string(),
                department: view.department_id(),
            });
        }
    }

    let head = view.head();
    let is_head = |id: &str| head.as_deref() == Some(id);

    let branch = match target {
        None if is_head(source) => Branch::DetachHead {
            head: source.to_string(),
        },
        None => Branch::Detach {
            source: source.to_string(),
        },
        Some(target) if is_head(source) => Branch::PromoteTarget {
            old_head: source.to_string(),
            new_head: target.to_string(),
        },
        Some(target) if is_head(target) => Branch::PromoteSource {
            old_head: target.to_string(),
            new_head: source.to_string(),
        },
        Some(target) => {
            if cycle_check && reports_up_to(view, target, source) {
                return Err(ReparentError::CycleDetected {
                    position: source.to_string(),
                    target: target.to_string(),
                });
            }
            Branch::Reparent {
                source: source.to_string(),
                target: target.to_string(),
            }
        }
    };
    Ok(branch)
}

/// Whether `ancestor` is reached by following reports-to pointers up from
/// `from`. The walk stops at the department head, whose own pointer is not
/// part of the hierarchy, and at the first repeated node.
pub fn reports_up_to(view: &DepartmentView, from: &str, ancestor: &str) -> bool {
    let head = view.head();
    let mut visited = HashSet::new();
    let mut current = Some(from.to_string());

    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        if head.as_deref() == Some(id.as_str()) || !visited.insert(id.clone()) {
            return false;
        }
        current = view.position(&id).and_then(|p| p.parent_key());
    }
    false
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Turns drag gestures into ordered backend calls.
///
/// Owns the in-flight tracker, so gestures on disjoint positions can run
/// concurrently against one engine while overlapping ones are rejected.
pub struct ReparentEngine<A> {
    api: A,
    pending: PendingOperationTracker,
    config: EngineConfig,
}

impl<A: OrgApi> ReparentEngine<A> {
    pub fn new(api: A) -> Self {
        Self::with_config(api, EngineConfig::default())
    }

    pub fn with_config(api: A, config: EngineConfig) -> Self {
        ReparentEngine {
            api,
            pending: PendingOperationTracker::new(),
            config,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn pending(&self) -> &PendingOperationTracker {
        &self.pending
    }

    /// Re-fetch a department and rebuild its forest.
    pub async fn refresh(&self, department_id: &str) -> Result<DepartmentView, ApiError> {
        load_department(&self.api, department_id).await
    }

    /// Apply a gesture against the snapshot the host is currently showing.
    ///
    /// Self-drops and gestures touching a busy position are skipped without
    /// any remote call. Otherwise the branch's calls run in order; only the
    /// authoritative one can fail the operation. `on_update` fires whenever
    /// anything was dispatched, whatever the outcome.
    pub async fn reparent(
        &self,
        view: &DepartmentView,
        gesture: &DragGesture,
        signals: &dyn HostSignals,
    ) -> Result<Reparented, ReparentError> {
        let source = gesture.source.key();
        let target = match &gesture.target {
            DropTarget::Position(t) => Some(t.key()),
            DropTarget::EmptyArea => None,
        };

        if target.as_deref() == Some(source.as_str()) {
            debug!(position = %source, "dropped onto itself; ignoring");
            return Ok(Reparented::Skipped(SkipReason::SameNode));
        }

        let ids: Vec<&str> = std::iter::once(source.as_str())
            .chain(target.as_deref())
            .collect();
        let _guard = match self.pending.try_begin(&ids) {
            Ok(guard) => guard,
            Err(conflict) => {
                debug!(position = %conflict.0, "operation in flight; ignoring gesture");
                return Ok(Reparented::Skipped(SkipReason::Busy(conflict)));
            }
        };

        let branch = plan(view, &source, target.as_deref(), self.config.cycle_check)?;
        self.execute(&view.department_id(), branch, signals).await
    }

    async fn execute(
        &self,
        department: &str,
        branch: Branch,
        signals: &dyn HostSignals,
    ) -> Result<Reparented, ReparentError> {
        let mut issued = Vec::new();
        let mut warnings = Vec::new();
        let mut new_head = None;
        let mut failure = None;

        for step in branch.steps(department) {
            info!(call = %step.call, kind = ?step.kind, "dispatching");
            issued.push(step.call.clone());

            match self.dispatch(&step.call).await {
                Ok(()) => {
                    if let RemoteCall::AssignDepartmentHead { head, .. } = &step.call {
                        signals.on_head_changed(head.as_deref());
                        new_head = Some(head.clone());
                    }
                }
                Err(error) => match step.kind {
                    StepKind::Authoritative => {
                        warn!(call = %step.call, %error, "authoritative call failed; aborting");
                        failure = Some((step.call, error));
                        break;
                    }
                    StepKind::BestEffort => {
                        warn!(call = %step.call, %error, "follow-up call failed; keeping the change");
                        warnings.push(ChainingFailure {
                            call: step.call,
                            error,
                        });
                    }
                },
            }
        }

        signals.on_update();

        match failure {
            Some((call, source)) => Err(ReparentError::Authoritative {
                call,
                source,
                warnings,
            }),
            None => Ok(Reparented::Applied(ReparentOutcome {
                branch,
                issued,
                warnings,
                new_head,
            })),
        }
    }

    async fn dispatch(&self, call: &RemoteCall) -> Result<(), ApiError> {
        match call {
            RemoteCall::AssignReportingPosition { position, reports_to } => {
                self.api
                    .assign_reporting_position(position, reports_to.as_deref())
                    .await
            }
            RemoteCall::AssignDepartmentHead { department, head } => {
                self.api
                    .assign_department_head(department, head.as_deref())
                    .await
            }
        }
    }
}
