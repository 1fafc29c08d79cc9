use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::Serialize;

use crate::io::store::OrgSnapshot;
use crate::model::position::{Department, Position};
use crate::ops::tree_builder::build_for_department;

/// Structured result from `ot check`, suitable for --json output.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    pub valid: bool,
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
}

/// Something that makes the hierarchy wrong.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckError {
    /// Reports to a position that does not exist
    DanglingReportsTo {
        department_id: String,
        position_id: String,
        reports_to: String,
    },
    /// Reports to a position of another department
    CrossDepartmentLink {
        department_id: String,
        position_id: String,
        reports_to: String,
        other_department_id: String,
    },
    /// Positions whose reports-to pointers loop, in walk order
    ReportingCycle {
        department_id: String,
        positions: Vec<String>,
    },
    /// The head pointer names no position of the department
    HeadMissing {
        department_id: String,
        head: String,
    },
    HeadInactive {
        department_id: String,
        head: String,
    },
    DuplicateId {
        department_id: String,
        position_id: String,
        count: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckWarning {
    ReportsToInactive {
        department_id: String,
        position_id: String,
        reports_to: String,
    },
    /// Shown as an orphan root (or under one) instead of under the head
    Unreachable {
        department_id: String,
        position_id: String,
    },
    NoHead { department_id: String },
    /// Position names a department that does not exist
    UnknownDepartment {
        position_id: String,
        department_id: String,
    },
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Validate every department, plus positions that belong to none.
pub fn check_org(snapshot: &OrgSnapshot) -> CheckResult {
    let mut result = CheckResult::default();

    for department in &snapshot.departments {
        check_into(snapshot, department, &mut result);
    }

    let known: HashSet<String> = snapshot.departments.iter().map(Department::key).collect();
    for position in &snapshot.positions {
        let department_id = position.department_key();
        if !known.contains(&department_id) {
            result.warnings.push(CheckWarning::UnknownDepartment {
                position_id: position.key(),
                department_id,
            });
        }
    }

    result.valid = result.errors.is_empty();
    result
}

/// Validate one department. Read-only.
pub fn check_department(snapshot: &OrgSnapshot, department: &Department) -> CheckResult {
    let mut result = CheckResult::default();
    check_into(snapshot, department, &mut result);
    result.valid = result.errors.is_empty();
    result
}

fn check_into(snapshot: &OrgSnapshot, department: &Department, result: &mut CheckResult) {
    let department_id = department.key();
    let members: Vec<&Position> = snapshot
        .positions
        .iter()
        .filter(|p| p.department_key() == department_id)
        .collect();

    check_duplicates(&department_id, &members, result);
    check_head(&department_id, department, &members, result);
    check_links(&department_id, &members, snapshot, result);
    check_cycles(&department_id, department, &members, result);
    check_reachability(&department_id, department, &members, result);
}

// ---------------------------------------------------------------------------
// Individual checks
// ---------------------------------------------------------------------------

fn check_duplicates(department_id: &str, members: &[&Position], result: &mut CheckResult) {
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for p in members {
        *counts.entry(p.key()).or_default() += 1;
    }
    for (position_id, count) in counts {
        if count > 1 {
            result.errors.push(CheckError::DuplicateId {
                department_id: department_id.to_string(),
                position_id,
                count,
            });
        }
    }
}

fn check_head(department_id: &str, department: &Department, members: &[&Position], result: &mut CheckResult) {
    let Some(head) = department.head_key() else {
        result.warnings.push(CheckWarning::NoHead {
            department_id: department_id.to_string(),
        });
        return;
    };
    match members.iter().find(|p| p.key() == head) {
        None => result.errors.push(CheckError::HeadMissing {
            department_id: department_id.to_string(),
            head,
        }),
        Some(p) if !p.is_active => result.errors.push(CheckError::HeadInactive {
            department_id: department_id.to_string(),
            head,
        }),
        Some(_) => {}
    }
}

fn check_links(department_id: &str, members: &[&Position], snapshot: &OrgSnapshot, result: &mut CheckResult) {
    for position in members.iter().filter(|p| p.is_active) {
        let Some(reports_to) = position.parent_key() else {
            continue;
        };
        let position_id = position.key();
        match snapshot.position(&reports_to) {
            None => result.errors.push(CheckError::DanglingReportsTo {
                department_id: department_id.to_string(),
                position_id,
                reports_to,
            }),
            Some(parent) if parent.department_key() != department_id => {
                result.errors.push(CheckError::CrossDepartmentLink {
                    department_id: department_id.to_string(),
                    position_id,
                    reports_to,
                    other_department_id: parent.department_key(),
                })
            }
            Some(parent) if !parent.is_active => result.warnings.push(CheckWarning::ReportsToInactive {
                department_id: department_id.to_string(),
                position_id,
                reports_to,
            }),
            Some(_) => {}
        }
    }
}

/// Each loop among active members is reported once. The head's own pointer
/// is not part of the hierarchy and is not followed.
fn check_cycles(department_id: &str, department: &Department, members: &[&Position], result: &mut CheckResult) {
    let head = department.head_key();
    let mut parents: IndexMap<String, Option<String>> = IndexMap::new();
    for p in members.iter().filter(|p| p.is_active) {
        let parent = if head.as_deref() == Some(p.key().as_str()) {
            None
        } else {
            p.parent_key()
        };
        parents.entry(p.key()).or_insert(parent);
    }

    // 1 = on the current walk, 2 = finished
    let mut state: HashMap<String, u8> = HashMap::new();
    for start in parents.keys() {
        let mut path: Vec<String> = Vec::new();
        let mut current = Some(start.clone());

        while let Some(id) = current {
            match state.get(&id) {
                Some(2) => break,
                Some(_) => {
                    if let Some(at) = path.iter().position(|p| *p == id) {
                        result.errors.push(CheckError::ReportingCycle {
                            department_id: department_id.to_string(),
                            positions: path[at..].to_vec(),
                        });
                    }
                    break;
                }
                None => {}
            }
            state.insert(id.clone(), 1);
            current = parents.get(&id).cloned().flatten().filter(|p| parents.contains_key(p));
            path.push(id);
        }
        for id in path {
            state.insert(id, 2);
        }
    }
}

fn check_reachability(department_id: &str, department: &Department, members: &[&Position], result: &mut CheckResult) {
    if department.head_key().is_none() {
        return;
    }
    let positions: Vec<Position> = members.iter().map(|p| (*p).clone()).collect();
    for root in build_for_department(&positions, department).iter().filter(|n| n.orphan) {
        for position_id in root.ids() {
            result.warnings.push(CheckWarning::Unreachable {
                department_id: department_id.to_string(),
                position_id,
            });
        }
    }
}
