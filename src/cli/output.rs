use serde::Serialize;

use crate::io::journal::JournalEntry;
use crate::model::position::Department;
use crate::model::tree::TreeNode;
use crate::ops::check::{CheckError, CheckWarning};
use crate::ops::reparent::{Branch, ReparentOutcome, Reparented, SkipReason};
use crate::ops::view::DepartmentView;
use crate::util::unicode::{pad_to_width, truncate_to_width};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct NodeJson {
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub code: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    pub depth: usize,
    pub orphan: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeJson>,
}

#[derive(Serialize)]
pub struct TreeJson {
    pub department: String,
    pub name: String,
    pub head: Option<String>,
    pub roots: Vec<NodeJson>,
}

#[derive(Serialize)]
pub struct DepartmentJson {
    pub id: String,
    pub name: String,
    pub head: Option<String>,
    pub active_positions: usize,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReparentJson<'a> {
    Skipped {
        reason: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<&'a str>,
    },
    Applied {
        outcome: &'a ReparentOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        tree: Option<TreeJson>,
    },
    Failed {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tree: Option<TreeJson>,
    },
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn node_to_json(node: &TreeNode) -> NodeJson {
    NodeJson {
        id: node.id(),
        code: node.position.code.clone(),
        title: node.position.title.clone(),
        depth: node.depth,
        orphan: node.orphan,
        children: node.children.iter().map(node_to_json).collect(),
    }
}

pub fn tree_to_json(view: &DepartmentView) -> TreeJson {
    TreeJson {
        department: view.department_id(),
        name: view.department.name.clone(),
        head: view.head(),
        roots: view.forest.iter().map(node_to_json).collect(),
    }
}

pub fn department_to_json(department: &Department, active_positions: usize) -> DepartmentJson {
    DepartmentJson {
        id: department.key(),
        name: department.name.clone(),
        head: department.head_key(),
        active_positions,
    }
}

/// `tree` is the department as re-read after the gesture, when calls went out.
pub fn reparented_to_json(result: &Reparented, tree: Option<TreeJson>) -> ReparentJson<'_> {
    match result {
        Reparented::Skipped(SkipReason::SameNode) => ReparentJson::Skipped {
            reason: "same_node",
            position: None,
        },
        Reparented::Skipped(SkipReason::Busy(conflict)) => ReparentJson::Skipped {
            reason: "busy",
            position: Some(conflict.0.as_str()),
        },
        Reparented::Applied(outcome) => ReparentJson::Applied { outcome, tree },
    }
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

/// `CODE Title [id]`, or just the id when the position has no label.
fn node_label(node: &TreeNode, width: usize) -> String {
    let id = node.id();
    let label = node.position.label();
    if label == id {
        truncate_to_width(&id, width)
    } else {
        format!("{} [{}]", truncate_to_width(&label, width), id)
    }
}

/// Render a department's forest with box-drawing connectors.
pub fn format_tree(view: &DepartmentView, width: usize) -> Vec<String> {
    let mut lines = vec![format!("== {} ({}) ==", view.department.name, view.department_id())];
    if view.forest.is_empty() {
        lines.push("  (no active positions)".to_string());
        return lines;
    }

    let head = view.head();
    for root in &view.forest {
        let mut line = node_label(root, width);
        if head.as_deref() == Some(root.id().as_str()) {
            line.push_str(" (head)");
        }
        if root.orphan {
            line.push_str(" (orphan)");
        }
        lines.push(line);
        push_children(root, "", width, &mut lines);
    }
    lines
}

fn push_children(node: &TreeNode, prefix: &str, width: usize, lines: &mut Vec<String>) {
    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        let last = i + 1 == count;
        let connector = if last { "└─ " } else { "├─ " };
        lines.push(format!("{}{}{}", prefix, connector, node_label(child, width)));

        let next = format!("{}{}", prefix, if last { "   " } else { "│  " });
        push_children(child, &next, width, lines);
    }
}

pub fn format_department_line(department: &Department, active_positions: usize, name_width: usize) -> String {
    let head = department.head_key().unwrap_or_else(|| "-".to_string());
    format!(
        "  {} {:<12} head: {:<12} {} active",
        pad_to_width(&truncate_to_width(&department.name, name_width), name_width),
        department.key(),
        head,
        active_positions
    )
}

pub fn format_branch(branch: &Branch, department: &str) -> String {
    match branch {
        Branch::PromoteTarget { old_head, new_head } | Branch::PromoteSource { old_head, new_head } => {
            format!("{} is now head of {}; {} reports to {}", new_head, department, old_head, new_head)
        }
        Branch::Reparent { source, target } => format!("{} now reports to {}", source, target),
        Branch::DetachHead { head } => format!("{} is no longer head of {}", head, department),
        Branch::Detach { source } => format!("{} no longer reports to anyone", source),
    }
}

pub fn format_skip(reason: &SkipReason) -> String {
    match reason {
        SkipReason::SameNode => "nothing to do: dropped onto itself".to_string(),
        SkipReason::Busy(conflict) => format!("skipped: {}", conflict),
    }
}

pub fn format_check_error(err: &CheckError) -> String {
    match err {
        CheckError::DanglingReportsTo {
            department_id,
            position_id,
            reports_to,
        } => format!("[{}] {} reports to missing position {}", department_id, position_id, reports_to),
        CheckError::CrossDepartmentLink {
            department_id,
            position_id,
            reports_to,
            other_department_id,
        } => format!(
            "[{}] {} reports to {} in department {}",
            department_id, position_id, reports_to, other_department_id
        ),
        CheckError::ReportingCycle {
            department_id,
            positions,
        } => format!(
            "[{}] reporting cycle: {} -> {}",
            department_id,
            positions.join(" -> "),
            positions.first().map(String::as_str).unwrap_or("")
        ),
        CheckError::HeadMissing { department_id, head } => {
            format!("[{}] head {} is not a position of the department", department_id, head)
        }
        CheckError::HeadInactive { department_id, head } => {
            format!("[{}] head {} is inactive", department_id, head)
        }
        CheckError::DuplicateId {
            department_id,
            position_id,
            count,
        } => format!("[{}] {} appears {} times", department_id, position_id, count),
    }
}

pub fn format_check_warning(warning: &CheckWarning) -> String {
    match warning {
        CheckWarning::ReportsToInactive {
            department_id,
            position_id,
            reports_to,
        } => format!("[{}] {} reports to inactive position {}", department_id, position_id, reports_to),
        CheckWarning::Unreachable {
            department_id,
            position_id,
        } => format!("[{}] {} is not reachable from the head", department_id, position_id),
        CheckWarning::NoHead { department_id } => format!("[{}] department has no head", department_id),
        CheckWarning::UnknownDepartment {
            position_id,
            department_id,
        } => format!("{} belongs to unknown department {}", position_id, department_id),
    }
}

pub fn format_journal_entry(entry: &JournalEntry) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {:<13} {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.category.to_string(),
        entry.description
    )];
    for (key, value) in &entry.fields {
        lines.push(format!("    {}: {}", key, value));
    }
    lines
}
