use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::model::position::{Department, Position};
use crate::model::tree::TreeNode;
use crate::ops::normalize::normalize_str;

/// Build the hierarchy forest for one department.
///
/// `positions` may contain records from other departments and inactive
/// records; both are filtered out here. When `head_position_id` names an
/// active position of the department, its tree comes first and every
/// position not reachable from it is appended as an orphan root. Without a
/// usable head, positions with no resolvable parent are the roots.
///
/// Every active position of the department appears exactly once in the
/// result, reporting cycles included.
pub fn build(
    positions: &[Position],
    department_id: &str,
    head_position_id: Option<&str>,
) -> Vec<TreeNode> {
    let department = normalize_str(department_id);
    let index = DepartmentIndex::new(positions, &department);
    if index.is_empty() {
        return Vec::new();
    }

    let head = head_position_id
        .map(normalize_str)
        .filter(|h| index.contains(h));

    let mut placed = HashSet::new();
    let mut forest = Vec::new();

    match head {
        Some(head) => {
            forest.push(index.subtree(&head, 0, &mut placed));
        }
        None => {
            let roots: Vec<&str> = index
                .ids()
                .filter(|id| !index.has_resolvable_parent(id))
                .collect();

            if roots.is_empty() {
                // Every position points at another one: nothing is a natural
                // root, so show them all flat.
                warn!(
                    department = %department,
                    positions = index.len(),
                    "no root found; every position reports into a cycle"
                );
                return index
                    .positions()
                    .map(|p| {
                        let mut node = TreeNode::new(p.clone(), 0);
                        node.orphan = true;
                        node
                    })
                    .collect();
            }

            for root in roots {
                forest.push(index.subtree(root, 0, &mut placed));
            }
        }
    }

    let primary_roots = forest.len();
    reconcile_orphans(&index, &mut placed, &mut forest);

    debug!(
        department = %department,
        positions = index.len(),
        roots = primary_roots,
        orphans = forest.len() - primary_roots,
        "built hierarchy"
    );
    forest
}

/// Build using a department record's id and head pointer.
pub fn build_for_department(positions: &[Position], department: &Department) -> Vec<TreeNode> {
    let head = department.head_key();
    build(positions, &department.key(), head.as_deref())
}

/// Append a root for every position not yet placed.
///
/// Positions whose parent is missing or placed elsewhere go first, carrying
/// their own descendants. Whatever is left belongs to a reporting cycle; the
/// first unplaced member (in input order) becomes the root and the cycle is
/// cut where it comes back around.
fn reconcile_orphans(index: &DepartmentIndex, placed: &mut HashSet<String>, forest: &mut Vec<TreeNode>) {
    let unreached: HashSet<&str> = index.ids().filter(|id| !placed.contains(*id)).collect();
    if unreached.is_empty() {
        return;
    }

    for id in index.ids() {
        if placed.contains(id) {
            continue;
        }
        let parent_unreached = index
            .parent_of(id)
            .is_some_and(|p| unreached.contains(p.as_str()));
        if !parent_unreached {
            forest.push(orphan_root(index, id, placed));
        }
    }

    for id in index.ids() {
        if !placed.contains(id) {
            debug!(position = %id, "breaking reporting cycle");
            forest.push(orphan_root(index, id, placed));
        }
    }
}

fn orphan_root(index: &DepartmentIndex, id: &str, placed: &mut HashSet<String>) -> TreeNode {
    let mut node = index.subtree(id, 0, placed);
    node.orphan = true;
    node
}

// ---------------------------------------------------------------------------
// Lookup tables
// ---------------------------------------------------------------------------

/// Filtered, de-duplicated positions of one department plus a children lookup.
struct DepartmentIndex<'a> {
    /// Normalized id -> position, in input order
    by_id: IndexMap<String, &'a Position>,
    /// Normalized parent id -> child ids, in input order
    children: IndexMap<String, Vec<String>>,
}

impl<'a> DepartmentIndex<'a> {
    fn new(positions: &'a [Position], department: &str) -> Self {
        let mut by_id: IndexMap<String, &'a Position> = IndexMap::new();
        for position in positions {
            if !position.is_active || position.department_key() != department {
                continue;
            }
            let key = position.key();
            if key.is_empty() {
                warn!(title = %position.title, "skipping position without an id");
                continue;
            }
            if by_id.contains_key(&key) {
                warn!(position = %key, "duplicate position id; keeping first occurrence");
                continue;
            }
            by_id.insert(key, position);
        }

        let mut children: IndexMap<String, Vec<String>> = IndexMap::new();
        for (id, position) in &by_id {
            if let Some(parent) = position.parent_key() {
                children.entry(parent).or_default().push(id.clone());
            }
        }

        DepartmentIndex { by_id, children }
    }

    fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }

    fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    fn ids(&self) -> impl Iterator<Item = &str> {
        self.by_id.keys().map(String::as_str)
    }

    fn positions(&self) -> impl Iterator<Item = &'a Position> + '_ {
        self.by_id.values().copied()
    }

    fn parent_of(&self, id: &str) -> Option<String> {
        self.by_id.get(id).and_then(|p| p.parent_key())
    }

    /// The parent pointer names a position present in this index.
    fn has_resolvable_parent(&self, id: &str) -> bool {
        self.parent_of(id).is_some_and(|p| self.contains(&p))
    }

    /// Build the subtree rooted at `id`, skipping anything already placed.
    fn subtree(&self, id: &str, depth: usize, placed: &mut HashSet<String>) -> TreeNode {
        placed.insert(id.to_string());
        let position = self.by_id[id];
        let mut node = TreeNode::new(position.clone(), depth);

        if let Some(child_ids) = self.children.get(id) {
            for child_id in child_ids {
                if placed.contains(child_id) {
                    continue;
                }
                node.children.push(self.subtree(child_id, depth + 1, placed));
            }
        }
        node
    }
}
