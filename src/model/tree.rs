use serde::Serialize;

use crate::model::position::Position;

/// A position with its computed children. Derived from a snapshot on every
/// build and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub position: Position,
    pub children: Vec<TreeNode>,
    /// Nesting depth (0 = root)
    pub depth: usize,
    /// Root produced by orphan reconciliation rather than the declared head
    /// or a missing reports-to pointer
    pub orphan: bool,
}

impl TreeNode {
    pub fn new(position: Position, depth: usize) -> Self {
        TreeNode {
            position,
            children: Vec::new(),
            depth,
            orphan: false,
        }
    }

    /// Normalized id of this node's position
    pub fn id(&self) -> String {
        self.position.key()
    }

    /// Number of nodes in this subtree, including this one
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(TreeNode::len).sum::<usize>()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Ids in pre-order
    pub fn ids(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.walk(&mut |node| out.push(node.id()));
        out
    }

    /// Find a node by normalized id anywhere in this subtree
    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        if self.id() == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// Visit every node in pre-order
    pub fn walk(&self, f: &mut dyn FnMut(&TreeNode)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }
}

/// Ids of every node in a forest, in pre-order, root by root.
pub fn forest_ids(forest: &[TreeNode]) -> Vec<String> {
    forest.iter().flat_map(TreeNode::ids).collect()
}

/// Find a node anywhere in a forest.
pub fn find_in_forest<'a>(forest: &'a [TreeNode], id: &str) -> Option<&'a TreeNode> {
    forest.iter().find_map(|root| root.find(id))
}

/// Normalized id of the parent of `id` within the forest, if it has one.
pub fn parent_in_forest(forest: &[TreeNode], id: &str) -> Option<String> {
    fn search(node: &TreeNode, id: &str) -> Option<String> {
        for child in &node.children {
            if child.id() == id {
                return Some(node.id());
            }
            if let Some(found) = search(child, id) {
                return Some(found);
            }
        }
        None
    }
    forest.iter().find_map(|root| search(root, id))
}
