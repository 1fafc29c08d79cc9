use crate::io::api::{ApiError, OrgApi};
use crate::model::position::{Department, Position};
use crate::model::tree::TreeNode;
use crate::ops::normalize::normalize_str;
use crate::ops::tree_builder::build_for_department;

/// One department snapshot together with the forest built from it.
#[derive(Debug, Clone)]
pub struct DepartmentView {
    pub department: Department,
    pub positions: Vec<Position>,
    pub forest: Vec<TreeNode>,
}

impl DepartmentView {
    pub fn new(department: Department, positions: Vec<Position>) -> Self {
        let forest = build_for_department(&positions, &department);
        DepartmentView {
            department,
            positions,
            forest,
        }
    }

    pub fn department_id(&self) -> String {
        self.department.key()
    }

    /// The department's head pointer, normalized
    pub fn head(&self) -> Option<String> {
        self.department.head_key()
    }

    /// Active position of this department with the given normalized id
    pub fn position(&self, id: &str) -> Option<&Position> {
        let department = self.department_id();
        self.positions
            .iter()
            .find(|p| p.is_active && p.key() == id && p.department_key() == department)
    }

    /// Roots appended by orphan reconciliation
    pub fn orphan_count(&self) -> usize {
        self.forest.iter().filter(|n| n.orphan).count()
    }
}

/// Fetch a department and its positions and build the forest.
pub async fn load_department(api: &dyn OrgApi, department_id: &str) -> Result<DepartmentView, ApiError> {
    let wanted = normalize_str(department_id);
    let department = api
        .departments()
        .await?
        .into_iter()
        .find(|d| d.key() == wanted)
        .ok_or_else(|| ApiError::DepartmentNotFound(wanted.clone()))?;
    let positions = api.positions_by_department(&wanted).await?;
    Ok(DepartmentView::new(department, positions))
}
