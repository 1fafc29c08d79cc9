use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ops::normalize::normalize;

/// A reference to another record, in whatever shape the source delivered it.
///
/// Records arrive with references that are sometimes bare ids, sometimes a
/// populated sub-record, and sometimes something else entirely. Comparisons
/// must always go through [`Identifiable::key`], never the raw value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Identifiable {
    /// `null` or absent
    #[default]
    Missing,
    /// A plain string id
    Bare(String),
    /// An object carrying an `_id`, `id` or `$oid` field
    Populated(Value),
    /// Any other value (numbers, objects without an id field, ...)
    Opaque(Value),
}

impl Identifiable {
    /// Canonical comparable form. Empty for `Missing`.
    pub fn key(&self) -> String {
        match self {
            Identifiable::Missing => String::new(),
            Identifiable::Bare(s) => normalize(&Value::String(s.clone())),
            Identifiable::Populated(v) | Identifiable::Opaque(v) => normalize(v),
        }
    }

    /// Canonical form, or `None` when it normalizes to nothing.
    pub fn resolve(&self) -> Option<String> {
        let key = self.key();
        if key.is_empty() { None } else { Some(key) }
    }

    pub fn is_missing(&self) -> bool {
        self.resolve().is_none()
    }
}

impl From<Value> for Identifiable {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Identifiable::Missing,
            Value::String(s) => Identifiable::Bare(s),
            Value::Object(ref map)
                if map.contains_key("_id") || map.contains_key("id") || map.contains_key("$oid") =>
            {
                Identifiable::Populated(value)
            }
            other => Identifiable::Opaque(other),
        }
    }
}

impl From<Identifiable> for Value {
    fn from(id: Identifiable) -> Self {
        match id {
            Identifiable::Missing => Value::Null,
            Identifiable::Bare(s) => Value::String(s),
            Identifiable::Populated(v) | Identifiable::Opaque(v) => v,
        }
    }
}

impl From<&str> for Identifiable {
    fn from(s: &str) -> Self {
        Identifiable::Bare(s.to_string())
    }
}

impl From<String> for Identifiable {
    fn from(s: String) -> Self {
        Identifiable::Bare(s)
    }
}

impl From<Option<&str>> for Identifiable {
    fn from(s: Option<&str>) -> Self {
        s.map_or(Identifiable::Missing, Identifiable::from)
    }
}

/// Which key carried a record's own id in storage.
///
/// Records may use `id`, `_id`, or both; writes put the id back under the
/// same key(s) it was read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdField {
    #[default]
    Id,
    UnderscoreId,
    Both,
}

impl IdField {
    /// Choose the id from an `_id`/`id` pair. `_id` wins unless it is empty.
    fn pick(underscore: Option<Identifiable>, plain: Option<Identifiable>) -> (Identifiable, IdField) {
        match (underscore, plain) {
            (Some(u), Some(p)) if u.is_missing() => (p, IdField::Both),
            (Some(u), Some(_)) => (u, IdField::Both),
            (Some(u), None) => (u, IdField::UnderscoreId),
            (None, Some(p)) => (p, IdField::Id),
            (None, None) => (Identifiable::Missing, IdField::Id),
        }
    }

    fn split(self, id: Identifiable) -> (Option<Identifiable>, Option<Identifiable>) {
        match self {
            IdField::Id => (None, Some(id)),
            IdField::UnderscoreId => (Some(id), None),
            IdField::Both => (Some(id.clone()), Some(id)),
        }
    }
}

/// One job slot in a department.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PositionRecord", into = "PositionRecord")]
pub struct Position {
    pub id: Identifiable,
    pub id_field: IdField,
    pub code: String,
    pub title: String,
    pub department_id: Identifiable,
    pub reports_to_position_id: Identifiable,
    pub is_active: bool,
}

/// Stored shape of a [`Position`].
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    underscore_id: Option<Identifiable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Identifiable>,
    #[serde(default)]
    code: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    department_id: Identifiable,
    #[serde(default)]
    reports_to_position_id: Identifiable,
    #[serde(default = "default_true")]
    is_active: bool,
}

impl From<PositionRecord> for Position {
    fn from(r: PositionRecord) -> Self {
        let (id, id_field) = IdField::pick(r.underscore_id, r.id);
        Position {
            id,
            id_field,
            code: r.code,
            title: r.title,
            department_id: r.department_id,
            reports_to_position_id: r.reports_to_position_id,
            is_active: r.is_active,
        }
    }
}

impl From<Position> for PositionRecord {
    fn from(p: Position) -> Self {
        let (underscore_id, id) = p.id_field.split(p.id);
        PositionRecord {
            underscore_id,
            id,
            code: p.code,
            title: p.title,
            department_id: p.department_id,
            reports_to_position_id: p.reports_to_position_id,
            is_active: p.is_active,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Position {
    /// Create an active position with bare references.
    pub fn new(id: &str, department_id: &str, reports_to: Option<&str>) -> Self {
        Position {
            id: id.into(),
            id_field: IdField::Id,
            code: String::new(),
            title: String::new(),
            department_id: department_id.into(),
            reports_to_position_id: reports_to.into(),
            is_active: true,
        }
    }

    pub fn with_title(mut self, code: &str, title: &str) -> Self {
        self.code = code.to_string();
        self.title = title.to_string();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Normalized id
    pub fn key(&self) -> String {
        self.id.key()
    }

    /// Normalized reports-to id, if any
    pub fn parent_key(&self) -> Option<String> {
        self.reports_to_position_id.resolve()
    }

    pub fn department_key(&self) -> String {
        self.department_id.key()
    }

    /// Label used in listings: `CODE Title`, falling back to the id.
    pub fn label(&self) -> String {
        match (self.code.is_empty(), self.title.is_empty()) {
            (false, false) => format!("{} {}", self.code, self.title),
            (true, false) => self.title.clone(),
            (false, true) => self.code.clone(),
            (true, true) => self.key(),
        }
    }
}

/// An organizational unit owning positions and a head pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DepartmentRecord", into = "DepartmentRecord")]
pub struct Department {
    pub id: Identifiable,
    pub id_field: IdField,
    pub name: String,
    pub head_position_id: Identifiable,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepartmentRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    underscore_id: Option<Identifiable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Identifiable>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    head_position_id: Identifiable,
}

impl From<DepartmentRecord> for Department {
    fn from(r: DepartmentRecord) -> Self {
        let (id, id_field) = IdField::pick(r.underscore_id, r.id);
        Department {
            id,
            id_field,
            name: r.name,
            head_position_id: r.head_position_id,
        }
    }
}

impl From<Department> for DepartmentRecord {
    fn from(d: Department) -> Self {
        let (underscore_id, id) = d.id_field.split(d.id);
        DepartmentRecord {
            underscore_id,
            id,
            name: d.name,
            head_position_id: d.head_position_id,
        }
    }
}

impl Department {
    pub fn new(id: &str, name: &str, head: Option<&str>) -> Self {
        Department {
            id: id.into(),
            id_field: IdField::Id,
            name: name.to_string(),
            head_position_id: head.into(),
        }
    }

    pub fn key(&self) -> String {
        self.id.key()
    }

    pub fn head_key(&self) -> Option<String> {
        self.head_position_id.resolve()
    }
}
