use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Keys checked, in order, when a reference arrives as an object.
const ID_KEYS: [&str; 3] = ["_id", "id", "$oid"];

/// `ObjectId("...")` / `ObjectId('...')`, the string form of a stored reference.
static OBJECT_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^ObjectId\(\s*["']?([^"')]*?)["']?\s*\)$"#).expect("valid regex")
});

/// Canonicalize any reference shape into a comparable string.
///
/// `null` yields the empty string. Objects are reduced to their first
/// non-empty id field (recursively); objects without one fall back to their
/// compact JSON text.
/// Applying this to its own output returns the same string.
pub fn normalize(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => normalize_str(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Object(map) => {
            let mut has_key = false;
            for key in ID_KEYS {
                if let Some(inner) = map.get(key) {
                    has_key = true;
                    let id = normalize(inner);
                    if !id.is_empty() {
                        return id;
                    }
                }
            }
            if has_key { String::new() } else { value.to_string() }
        }
        Value::Array(_) => value.to_string(),
    }
}

/// Canonicalize a bare string reference.
pub fn normalize_str(s: &str) -> String {
    let trimmed = s.trim();
    match OBJECT_ID_RE.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// Whether two references name the same record.
pub fn same_ref(a: &Value, b: &Value) -> bool {
    let a = normalize(a);
    !a.is_empty() && a == normalize(b)
}
