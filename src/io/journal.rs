use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

/// Written at the top of a new journal.
const FILE_HEADER: &str = "\
<!-- orgtree operation journal: failed and rejected reorganizations.
     View with: ot journal
     Safe to delete. -->

---
";

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalCategory {
    /// The call that decides an operation failed; nothing was kept
    Authoritative,
    /// A follow-up call failed after the decisive change landed
    Chaining,
    /// Refused locally before any backend call
    Rejected,
}

impl fmt::Display for JournalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalCategory::Authoritative => write!(f, "authoritative"),
            JournalCategory::Chaining => write!(f, "chaining"),
            JournalCategory::Rejected => write!(f, "rejected"),
        }
    }
}

impl JournalCategory {
    pub fn parse_category(s: &str) -> Option<Self> {
        match s {
            "authoritative" => Some(JournalCategory::Authoritative),
            "chaining" => Some(JournalCategory::Chaining),
            "rejected" => Some(JournalCategory::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub category: JournalCategory,
    pub description: String,
    pub fields: IndexMap<String, String>,
}

impl JournalEntry {
    pub fn new(category: JournalCategory, description: impl Into<String>) -> Self {
        JournalEntry {
            timestamp: Utc::now(),
            category,
            description: description.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn field(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }

    fn to_markdown(&self) -> String {
        let mut out = format!(
            "## {} | {}: {}\n\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.category,
            self.description,
        );
        for (key, value) in &self.fields {
            // One line per field; embedded newlines would end the field early
            out.push_str(&format!("{}: {}\n", key, value.replace('\n', " ")));
        }
        out.push_str("\n---\n");
        out
    }
}

pub fn journal_path(org_dir: &Path) -> PathBuf {
    org_dir.join(".journal.log")
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Append an entry. Failures are logged and otherwise ignored.
pub fn log_entry(org_dir: &Path, entry: &JournalEntry) {
    if let Err(e) = append(org_dir, entry) {
        warn!(error = %e, "could not write to the operation journal");
    }
}

fn append(org_dir: &Path, entry: &JournalEntry) -> io::Result<()> {
    let path = journal_path(org_dir);
    let needs_header = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if needs_header {
        file.write_all(FILE_HEADER.as_bytes())?;
    }
    file.write_all(entry.to_markdown().as_bytes())
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Entries newest-first, at most `limit` of them.
pub fn read_entries(org_dir: &Path, limit: Option<usize>) -> Vec<JournalEntry> {
    let content = match std::fs::read_to_string(journal_path(org_dir)) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    let mut entries = parse_entries(&content);
    entries.reverse();
    if let Some(n) = limit {
        entries.truncate(n);
    }
    entries
}

fn parse_entries(content: &str) -> Vec<JournalEntry> {
    let mut entries = Vec::new();
    let mut current: Option<JournalEntry> = None;

    for line in content.lines() {
        if let Some(header) = line.strip_prefix("## ") {
            entries.extend(current.take());
            current = parse_entry_header(header);
            continue;
        }
        let Some(entry) = current.as_mut() else {
            continue;
        };
        if line == "---" {
            entries.extend(current.take());
            continue;
        }
        if let Some((key, value)) = line.trim().split_once(": ") {
            entry.fields.insert(key.to_string(), value.to_string());
        }
    }
    entries.extend(current);
    entries
}

/// `<timestamp> | <category>: <description>`
fn parse_entry_header(header: &str) -> Option<JournalEntry> {
    let (timestamp, rest) = header.split_once(" | ")?;
    let (category, description) = rest.split_once(": ")?;
    Some(JournalEntry {
        timestamp: DateTime::parse_from_rfc3339(timestamp).ok()?.with_timezone(&Utc),
        category: JournalCategory::parse_category(category)?,
        description: description.to_string(),
        fields: IndexMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn entry_at(secs: i64, category: JournalCategory, description: &str) -> JournalEntry {
        JournalEntry {
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            ..JournalEntry::new(category, description)
        }
    }

    #[test]
    fn test_markdown_format() {
        let entry = entry_at(0, JournalCategory::Chaining, "mv A B")
            .field("Department", "eng")
            .field("Call", "assign A to report to B");
        assert_eq!(
            entry.to_markdown(),
            "## 1970-01-01T00:00:00Z | chaining: mv A B\n\n\
             Department: eng\n\
             Call: assign A to report to B\n\
             \n---\n"
        );
    }

    #[test]
    fn test_log_and_read_newest_first() {
        let tmp = TempDir::new().unwrap();
        log_entry(
            tmp.path(),
            &entry_at(100, JournalCategory::Rejected, "mv B C").field("Error", "cycle"),
        );
        log_entry(
            tmp.path(),
            &entry_at(200, JournalCategory::Authoritative, "detach A")
                .field("Error", "rejected:\nnope"),
        );

        let content = std::fs::read_to_string(journal_path(tmp.path())).unwrap();
        assert!(content.starts_with("<!-- orgtree operation journal"));
        assert_eq!(content.matches("<!--").count(), 1);

        let entries = read_entries(tmp.path(), None);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].category, JournalCategory::Authoritative);
        assert_eq!(entries[0].fields["Error"], "rejected: nope");
        assert_eq!(entries[1].description, "mv B C");
        assert_eq!(entries[1].fields["Error"], "cycle");

        let latest = read_entries(tmp.path(), Some(1));
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].description, "detach A");
    }

    #[test]
    fn test_missing_journal_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(read_entries(tmp.path(), Some(5)).is_empty());
    }

    #[test]
    fn test_malformed_headers_are_skipped() {
        let content = "\
## not a timestamp | chaining: x

---
## 2024-05-01T10:00:00Z | unknown: y

---
## 2024-05-01T10:00:00Z | rejected: z
Error: boom
";
        let entries = parse_entries(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, "z");
        assert_eq!(entries[0].fields["Error"], "boom");
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = entry_at(0, JournalCategory::Rejected, "mv B C").field("Error", "cycle");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["category"], "rejected");
        assert_eq!(json["fields"]["Error"], "cycle");
        assert_eq!(json["timestamp"], "1970-01-01T00:00:00Z");
    }
}
