//! Integration tests for the `ot` CLI.
//!
//! Each test creates a temp workspace, runs `ot` as a subprocess,
//! and verifies stdout and/or the record files.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

fn ot_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ot"))
}

const ORG_TOML: &str = r#"[org]
name = "Acme"

[engine]
default_department = "eng"
"#;

/// A heads eng; B and D report to A; C reports to B; F reports to a
/// position that no longer exists; X is inactive.
const POSITIONS: &str = r#"[
  { "_id": "A", "code": "ENG-1", "title": "VP Engineering", "departmentId": { "_id": "eng", "name": "Engineering" } },
  { "_id": "B", "code": "ENG-2", "title": "Platform Lead", "departmentId": "eng", "reportsToPositionId": { "_id": "A" } },
  { "_id": "C", "title": "Backend Engineer", "departmentId": "eng", "reportsToPositionId": "B" },
  { "_id": "D", "title": "Frontend Engineer", "departmentId": "eng", "reportsToPositionId": "A" },
  { "_id": "F", "title": "Contractor", "departmentId": "eng", "reportsToPositionId": "ghost" },
  { "_id": "X", "title": "Former Lead", "departmentId": "eng", "reportsToPositionId": "A", "isActive": false },
  { "_id": "S", "title": "Head of Sales", "departmentId": "sales" }
]"#;

const DEPARTMENTS: &str = r#"[
  { "_id": "eng", "name": "Engineering", "headPositionId": "A" },
  { "_id": "sales", "name": "Sales", "headPositionId": { "_id": "S" } }
]"#;

fn create_test_workspace(root: &Path) {
    let org_dir = root.join("org");
    fs::create_dir_all(&org_dir).unwrap();
    fs::write(org_dir.join("org.toml"), ORG_TOML).unwrap();
    fs::write(org_dir.join("positions.json"), POSITIONS).unwrap();
    fs::write(org_dir.join("departments.json"), DEPARTMENTS).unwrap();
}

/// Run `ot` with the given args in the given directory, returning (stdout, stderr, success).
fn run_ot(dir: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(ot_bin())
        .args(args)
        .current_dir(dir)
        .env_remove("ORGTREE_LOG")
        .output()
        .expect("failed to run ot");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Run `ot` expecting success, return stdout.
fn run_ot_ok(dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run_ot(dir, args);
    if !success {
        panic!("ot {:?} failed:\nstdout: {}\nstderr: {}", args, stdout, stderr);
    }
    stdout
}

fn read_json(root: &Path, file: &str) -> Value {
    let text = fs::read_to_string(root.join("org").join(file)).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn position<'a>(positions: &'a Value, id: &str) -> &'a Value {
    positions
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["_id"] == id || p["id"] == id)
        .unwrap_or_else(|| panic!("no position {}", id))
}

// ---------------------------------------------------------------------------
// Init
// ---------------------------------------------------------------------------

#[test]
fn test_init_creates_workspace() {
    let tmp = tempfile::TempDir::new().unwrap();

    let out = run_ot_ok(tmp.path(), &["init", "--name", "Acme"]);
    assert!(out.contains("Initialized orgtree workspace: Acme"));
    assert!(tmp.path().join("org/org.toml").exists());
    assert_eq!(fs::read_to_string(tmp.path().join("org/positions.json")).unwrap(), "[]\n");

    let out = run_ot_ok(tmp.path(), &["departments"]);
    assert!(out.contains("no departments"));

    let (_, stderr, success) = run_ot(tmp.path(), &["init"]);
    assert!(!success);
    assert!(stderr.contains("already exists"));

    run_ot_ok(tmp.path(), &["init", "--force", "--name", "Acme West"]);
    let config = fs::read_to_string(tmp.path().join("org/org.toml")).unwrap();
    assert!(config.contains("name = \"Acme West\""));
}

#[test]
fn test_init_keeps_records_on_force() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());
    run_ot_ok(tmp.path(), &["init", "--force"]);
    let positions = read_json(tmp.path(), "positions.json");
    assert_eq!(positions.as_array().unwrap().len(), 7);
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

#[test]
fn test_departments_listing() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());

    let out = run_ot_ok(tmp.path(), &["departments"]);
    assert!(out.starts_with("Acme\n"));
    assert!(out.contains("Engineering"));
    assert!(out.contains("head: A"));
    assert!(out.contains("5 active"));
    assert!(out.contains("Sales"));

    let out = run_ot_ok(tmp.path(), &["departments", "--json"]);
    let parsed: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed[0]["id"], "eng");
    assert_eq!(parsed[0]["active_positions"], 5);
    assert_eq!(parsed[1]["head"], "S");
}

#[test]
fn test_tree_default_department() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());

    let out = run_ot_ok(tmp.path(), &["tree"]);
    assert_eq!(
        out,
        "\
== Engineering (eng) ==
ENG-1 VP Engineering [A] (head)
├─ ENG-2 Platform Lead [B]
│  └─ Backend Engineer [C]
└─ Frontend Engineer [D]
Contractor [F] (orphan)
"
    );
}

#[test]
fn test_tree_json() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());

    let out = run_ot_ok(tmp.path(), &["tree", "eng", "--json"]);
    let parsed: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed["head"], "A");
    assert_eq!(parsed["roots"].as_array().unwrap().len(), 2);
    assert_eq!(parsed["roots"][0]["children"][0]["children"][0]["id"], "C");
    assert_eq!(parsed["roots"][1]["id"], "F");
    assert_eq!(parsed["roots"][1]["orphan"], true);
}

#[test]
fn test_tree_other_department_and_width() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());

    let out = run_ot_ok(tmp.path(), &["tree", "sales"]);
    assert!(out.contains("Head of Sales [S] (head)"));

    let out = run_ot_ok(tmp.path(), &["tree", "--width", "8"]);
    assert!(out.contains("ENG-1 V… [A] (head)"));
}

#[test]
fn test_unknown_department() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());

    let (_, stderr, success) = run_ot(tmp.path(), &["tree", "hr"]);
    assert!(!success);
    assert!(stderr.contains("department not found: hr"));
}

#[test]
fn test_check_reports_dangling_link() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());

    let out = run_ot_ok(tmp.path(), &["check"]);
    assert!(out.contains("[eng] F reports to missing position ghost"));
    assert!(out.contains("[eng] F is not reachable from the head"));
    assert!(out.contains("✗ hierarchy has errors"));

    let out = run_ot_ok(tmp.path(), &["check", "sales"]);
    assert!(out.contains("✓ hierarchy is valid"));

    let out = run_ot_ok(tmp.path(), &["check", "--json"]);
    let parsed: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed["valid"], false);
    assert_eq!(parsed["errors"][0]["type"], "dangling_reports_to");
}

// ---------------------------------------------------------------------------
// Moves
// ---------------------------------------------------------------------------

#[test]
fn test_mv_plain_reparent() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());

    let out = run_ot_ok(tmp.path(), &["mv", "C", "D"]);
    assert!(out.starts_with("C now reports to D\n"));
    assert!(out.contains("└─ Frontend Engineer [D]\n   └─ Backend Engineer [C]"));

    let positions = read_json(tmp.path(), "positions.json");
    assert_eq!(position(&positions, "C")["reportsToPositionId"], "D");
    // Untouched references keep their populated shape, ids keep their key
    assert_eq!(position(&positions, "B")["reportsToPositionId"], serde_json::json!({ "_id": "A" }));
    assert_eq!(position(&positions, "C")["_id"], "C");
    assert!(position(&positions, "C").get("id").is_none());
    let departments = read_json(tmp.path(), "departments.json");
    assert_eq!(departments[0]["_id"], "eng");
}

#[test]
fn test_mv_onto_head_promotes_source() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());

    let out = run_ot_ok(tmp.path(), &["mv", "C", "A"]);
    assert!(out.starts_with("C is now head of eng; A reports to C\n"));
    assert!(out.contains("Backend Engineer [C] (head)"));

    let departments = read_json(tmp.path(), "departments.json");
    assert_eq!(departments[0]["headPositionId"], "C");
    let positions = read_json(tmp.path(), "positions.json");
    assert_eq!(position(&positions, "A")["reportsToPositionId"], "C");
    assert!(position(&positions, "C")["reportsToPositionId"].is_null());
}

#[test]
fn test_mv_head_onto_child_promotes_target() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());

    let out = run_ot_ok(tmp.path(), &["mv", "A", "B", "--json"]);
    let parsed: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed["status"], "applied");
    assert_eq!(parsed["outcome"]["branch"]["branch"], "promote_target");
    assert_eq!(parsed["outcome"]["new_head"], "B");
    assert_eq!(parsed["outcome"]["warnings"].as_array().unwrap().len(), 0);
    assert_eq!(parsed["tree"]["head"], "B");
    assert_eq!(parsed["tree"]["roots"][0]["children"][0]["id"], "A");

    let tree = run_ot_ok(tmp.path(), &["tree"]);
    assert!(tree.contains(
        "ENG-2 Platform Lead [B] (head)\n├─ ENG-1 VP Engineering [A]\n│  └─ Frontend Engineer [D]\n└─ Backend Engineer [C]\n"
    ));
}

#[test]
fn test_detach_head_and_position() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());

    let out = run_ot_ok(tmp.path(), &["detach", "D"]);
    assert!(out.starts_with("D no longer reports to anyone\n"));
    assert!(out.contains("Frontend Engineer [D] (orphan)"));

    let out = run_ot_ok(tmp.path(), &["detach", "A"]);
    assert!(out.starts_with("A is no longer head of eng\n"));
    let departments = read_json(tmp.path(), "departments.json");
    assert!(departments[0]["headPositionId"].is_null());
}

#[test]
fn test_mv_onto_itself_is_a_noop() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());
    let before = fs::read_to_string(tmp.path().join("org/positions.json")).unwrap();

    let out = run_ot_ok(tmp.path(), &["mv", "B", "B"]);
    assert_eq!(out, "nothing to do: dropped onto itself\n");
    assert_eq!(fs::read_to_string(tmp.path().join("org/positions.json")).unwrap(), before);
}

#[test]
fn test_cycle_is_rejected_and_journaled() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());

    let (stdout, stderr, success) = run_ot(tmp.path(), &["mv", "B", "C"]);
    assert!(!success);
    assert!(stderr.contains("error: cannot move B under C"));
    // Nothing was sent, so there is nothing to re-read
    assert!(stdout.is_empty());

    let positions = read_json(tmp.path(), "positions.json");
    assert_eq!(position(&positions, "B")["reportsToPositionId"], serde_json::json!({ "_id": "A" }));

    let out = run_ot_ok(tmp.path(), &["journal"]);
    assert!(out.contains("rejected"));
    assert!(out.contains("mv B C"));
    assert!(out.contains("    Department: eng"));

    let out = run_ot_ok(tmp.path(), &["journal", "--json"]);
    let parsed: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 1);
    assert_eq!(parsed[0]["category"], "rejected");
}

#[test]
fn test_failed_move_shows_store_state() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());
    fs::write(
        tmp.path().join("org/org.toml"),
        format!("{}cycle_check = false\n", ORG_TOML),
    )
    .unwrap();

    // The store refuses the link after the call went out
    let (stdout, stderr, success) = run_ot(tmp.path(), &["mv", "B", "C"]);
    assert!(!success);
    assert!(stderr.contains("error: "));
    assert!(stdout.contains("== Engineering (eng) ==\nENG-1 VP Engineering [A] (head)"));
    assert!(run_ot_ok(tmp.path(), &["journal"]).contains("authoritative"));

    let (stdout, _, success) = run_ot(tmp.path(), &["mv", "B", "C", "--json"]);
    assert!(!success);
    let parsed: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["status"], "failed");
    assert_eq!(parsed["tree"]["head"], "A");
}

#[test]
fn test_journal_can_be_disabled() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());
    fs::write(
        tmp.path().join("org/org.toml"),
        format!("{}\n[journal]\nenabled = false\n", ORG_TOML),
    )
    .unwrap();

    let (_, _, success) = run_ot(tmp.path(), &["mv", "B", "C"]);
    assert!(!success);
    assert!(!tmp.path().join("org/.journal.log").exists());
    assert!(run_ot_ok(tmp.path(), &["journal"]).contains("journal is empty"));
}

#[test]
fn test_mv_onto_inactive_position_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());

    let (_, stderr, success) = run_ot(tmp.path(), &["mv", "C", "X"]);
    assert!(!success);
    assert!(stderr.contains("X is not an active position of department eng"));
}

// ---------------------------------------------------------------------------
// Workspace discovery
// ---------------------------------------------------------------------------

#[test]
fn test_project_dir_flag_and_nested_discovery() {
    let tmp = tempfile::TempDir::new().unwrap();
    let root = tmp.path().join("acme");
    create_test_workspace(&root);

    let out = run_ot_ok(tmp.path(), &["-C", root.to_str().unwrap(), "tree"]);
    assert!(out.contains("(eng)"));

    let nested = root.join("reports").join("2024");
    fs::create_dir_all(&nested).unwrap();
    let out = run_ot_ok(&nested, &["tree", "sales"]);
    assert!(out.contains("(sales)"));
}

#[test]
fn test_outside_workspace_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (_, stderr, success) = run_ot(tmp.path(), &["tree"]);
    assert!(!success);
    assert!(stderr.contains("not an orgtree workspace"));
}

#[test]
fn test_missing_department_argument() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());
    fs::write(tmp.path().join("org/org.toml"), "[org]\nname = \"Acme\"\n").unwrap();

    let (_, stderr, success) = run_ot(tmp.path(), &["detach", "C"]);
    assert!(!success);
    assert!(stderr.contains("no department given"));

    run_ot_ok(tmp.path(), &["detach", "C", "--dept", "eng"]);
}
