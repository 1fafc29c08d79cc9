mod init;
pub use init::cmd_init;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::api::HostSignals;
use crate::io::config_io::{self, Workspace};
use crate::io::journal::{self, JournalCategory, JournalEntry};
use crate::io::store::SnapshotStore;
use crate::ops::check;
use crate::ops::reparent::{ChainingFailure, DragGesture, ReparentEngine, ReparentError, Reparented};
use crate::ops::view::{load_department, DepartmentView};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let start = start_dir(cli.project_dir.as_deref())?;

    match cli.command {
        // Init is handled in main.rs before workspace discovery
        Commands::Init(args) => cmd_init(args, cli.project_dir.as_deref()),

        // Read commands
        Commands::Departments => cmd_departments(&start, json),
        Commands::Tree(args) => cmd_tree(&start, args, json),
        Commands::Check(args) => cmd_check(&start, args, json),
        Commands::Journal(args) => cmd_journal(&start, args, json),

        // Write commands
        Commands::Mv(args) => {
            let description = format!("mv {} {}", args.source, args.target);
            let gesture = DragGesture::onto(args.source.as_str(), args.target.as_str());
            cmd_gesture(&start, args.department, gesture, description, json)
        }
        Commands::Detach(args) => {
            let description = format!("detach {}", args.source);
            let gesture = DragGesture::detach(args.source.as_str());
            cmd_gesture(&start, args.department, gesture, description, json)
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn start_dir(project_dir: Option<&str>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match project_dir {
        Some(dir) => Ok(std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?),
        None => Ok(std::env::current_dir()?),
    }
}

/// Run one future to completion on a single-threaded runtime.
fn block_on<F: Future>(future: F) -> Result<F::Output, std::io::Error> {
    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    Ok(runtime.block_on(future))
}

/// The department named on the command line, else the configured default.
fn department_arg(ws: &Workspace, given: Option<String>) -> Result<String, Box<dyn std::error::Error>> {
    given
        .or_else(|| ws.config.engine.default_department.clone())
        .ok_or_else(|| "no department given and engine.default_department is not set in org.toml".into())
}

fn record(ws: &Workspace, entry: JournalEntry) {
    if ws.config.journal.enabled {
        journal::log_entry(&ws.org_dir, &entry);
    }
}

fn journal_chaining(ws: &Workspace, department: &str, description: &str, warnings: &[ChainingFailure]) {
    for warning in warnings {
        record(
            ws,
            JournalEntry::new(JournalCategory::Chaining, description)
                .field("Department", department)
                .field("Call", &warning.call)
                .field("Error", &warning.error),
        );
    }
}

/// Host side of the engine's notifications.
#[derive(Default)]
struct CliSignals {
    updated: AtomicBool,
}

impl CliSignals {
    fn updated(&self) -> bool {
        self.updated.load(Ordering::SeqCst)
    }
}

impl HostSignals for CliSignals {
    fn on_update(&self) {
        self.updated.store(true, Ordering::SeqCst);
    }

    fn on_head_changed(&self, new_head: Option<&str>) {
        info!(head = new_head.unwrap_or("none"), "department head changed");
    }
}

/// The department as re-read after a gesture, if any call went out.
fn refreshed(
    engine: &ReparentEngine<SnapshotStore>,
    signals: &CliSignals,
    department: &str,
) -> Option<DepartmentView> {
    if !signals.updated() {
        return None;
    }
    match block_on(engine.refresh(department)) {
        Ok(Ok(view)) => Some(view),
        Ok(Err(e)) => {
            warn!(department, error = %e, "could not re-read department");
            None
        }
        Err(e) => {
            warn!(error = %e, "could not start runtime");
            None
        }
    }
}

fn print_tree(view: &DepartmentView) {
    println!();
    for line in format_tree(view, 48) {
        println!("{}", line);
    }
}

// ---------------------------------------------------------------------------
// Read command handlers
// ---------------------------------------------------------------------------

fn cmd_departments(start: &Path, json: bool) -> CmdResult {
    let ws = config_io::load_workspace(start)?;
    let snapshot = ws.open_store()?.snapshot()?;

    let counts: Vec<usize> = snapshot
        .departments
        .iter()
        .map(|d| {
            snapshot
                .positions
                .iter()
                .filter(|p| p.is_active && p.department_key() == d.key())
                .count()
        })
        .collect();

    if json {
        let out: Vec<DepartmentJson> = snapshot
            .departments
            .iter()
            .zip(&counts)
            .map(|(d, n)| department_to_json(d, *n))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if snapshot.departments.is_empty() {
        println!("no departments");
        return Ok(());
    }
    println!("{}", ws.config.org.name);
    for (department, count) in snapshot.departments.iter().zip(counts) {
        println!("{}", format_department_line(department, count, 24));
    }
    Ok(())
}

fn cmd_tree(start: &Path, args: TreeArgs, json: bool) -> CmdResult {
    let ws = config_io::load_workspace(start)?;
    let department = department_arg(&ws, args.department)?;
    let store = ws.open_store()?;
    let view = block_on(load_department(&store, &department))??;

    if json {
        println!("{}", serde_json::to_string_pretty(&tree_to_json(&view))?);
    } else {
        for line in format_tree(&view, args.width) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_check(start: &Path, args: CheckArgs, json: bool) -> CmdResult {
    let ws = config_io::load_workspace(start)?;
    let snapshot = ws.open_store()?.snapshot()?;

    let result = match args.department {
        Some(id) => {
            let department = snapshot
                .department(&id)
                .ok_or_else(|| format!("department not found: {}", id))?;
            check::check_department(&snapshot, department)
        }
        None => check::check_org(&snapshot),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if !result.errors.is_empty() {
        println!("Errors:");
        for err in &result.errors {
            println!("  {}", format_check_error(err));
        }
    }
    if !result.warnings.is_empty() {
        if !result.errors.is_empty() {
            println!();
        }
        println!("Warnings:");
        for warning in &result.warnings {
            println!("  {}", format_check_warning(warning));
        }
    }
    if result.valid {
        println!("✓ hierarchy is valid");
    } else {
        println!("✗ hierarchy has errors");
    }
    Ok(())
}

fn cmd_journal(start: &Path, args: JournalArgs, json: bool) -> CmdResult {
    let ws = config_io::load_workspace(start)?;
    let entries = journal::read_entries(&ws.org_dir, Some(args.limit));

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("journal is empty");
    } else {
        for entry in &entries {
            for line in format_journal_entry(entry) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Write command handlers
// ---------------------------------------------------------------------------

fn cmd_gesture(
    start: &Path,
    department: Option<String>,
    gesture: DragGesture,
    description: String,
    json: bool,
) -> CmdResult {
    let ws = config_io::load_workspace(start)?;
    let department = department_arg(&ws, department)?;
    let engine = ReparentEngine::with_config(ws.open_store()?, ws.config.engine.clone());
    let signals = CliSignals::default();

    let view = block_on(engine.refresh(&department))??;
    let result = block_on(engine.reparent(&view, &gesture, &signals))?;

    match result {
        Ok(Reparented::Skipped(reason)) => {
            if json {
                let skipped = Reparented::Skipped(reason);
                println!("{}", serde_json::to_string_pretty(&reparented_to_json(&skipped, None))?);
            } else {
                println!("{}", format_skip(&reason));
            }
            Ok(())
        }
        Ok(Reparented::Applied(outcome)) => {
            journal_chaining(&ws, &department, &description, &outcome.warnings);
            let after = refreshed(&engine, &signals, &department);

            if json {
                let applied = Reparented::Applied(outcome);
                let tree = after.as_ref().map(tree_to_json);
                println!("{}", serde_json::to_string_pretty(&reparented_to_json(&applied, tree))?);
                return Ok(());
            }

            println!("{}", format_branch(&outcome.branch, &department));
            for warning in &outcome.warnings {
                eprintln!("warning: {} failed: {}", warning.call, warning.error);
            }
            if let Some(view) = &after {
                print_tree(view);
            }
            Ok(())
        }
        Err(err) => {
            match &err {
                ReparentError::Authoritative {
                    call,
                    source,
                    warnings,
                } => {
                    journal_chaining(&ws, &department, &description, warnings);
                    record(
                        &ws,
                        JournalEntry::new(JournalCategory::Authoritative, &description)
                            .field("Department", &department)
                            .field("Call", call)
                            .field("Error", source),
                    );
                }
                ReparentError::CycleDetected { .. } | ReparentError::UnknownPosition { .. } => {
                    record(
                        &ws,
                        JournalEntry::new(JournalCategory::Rejected, &description)
                            .field("Department", &department)
                            .field("Error", &err),
                    );
                }
            }

            // Earlier steps may have landed; show what the store holds now
            let after = refreshed(&engine, &signals, &department);
            if json {
                let failed = ReparentJson::Failed {
                    error: err.to_string(),
                    tree: after.as_ref().map(tree_to_json),
                };
                println!("{}", serde_json::to_string_pretty(&failed)?);
            } else if let Some(view) = &after {
                print_tree(view);
            }
            Err(err.into())
        }
    }
}
