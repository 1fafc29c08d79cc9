use std::fs;
use std::path::Path;

use crate::cli::commands::InitArgs;
use crate::io::config_io;

const ORG_TOML_TEMPLATE: &str = r##"[org]
name = {name}

[store]
# Record files, relative to this directory
positions_file = "positions.json"
departments_file = "departments.json"
lock_timeout_ms = 5000

[engine]
# Refuse to move a position under one of its own reports
cycle_check = true
# Department used when a command is given none
# default_department = "eng"

[journal]
# Record failed and rejected moves in .journal.log
enabled = true
"##;

/// Infer an organization name from a directory name: hyphens and underscores
/// become spaces, words are capitalized.
fn infer_name(dir_name: &str) -> String {
    dir_name
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn render_org_toml(name: &str) -> String {
    ORG_TOML_TEMPLATE.replace("{name}", &toml::Value::String(name.to_string()).to_string())
}

pub fn cmd_init(args: InitArgs, project_dir: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let root = match project_dir {
        Some(dir) => Path::new(dir).to_path_buf(),
        None => std::env::current_dir()?,
    };
    let org_dir = root.join("org");

    if config_io::config_path(&org_dir).exists() && !args.force {
        return Err("workspace already exists in ./org/ (use --force to reinitialize)".into());
    }

    if let Some(parent) = root.parent()
        && let Ok(outer) = config_io::discover_workspace(parent)
    {
        eprintln!("note: enclosing workspace found at {}/org/", outer.display());
    }

    let name = args.name.unwrap_or_else(|| {
        root.file_name()
            .and_then(|n| n.to_str())
            .map(infer_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Untitled".to_string())
    });

    fs::create_dir_all(&org_dir)?;
    fs::write(config_io::config_path(&org_dir), render_org_toml(&name))?;

    // Keep existing records on --force
    for file in ["positions.json", "departments.json"] {
        let path = org_dir.join(file);
        if !path.exists() {
            fs::write(path, "[]\n")?;
        }
    }

    println!("Initialized orgtree workspace: {}", name);
    Ok(())
}
