use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ot", about = concat!("orgtree v", env!("CARGO_PKG_VERSION"), " - department hierarchies you can rearrange"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different workspace directory
    #[arg(short = 'C', long = "project-dir", global = true)]
    pub project_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an org/ workspace in the current directory
    Init(InitArgs),
    /// List departments with their heads
    Departments,
    /// Show a department's reporting tree
    Tree(TreeArgs),
    /// Move a position under another (drag SOURCE onto TARGET)
    Mv(MvArgs),
    /// Detach a position from its manager (drop on empty space)
    Detach(DetachArgs),
    /// Validate hierarchy integrity
    Check(CheckArgs),
    /// Show failed and rejected operations
    Journal(JournalArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Organization name (default: inferred from directory name)
    #[arg(long)]
    pub name: Option<String>,
    /// Reinitialize even if org/ already exists
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct TreeArgs {
    /// Department id (default: engine.default_department)
    pub department: Option<String>,
    /// Truncate labels to this many terminal cells
    #[arg(long, default_value_t = 48)]
    pub width: usize,
}

#[derive(Args)]
pub struct MvArgs {
    /// Position being dragged
    pub source: String,
    /// Position it is dropped onto
    pub target: String,
    /// Department id (default: engine.default_department)
    #[arg(long = "dept")]
    pub department: Option<String>,
}

#[derive(Args)]
pub struct DetachArgs {
    /// Position being dragged
    pub source: String,
    #[arg(long = "dept")]
    pub department: Option<String>,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Only check this department
    pub department: Option<String>,
}

#[derive(Args)]
pub struct JournalArgs {
    /// Show at most this many entries
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}
