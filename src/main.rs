use clap::Parser;
use orgtree::cli::commands::{Cli, Commands};
use orgtree::cli::handlers;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_env("ORGTREE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        // Init is handled before workspace discovery
        Commands::Init(args) => handlers::cmd_init(args, cli.project_dir.as_deref()),
        _ => handlers::dispatch(cli),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
