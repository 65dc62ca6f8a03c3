// Backup Center - main.rs
// Parses the command line, installs the tracing subscriber and dispatches.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use backup_center::cli::{Cli, dispatch};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = dispatch(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
