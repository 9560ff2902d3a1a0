//! geoexplore CLI entry point
//!
//! Installs the log subscriber, dispatches to the CLI module, prints errors
//! to stderr and exits with non-zero on failure. Logs go to stderr so stdout
//! carries only the JSON response.

use geoexplore::cli::{self, Cli};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Cli::parse_args();
    init_tracing(args.verbose);

    if let Err(e) = cli::run_command(args.command) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
