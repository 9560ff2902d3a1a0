//! CLI argument definitions using clap
//!
//! Commands:
//! - geoexplore explain --config <path> --collection <name>
//! - geoexplore assemble --config <path> --collection <name>

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::BackendKind;

/// geoexplore - compile geospatial exploration requests into backend plans
#[derive(Parser, Debug)]
#[command(name = "geoexplore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log compiled plans and backend diagnostics
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Path to configuration file
    #[arg(long, default_value = "./geoexplore.json")]
    pub config: PathBuf,

    /// Collection the request is scoped to
    #[arg(long)]
    pub collection: String,

    /// Backend override; the configured backend otherwise
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a request read on stdin and print the backend plan
    Explain {
        #[command(flatten)]
        target: Target,
    },

    /// Assemble a backend result read on stdin into the response
    Assemble {
        #[command(flatten)]
        target: Target,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
