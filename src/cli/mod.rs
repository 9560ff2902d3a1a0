//! CLI module for geoexplore
//!
//! Provides offline tooling over a configuration file:
//! - explain: compile a request and print the backend plan
//! - assemble: turn a native backend result into the engine response

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, Target};
pub use commands::{assemble, explain, run_command, AssembleInput};
pub use errors::{CliError, CliResult};
pub use io::{parse_input, read_request, write_error, write_response};
