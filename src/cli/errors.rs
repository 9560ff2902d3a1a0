//! CLI-specific error types

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::errors::ExploreError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed input: {0}")]
    Input(#[from] serde_json::Error),

    #[error("Empty input")]
    EmptyInput,

    #[error("{0}")]
    Explore(#[from] ExploreError),
}

impl CliError {
    /// Error code written in the error response
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Input(_) | Self::EmptyInput => "MALFORMED_INPUT",
            Self::Explore(e) => e.code().code(),
        }
    }

    /// Message written in the error response
    pub fn message(&self) -> String {
        match self {
            Self::Explore(e) => e.message().to_string(),
            other => other.to_string(),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
