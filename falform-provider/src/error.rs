//! Error types for the fal provider

use thiserror::Error;

/// Errors that can occur while driving `git` and the `fal` CLI
#[derive(Debug, Error)]
pub enum FalError {
    /// No API key in provider configuration or environment
    #[error("FAL_KEY must be set")]
    MissingKey,

    /// Inputs rejected before any command runs
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The command could not be started at all
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited unsuccessfully
    #[error("{command} failed ({status})\nOutput: {output}")]
    CommandFailed {
        /// Rendered command line with secrets masked
        command: String,
        status: String,
        /// Combined stdout and stderr, verbatim
        output: String,
    },

    /// `git clone` of the application source failed
    #[error("failed to clone repository: {0}")]
    Clone(#[source] Box<FalError>),

    /// `fal profile key set` failed, so the real subcommand never ran
    #[error("failed to set fal profile key: {0}")]
    SetKey(#[source] Box<FalError>),

    /// `fal apps list` did not run to completion
    #[error("failed to list apps: {0}")]
    ListApps(#[source] Box<FalError>),

    /// `fal apps list --json` returned something that is not an app list
    #[error("failed to parse apps list: {0}")]
    Parse(#[from] serde_json::Error),

    /// Scratch directory could not be created
    #[error("failed to create temp directory: {0}")]
    Session(#[source] std::io::Error),

    /// The caller cancelled the operation while a command was running
    #[error("operation cancelled")]
    Cancelled,
}

impl FalError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// Result type for fal operations
pub type FalResult<T> = Result<T, FalError>;
