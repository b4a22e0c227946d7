//! Error handling module for drivermgr
//!
//! Failures talking to the system (I/O, spawning external commands) use
//! `DriverManagerError`. Configuration loading reports through `anyhow`.
//! Domain rejections have their own types next to the code that produces
//! them (`session::RequestRejection`, `operation::OperationTransitionError`).

use thiserror::Error;

/// Main error type for drivermgr
#[derive(Error, Debug)]
pub enum DriverManagerError {
    /// IO errors (file operations, pipes to child processes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An external command could not be started or exited unsuccessfully
    #[error("Command `{command}` failed: {message}")]
    Command { command: String, message: String },
}

/// Result type alias for drivermgr operations
pub type Result<T> = std::result::Result<T, DriverManagerError>;

impl DriverManagerError {
    /// Create a command error
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            message: message.into(),
        }
    }
}
