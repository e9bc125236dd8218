/*!
 * Error types for the ollama-translator application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors that can occur when talking to the streaming backend
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The call surface cannot be reached at all
    #[error("backend unavailable")]
    Unavailable,

    /// The backend refused to start a request
    #[error("{0}")]
    Rejected(String),
}

/// Errors raised by preference storage backends
#[derive(Error, Debug)]
pub enum PreferenceError {
    /// Reading or writing the backing file failed
    #[error("Preference file error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file does not contain a valid preference map
    #[error("Invalid preference file: {0}")]
    Parse(#[from] serde_json::Error),
}
