//! CLI error types.

use std::fmt;

use error_stack::Report;
use inkwell_auth::error::AuthError;

#[derive(Debug)]
pub enum CliError {
    /// Error reported by the authentication core
    Auth(Report<AuthError>),
    /// Invalid command-line input
    InvalidInput(String),
    /// JSON serialization error
    Json(serde_json::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Auth(report) => write!(f, "{}", report.current_context()),
            CliError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            CliError::Json(err) => write!(f, "JSON error: {}", err),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Auth(report) => Some(report.current_context()),
            CliError::Json(err) => Some(err),
            CliError::InvalidInput(_) => None,
        }
    }
}

impl From<Report<AuthError>> for CliError {
    fn from(report: Report<AuthError>) -> Self {
        CliError::Auth(report)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Json(err)
    }
}
