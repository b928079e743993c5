//! Error types for the authentication core.
//!
//! Every fallible function in this crate returns an
//! [`error_stack::Report`] whose current context is an [`AuthError`].
//! Callers branch on [`Report::current_context`](error_stack::Report::current_context);
//! lower-level causes (I/O, object store, PKCS#8) stay attached as frames.

use derive_more::{Display, Error};
use http::StatusCode;

/// Error taxonomy shared by the token codec and the key repositories.
///
/// Messages never carry key material or raw token text.
#[derive(Debug, Display, Error)]
pub enum AuthError {
    /// Signing key missing or unusable, or invalid settings.
    #[display("Configuration error: {message}")]
    Configuration { message: String },

    /// Token failed the structural check or a segment failed to decode.
    #[display("Malformed token: {message}")]
    MalformedToken { message: String },

    /// Signature matched no trusted key, or the token is outside its validity window.
    #[display("Invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// Token decoded but carries an unusable identifier.
    #[display("Invalid entity: {message}")]
    InvalidEntity { message: String },

    /// No key record exists under the requested name.
    #[display("Key record '{name}' not found")]
    NotFound { name: String },

    /// Key name is empty or would escape the repository namespace.
    #[display("Invalid key name '{name}'")]
    InvalidKeyName { name: String },

    /// Key could not be converted to or from its PEM/PKCS#8 form.
    #[display("Key encoding error: {message}")]
    KeyEncoding { message: String },

    /// Stored key parsed but is not an Ed25519 key.
    #[display("Unsupported key algorithm: {oid}")]
    UnsupportedKeyAlgorithm { oid: String },

    /// Any other backend failure.
    #[display("Key store {operation} failed for '{name}'")]
    Storage {
        operation: &'static str,
        name: String,
    },
}

/// Maps an error onto the response an HTTP boundary should produce.
pub trait IntoHttpResponse {
    /// HTTP status for this error.
    fn status_code(&self) -> StatusCode;

    /// Message that is safe to show to an end user.
    fn user_message(&self) -> String;
}

impl IntoHttpResponse for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedToken { .. }
            | Self::InvalidCredentials { .. }
            | Self::InvalidEntity { .. } => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidKeyName { .. } => StatusCode::BAD_REQUEST,
            Self::Configuration { .. }
            | Self::KeyEncoding { .. }
            | Self::UnsupportedKeyAlgorithm { .. }
            | Self::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials { .. } | Self::InvalidEntity { .. } => {
                "Authentication failed, please sign in again".into()
            }
            Self::MalformedToken { .. } => "Invalid session token".into(),
            Self::NotFound { .. } => "Not found".into(),
            Self::InvalidKeyName { .. } => "Invalid key name".into(),
            _ => "Internal server error".into(),
        }
    }
}
