//! Error types for authenticator construction

/// Errors from building an authenticator.
///
/// Refresh failures at request time are not errors here; they are logged and
/// the previous backend keeps signing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid auth settings: {0}")]
    Config(String),

    #[error(transparent)]
    Backend(#[from] oci_auth::Error),
}

/// Result alias for authenticator operations.
pub type Result<T> = std::result::Result<T, Error>;
