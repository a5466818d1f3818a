//! Error types for identity configuration and request signing

/// Errors from building or using a signer backend.
///
/// `Config`, `MissingField` and `KeyLoad` are construction-time errors and are
/// fatal to the caller. `Http` and `Federation` come from identity services
/// and are treated as transient by the refresh policy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing required field `{field}` in profile [{profile}]")]
    MissingField { field: String, profile: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("private key error: {0}")]
    KeyLoad(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token federation failed: {0}")]
    Federation(String),
}

impl Error {
    /// Shorthand for a missing profile key.
    pub(crate) fn missing(field: &str, profile: &str) -> Self {
        Error::MissingField {
            field: field.to_string(),
            profile: profile.to_string(),
        }
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
