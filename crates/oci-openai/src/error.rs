//! Error types for the client facade

/// Errors from building or calling the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Construction-time problem: no endpoint, missing compartment, bad header.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Provider(#[from] provider::ProviderError),

    /// Non-2xx response, including a 401 that survived the auth retry.
    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
