//! Request authentication hook consumed by the API client facade
//!
//! Defines the `AuthProvider` trait that decouples the HTTP client facade from
//! the credential strategy. The facade builds a complete `reqwest::Request`
//! (method, URL, default headers, body) and hands it to the provider, which
//! owns everything between "request built" and "response received":
//! - attach signature headers
//! - forward the request
//! - observe the response and, at most once, send a replacement request
//!
//! Responses are returned as-is whatever their status. A 401 that survives
//! the provider's own retry reaches the facade as an ordinary response, so
//! the facade's HTTP error handling stays the single place that maps status
//! codes to errors.

use std::future::Future;
use std::pin::Pin;

/// Errors from the authentication hook.
///
/// Transport failures are passed through unchanged; authentication rejections
/// are never reported here (they are ordinary responses).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request signing failed: {0}")]
    Auth(String),

    #[error("request body could not be read: {0}")]
    Body(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Boxed future returned by `AuthProvider::send`.
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<reqwest::Response>> + Send + 'a>>;

/// Transport-level authentication strategy.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn AuthProvider>`). Implementations must tolerate true parallel
/// invocation from many tasks.
pub trait AuthProvider: Send + Sync {
    /// Identifier for logging (e.g. "session", "instance_principal")
    fn id(&self) -> &str;

    /// Authenticate `request`, forward it with `client`, and return the
    /// final response.
    ///
    /// The provider may send a replacement request at most once (for example
    /// after refreshing credentials on a 401).
    fn send<'a>(&'a self, client: &'a reqwest::Client, request: reqwest::Request) -> SendFuture<'a>;
}
