//! Request authentication for OCI-signed API calls
//!
//! [`Authenticator`] implements [`provider::AuthProvider`]: it keeps a signer
//! backend fresh through a [`RefreshPolicy`], signs each outbound request,
//! and retries once with a refreshed signer when the service answers 401.

pub mod authenticator;
pub mod error;
pub mod refresh;
pub mod settings;

#[cfg(test)]
mod testing;

pub use authenticator::Authenticator;
pub use error::{Error, Result};
pub use refresh::RefreshPolicy;
pub use settings::{AuthSettings, build_backend};
