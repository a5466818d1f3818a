//! Common types shared by the OCI signing crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
