//! OpenAI-compatible client for OCI Generative AI
//!
//! The endpoint resolver turns a region, service endpoint or explicit base
//! URL into the API base, and builds the compartment and conversation store
//! routing headers. [`OciOpenAI`] sends JSON requests through any
//! [`provider::AuthProvider`], usually an OCI request authenticator.

pub mod client;
pub mod endpoint;
pub mod error;

pub use client::{OciOpenAI, OciOpenAIBuilder};
pub use endpoint::{build_base_url, build_headers, build_service_endpoint, resolve_base_url};
pub use error::{ClientError, Result};
