//! Signer backend capability shared by all identity variants
//!
//! A backend owns immutable credential material and signs requests with it.
//! Refreshing never mutates a backend: it builds a replacement, and the
//! caller swaps the two under its own lock. Signing takes `&self` and no
//! locks, so a backend can be shared across tasks freely.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::signer::SignableRequest;

/// The closed set of identity variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Session token + private key from a profile (interactive login)
    Session,
    /// Platform-issued workload identity (functions, jobs, notebooks)
    ResourcePrincipal,
    /// Compute instance identity via the metadata service
    InstancePrincipal,
    /// Long-lived API key from a profile
    UserPrincipal,
}

impl BackendKind {
    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            BackendKind::Session => "session",
            BackendKind::ResourcePrincipal => "resource_principal",
            BackendKind::InstancePrincipal => "instance_principal",
            BackendKind::UserPrincipal => "user_principal",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Future produced by `SignerBackend::refresh`.
pub type RefreshFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Arc<dyn SignerBackend>>> + Send + 'a>>;

/// Capability implemented by each identity variant.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn SignerBackend>`).
pub trait SignerBackend: Send + Sync {
    /// Which variant this is.
    fn kind(&self) -> BackendKind;

    /// Headers to merge into `request` (signature plus any computed headers).
    fn sign(&self, request: &SignableRequest<'_>) -> Result<HeaderMap>;

    /// Re-derive credentials and return a replacement backend.
    ///
    /// Leaves `self` untouched; on error the caller keeps using it.
    fn refresh(&self) -> RefreshFuture<'_>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_deserializes_from_snake_case() {
        let kind: BackendKind = serde_json::from_str("\"instance_principal\"").unwrap();
        assert_eq!(kind, BackendKind::InstancePrincipal);
        assert_eq!(kind.to_string(), "instance_principal");
    }

    #[test]
    fn labels_are_distinct() {
        let labels = [
            BackendKind::Session.label(),
            BackendKind::ResourcePrincipal.label(),
            BackendKind::InstancePrincipal.label(),
            BackendKind::UserPrincipal.label(),
        ];
        for (i, a) in labels.iter().enumerate() {
            for b in &labels[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
