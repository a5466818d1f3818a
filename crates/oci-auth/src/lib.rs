//! OCI identity and request signing
//!
//! Four signer backends share the [`SignerBackend`] capability:
//!
//! - [`SessionBackend`]: security token file + private key from a profile
//! - [`ResourcePrincipalBackend`]: workload identity from `OCI_RESOURCE_PRINCIPAL_*`
//! - [`InstancePrincipalBackend`]: metadata service certificates federated for a token
//! - [`UserPrincipalBackend`]: long-lived API key from a profile
//!
//! All of them produce OCI HTTP signatures through [`RequestSigner`].

pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod instance_principal;
pub mod keys;
pub mod resource_principal;
pub mod session;
pub mod signer;
pub mod user_principal;

pub use backend::{BackendKind, RefreshFuture, SignerBackend};
pub use config::ProfileConfig;
pub use error::{Error, Result};
pub use instance_principal::{InstancePrincipalBackend, InstancePrincipalOptions};
pub use resource_principal::{ResourcePrincipalBackend, ResourcePrincipalSource};
pub use session::SessionBackend;
pub use signer::{RequestSigner, SignableRequest, SigningOptions};
pub use user_principal::UserPrincipalBackend;
