//! Resource principal signer (version 2.2)
//!
//! Workloads running inside the platform (functions, jobs, notebook
//! sessions) receive a resource principal session token (RPST) and a private
//! key through environment variables. Each value is either the literal
//! content or an absolute path to a file holding it; the platform rewrites
//! those files as tokens are renewed, so refresh is a cheap re-read.

use std::path::Path;
use std::sync::Arc;

use common::Secret;
use reqwest::header::HeaderMap;
use tracing::info;

use crate::backend::{BackendKind, RefreshFuture, SignerBackend};
use crate::constants::{
    RP_PRIVATE_PEM_ENV, RP_PRIVATE_PEM_PASSPHRASE_ENV, RP_REGION_ENV, RP_RPST_ENV,
    RP_SUPPORTED_VERSION, RP_VERSION_ENV, SECURITY_TOKEN_KEY_PREFIX,
};
use crate::error::{Error, Result};
use crate::keys::parse_private_key;
use crate::signer::{RequestSigner, SignableRequest, SigningOptions};

/// Where the resource principal material comes from.
#[derive(Debug, Clone, Default)]
pub struct ResourcePrincipalSource {
    pub version: Option<String>,
    /// RPST value or absolute path to it
    pub rpst: Option<String>,
    /// PEM value or absolute path to it
    pub private_pem: Option<String>,
    /// Passphrase value or absolute path to it
    pub passphrase: Option<Secret<String>>,
    pub region: Option<String>,
}

impl ResourcePrincipalSource {
    /// Snapshot the `OCI_RESOURCE_PRINCIPAL_*` environment.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            version: var(RP_VERSION_ENV),
            rpst: var(RP_RPST_ENV),
            private_pem: var(RP_PRIVATE_PEM_ENV),
            passphrase: var(RP_PRIVATE_PEM_PASSPHRASE_ENV).map(Secret::new),
            region: var(RP_REGION_ENV),
        }
    }
}

/// Signs with `ST$<rpst>` and the resource principal session key.
#[derive(Debug)]
pub struct ResourcePrincipalBackend {
    source: ResourcePrincipalSource,
    reload_env: bool,
    options: SigningOptions,
    region: Option<String>,
    signer: RequestSigner,
}

impl ResourcePrincipalBackend {
    /// Build from the process environment; refresh re-reads the environment.
    pub fn from_env(options: SigningOptions) -> Result<Self> {
        let mut backend = Self::from_source(ResourcePrincipalSource::from_env(), options)?;
        backend.reload_env = true;
        Ok(backend)
    }

    /// Build from an explicit source; refresh re-reads any files it names.
    pub fn from_source(source: ResourcePrincipalSource, options: SigningOptions) -> Result<Self> {
        match source.version.as_deref() {
            Some(RP_SUPPORTED_VERSION) => {}
            Some(other) => {
                return Err(Error::Config(format!(
                    "unsupported resource principal version {other} (expected {RP_SUPPORTED_VERSION})"
                )));
            }
            None => {
                return Err(Error::Config(format!(
                    "{RP_VERSION_ENV} is not set; not running with a resource principal"
                )));
            }
        }

        let rpst = source
            .rpst
            .as_deref()
            .ok_or_else(|| Error::Config(format!("{RP_RPST_ENV} is not set")))?;
        let pem = source
            .private_pem
            .as_deref()
            .ok_or_else(|| Error::Config(format!("{RP_PRIVATE_PEM_ENV} is not set")))?;

        let token = value_or_file(rpst)?;
        let pem = value_or_file(pem)?;
        let passphrase = source
            .passphrase
            .as_ref()
            .map(|p| value_or_file(p.expose_str()))
            .transpose()?;
        let key = parse_private_key(&pem, passphrase.as_deref())?;

        info!(region = source.region.as_deref().unwrap_or("-"), "loaded resource principal signer");
        Ok(Self {
            region: source.region.clone(),
            signer: RequestSigner::new(
                format!("{SECURITY_TOKEN_KEY_PREFIX}{}", token.trim()),
                key,
                options.clone(),
            ),
            options,
            source,
            reload_env: false,
        })
    }

    /// Region advertised by the platform, when present.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

/// Absolute paths are read from disk; anything else is the value itself.
fn value_or_file(value: &str) -> Result<String> {
    let path = Path::new(value);
    if path.is_absolute() {
        return std::fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .map_err(|e| Error::Io(format!("reading {}: {e}", path.display())));
    }
    Ok(value.to_string())
}

impl SignerBackend for ResourcePrincipalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ResourcePrincipal
    }

    fn sign(&self, request: &SignableRequest<'_>) -> Result<HeaderMap> {
        self.signer.sign(request)
    }

    fn refresh(&self) -> RefreshFuture<'_> {
        let source = if self.reload_env {
            ResourcePrincipalSource::from_env()
        } else {
            self.source.clone()
        };
        let reload_env = self.reload_env;
        let options = self.options.clone();
        Box::pin(async move {
            let mut backend = tokio::task::spawn_blocking(move || {
                ResourcePrincipalBackend::from_source(source, options)
            })
            .await
            .map_err(|e| Error::Io(format!("resource principal reload task failed: {e}")))??;
            backend.reload_env = reload_env;
            Ok(Arc::new(backend) as Arc<dyn SignerBackend>)
        })
    }
}
