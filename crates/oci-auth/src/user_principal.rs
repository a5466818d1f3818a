//! API key signer (user principal)
//!
//! Long-lived credentials from a profile: `tenancy`, `user`, `fingerprint`,
//! and either `key_file` or inline `key_content`, with an optional
//! `pass_phrase`. There is no token to renew; refresh re-reads the profile so
//! a rotated key is picked up without a restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::header::HeaderMap;
use tracing::info;

use crate::backend::{BackendKind, RefreshFuture, SignerBackend};
use crate::config::{ProfileConfig, expand_home};
use crate::error::{Error, Result};
use crate::keys::{load_private_key_file, parse_private_key};
use crate::signer::{RequestSigner, SignableRequest, SigningOptions};

/// Signs with keyId `<tenancy>/<user>/<fingerprint>`.
#[derive(Debug)]
pub struct UserPrincipalBackend {
    config_file: PathBuf,
    profile: String,
    options: SigningOptions,
    tenancy: String,
    signer: RequestSigner,
}

impl UserPrincipalBackend {
    /// Load and validate the API key profile.
    pub fn from_config(config_file: &Path, profile: &str, options: SigningOptions) -> Result<Self> {
        let config = ProfileConfig::load(config_file, profile)?;
        config.validate_user_principal()?;

        let tenancy = config.require("tenancy")?.to_string();
        let user = config.require("user")?;
        let fingerprint = config.require("fingerprint")?;
        let passphrase = config.get("pass_phrase");

        let key = match config.get("key_content") {
            Some(content) => parse_private_key(&content.replace("\\n", "\n"), passphrase)?,
            None => load_private_key_file(&expand_home(config.require("key_file")?), passphrase)?,
        };

        info!(profile, fingerprint, "loaded API key signer");
        Ok(Self {
            config_file: config_file.to_path_buf(),
            profile: profile.to_string(),
            signer: RequestSigner::new(format!("{tenancy}/{user}/{fingerprint}"), key, options.clone()),
            options,
            tenancy,
        })
    }

    /// Tenancy OCID of the signing user.
    pub fn tenancy(&self) -> &str {
        &self.tenancy
    }
}

impl SignerBackend for UserPrincipalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::UserPrincipal
    }

    fn sign(&self, request: &SignableRequest<'_>) -> Result<HeaderMap> {
        self.signer.sign(request)
    }

    fn refresh(&self) -> RefreshFuture<'_> {
        let config_file = self.config_file.clone();
        let profile = self.profile.clone();
        let options = self.options.clone();
        Box::pin(async move {
            let backend = tokio::task::spawn_blocking(move || {
                UserPrincipalBackend::from_config(&config_file, &profile, options)
            })
            .await
            .map_err(|e| Error::Io(format!("API key reload task failed: {e}")))??;
            Ok(Arc::new(backend) as Arc<dyn SignerBackend>)
        })
    }
}
