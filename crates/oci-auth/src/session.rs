//! Session token signer (interactive login)
//!
//! Reads `security_token_file` and `key_file` from the profile. Both are
//! re-read on every refresh, so a token rotated by an external login command
//! is picked up without restarting the process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::header::HeaderMap;
use tracing::info;

use crate::backend::{BackendKind, RefreshFuture, SignerBackend};
use crate::config::ProfileConfig;
use crate::constants::SECURITY_TOKEN_KEY_PREFIX;
use crate::error::{Error, Result};
use crate::keys::load_private_key_file;
use crate::signer::{RequestSigner, SignableRequest, SigningOptions};

/// Signs with `ST$<session token>` and the profile's private key.
#[derive(Debug)]
pub struct SessionBackend {
    config_file: PathBuf,
    profile: String,
    options: SigningOptions,
    signer: RequestSigner,
}

impl SessionBackend {
    /// Load the session token and key named by `profile` in `config_file`.
    ///
    /// Missing `security_token_file` or `key_file` keys fail immediately.
    pub fn from_config(config_file: &Path, profile: &str, options: SigningOptions) -> Result<Self> {
        let config = ProfileConfig::load(config_file, profile)?;
        let key_file = config.require_path("key_file")?;
        let token_file = config.require_path("security_token_file")?;

        let token = read_token(&token_file)?;
        let key = load_private_key_file(&key_file, config.get("pass_phrase"))?;

        info!(profile, token_file = %token_file.display(), "loaded session token signer");
        Ok(Self {
            config_file: config_file.to_path_buf(),
            profile: profile.to_string(),
            signer: RequestSigner::new(
                format!("{SECURITY_TOKEN_KEY_PREFIX}{token}"),
                key,
                options.clone(),
            ),
            options,
        })
    }
}

fn read_token(path: &Path) -> Result<String> {
    let token = std::fs::read_to_string(path)
        .map_err(|e| Error::Io(format!("reading security token {}: {e}", path.display())))?;
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::Config(format!(
            "security token file {} is empty",
            path.display()
        )));
    }
    Ok(token.to_string())
}

impl SignerBackend for SessionBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Session
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
                SessionBackend::from_config(&config_file, &profile, options)
            })
            .await
            .map_err(|e| Error::Io(format!("session reload task failed: {e}")))??;
            Ok(Arc::new(backend) as Arc<dyn SignerBackend>)
        })
    }
}
