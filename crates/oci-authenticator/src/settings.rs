//! Auth settings and the backend factory
//!
//! `AuthSettings` is the `[auth]` table of a service config. Only `kind` is
//! required; everything else defaults to the standard OCI locations.
//!
//! ```toml
//! [auth]
//! kind = "session"
//! profile = "CHICAGO"
//! refresh_interval_secs = 1800
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use oci_auth::config::{resolve_config_location, resolve_profile};
use oci_auth::constants::DEFAULT_REFRESH_INTERVAL_SECS;
use oci_auth::{
    BackendKind, InstancePrincipalBackend, InstancePrincipalOptions, ResourcePrincipalBackend,
    SessionBackend, SignerBackend, SigningOptions, UserPrincipalBackend,
};
use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};

/// Which identity to sign with and how to refresh it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthSettings {
    pub kind: BackendKind,
    /// Identity config file; `OCI_CONFIG_FILE` or `~/.oci/config` when unset
    #[serde(default)]
    pub config_file: Option<PathBuf>,
    /// Profile name; `OCI_CLI_PROFILE` or `DEFAULT` when unset
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub signing: SigningOptions,
    #[serde(default)]
    pub instance: InstancePrincipalOptions,
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

impl AuthSettings {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            config_file: None,
            profile: None,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            signing: SigningOptions::default(),
            instance: InstancePrincipalOptions::default(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Reject settings no backend could work with.
    pub fn validate(&self) -> Result<()> {
        if self.signing.generic_headers.is_empty() {
            return Err(Error::Config("signing.generic_headers must not be empty".into()));
        }
        if self.kind == BackendKind::InstancePrincipal {
            if self.instance.timeout_secs == 0 {
                return Err(Error::Config("instance.timeout_secs must be greater than 0".into()));
            }
            if self.instance.session_key_bits < 1024 {
                return Err(Error::Config(format!(
                    "instance.session_key_bits must be at least 1024, got {}",
                    self.instance.session_key_bits
                )));
            }
        }
        Ok(())
    }
}

/// Construct the backend named by `settings.kind`.
///
/// File-backed backends read the identity config now; construction errors
/// (missing fields, unreadable keys) are returned to the caller.
pub async fn build_backend(settings: &AuthSettings) -> Result<Arc<dyn SignerBackend>> {
    let signing = settings.signing.clone();
    let backend: Arc<dyn SignerBackend> = match settings.kind {
        BackendKind::Session | BackendKind::UserPrincipal => {
            let config_file = resolve_config_location(settings.config_file.as_deref());
            let profile = resolve_profile(settings.profile.as_deref());
            info!(
                backend = %settings.kind,
                config_file = %config_file.display(),
                %profile,
                "loading identity profile"
            );
            if settings.kind == BackendKind::Session {
                Arc::new(SessionBackend::from_config(&config_file, &profile, signing)?)
            } else {
                Arc::new(UserPrincipalBackend::from_config(&config_file, &profile, signing)?)
            }
        }
        BackendKind::ResourcePrincipal => Arc::new(ResourcePrincipalBackend::from_env(signing)?),
        BackendKind::InstancePrincipal => Arc::new(
            InstancePrincipalBackend::fetch(settings.instance.clone(), signing).await?,
        ),
    };
    info!(backend = %backend.kind(), "signer backend ready");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../oci-auth/tests/fixtures")
            .join(name)
    }

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn minimal_table_uses_defaults() {
        let settings: AuthSettings = toml::from_str(r#"kind = "user_principal""#).unwrap();
        assert_eq!(settings, AuthSettings::new(BackendKind::UserPrincipal));
        assert_eq!(settings.refresh_interval(), Duration::from_secs(3600));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn nested_tables_override_defaults() {
        let settings: AuthSettings = toml::from_str(
            r#"
            kind = "instance_principal"
            refresh_interval_secs = 0

            [signing]
            generic_headers = ["date", "(request-target)"]

            [instance]
            region = "us-chicago-1"
            timeout_secs = 3
            "#,
        )
        .unwrap();

        assert_eq!(settings.refresh_interval(), Duration::ZERO);
        assert_eq!(settings.signing.generic_headers, ["date", "(request-target)"]);
        assert_eq!(settings.instance.region.as_deref(), Some("us-chicago-1"));
        assert_eq!(settings.instance.timeout_secs, 3);
        assert_eq!(settings.instance.session_key_bits, 2048);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(toml::from_str::<AuthSettings>(r#"kind = "api_key""#).is_err());
    }

    #[test]
    fn validate_rejects_zero_instance_timeout() {
        let mut settings = AuthSettings::new(BackendKind::InstancePrincipal);
        settings.instance.timeout_secs = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[tokio::test]
    async fn builds_user_principal_from_profile() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(
            &dir,
            &format!(
                "[DEFAULT]\n\
                 user=ocid1.user.oc1..aaaa\n\
                 fingerprint=69:ed:ec:61:1b:ac:91:cc:3a:bb:f5:e7:22:47:de:5f\n\
                 tenancy=ocid1.tenancy.oc1..bbbb\n\
                 region=us-chicago-1\n\
                 key_file={}\n",
                fixture("api_key.pem").display()
            ),
        );
        let mut settings = AuthSettings::new(BackendKind::UserPrincipal);
        settings.config_file = Some(config);
        settings.profile = Some("DEFAULT".into());

        let backend = build_backend(&settings).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::UserPrincipal);
    }

    #[tokio::test]
    async fn builds_session_from_named_profile() {
        let dir = tempfile::tempdir().unwrap();
        let token = dir.path().join("token");
        std::fs::write(&token, "session-token").unwrap();
        let config = write_config(
            &dir,
            &format!(
                "[DEFAULT]\nregion=us-chicago-1\n\n[CHICAGO]\nkey_file={}\nsecurity_token_file={}\n",
                fixture("api_key.pem").display(),
                token.display()
            ),
        );
        let mut settings = AuthSettings::new(BackendKind::Session);
        settings.config_file = Some(config);
        settings.profile = Some("CHICAGO".into());

        let backend = build_backend(&settings).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Session);
    }

    #[tokio::test]
    async fn missing_field_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(&dir, "[DEFAULT]\nregion=us-chicago-1\n");
        let mut settings = AuthSettings::new(BackendKind::Session);
        settings.config_file = Some(config);
        settings.profile = Some("DEFAULT".into());

        let Err(err) = build_backend(&settings).await else {
            panic!("profile without key_file should not build");
        };
        assert!(matches!(
            err,
            Error::Backend(oci_auth::Error::MissingField { ref field, .. }) if field == "key_file"
        ));
    }
}
