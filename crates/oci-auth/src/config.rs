//! Profile-keyed identity configuration file
//!
//! Parses the INI-style file shared by OCI tooling: `[PROFILE]` headers
//! followed by `key=value` lines. Keys in `[DEFAULT]` are inherited by every
//! other profile. The file is read at backend construction and again at each
//! refresh so externally rotated credentials are picked up.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::constants::{CONFIG_FILE_ENV, DEFAULT_CONFIG_LOCATION, DEFAULT_PROFILE, PROFILE_ENV};
use crate::error::{Error, Result};

/// One resolved profile: its own keys layered over `[DEFAULT]`.
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    profile: String,
    values: HashMap<String, String>,
}

impl ProfileConfig {
    /// Read `path` and resolve `profile`.
    pub fn load(path: &Path, profile: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("reading config file {}: {e}", path.display())))?;
        let config = Self::parse(&contents, profile).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{msg} ({})", path.display())),
            other => other,
        })?;
        debug!(path = %path.display(), profile, keys = config.values.len(), "loaded identity profile");
        Ok(config)
    }

    /// Resolve `profile` from file contents.
    pub fn parse(contents: &str, profile: &str) -> Result<Self> {
        let sections = parse_sections(contents);

        let mut values = sections.get(DEFAULT_PROFILE).cloned().unwrap_or_default();
        match sections.get(profile) {
            Some(own) => values.extend(own.iter().map(|(k, v)| (k.clone(), v.clone()))),
            None => {
                return Err(Error::Config(format!(
                    "profile [{profile}] not found in config file"
                )));
            }
        }

        Ok(Self {
            profile: profile.to_string(),
            values,
        })
    }

    /// Profile name this configuration was resolved from.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Optional key; empty values count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Required key, failing with an error that names the key and profile.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| Error::missing(key, &self.profile))
    }

    /// Required key interpreted as a file path (with `~` expansion).
    pub fn require_path(&self, key: &str) -> Result<PathBuf> {
        self.require(key).map(expand_home)
    }

    /// Check the keys an API-key (user principal) signer needs.
    pub fn validate_user_principal(&self) -> Result<()> {
        let user = self.require("user")?;
        let tenancy = self.require("tenancy")?;
        let fingerprint = self.require("fingerprint")?;

        if self.get("key_file").is_none() && self.get("key_content").is_none() {
            return Err(Error::missing("key_file", &self.profile));
        }
        for (field, value) in [("user", user), ("tenancy", tenancy)] {
            if !value.starts_with("ocid") {
                return Err(Error::Config(format!(
                    "`{field}` in profile [{}] is not an OCID: {value}",
                    self.profile
                )));
            }
        }
        if !is_valid_fingerprint(fingerprint) {
            return Err(Error::Config(format!(
                "`fingerprint` in profile [{}] must be 16 colon-separated hex pairs",
                self.profile
            )));
        }
        Ok(())
    }
}

/// Split file contents into `section -> (key -> value)`.
fn parse_sections(contents: &str) -> HashMap<String, HashMap<String, String>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current: Option<String> = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            let name = line[1..line.len() - 1].trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        if let Some(section) = &current
            && let Some((key, value)) = line.split_once('=')
        {
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    sections
}

fn is_valid_fingerprint(fingerprint: &str) -> bool {
    let pairs: Vec<&str> = fingerprint.split(':').collect();
    pairs.len() == 16
        && pairs
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    if path == "~"
        && let Some(home) = dirs::home_dir()
    {
        return home;
    }
    PathBuf::from(path)
}

/// Config file location: explicit argument, then `OCI_CONFIG_FILE`, then `~/.oci/config`.
pub fn resolve_config_location(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return match p.to_str() {
            Some(s) => expand_home(s),
            None => p.to_path_buf(),
        };
    }
    if let Ok(p) = std::env::var(CONFIG_FILE_ENV) {
        return expand_home(&p);
    }
    expand_home(DEFAULT_CONFIG_LOCATION)
}

/// Profile name: explicit argument, then `OCI_CLI_PROFILE`, then `DEFAULT`.
pub fn resolve_profile(explicit: Option<&str>) -> String {
    if let Some(p) = explicit {
        return p.to_string();
    }
    std::env::var(PROFILE_ENV).unwrap_or_else(|_| DEFAULT_PROFILE.to_string())
}
