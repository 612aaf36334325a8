//! Owner configuration.
//!
//! A small YAML file under `$HOME/.ghcrctl/` remembers which owner the user
//! works with and whether it is a user or an organization. Loading merges the
//! file over defaults, so a missing file or section is never an error.

use crate::control::{DEFAULT_API_URL, OwnerKind};
use crate::discover::DEFAULT_CONCURRENCY;
use crate::error::{GhcrError, Result};
use crate::operation::DEFAULT_BUDGET;
use crate::registry::DEFAULT_REGISTRY_URL;
use config::{Config as ConfigRs, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};


/// Directory under the home directory holding the config file.
pub const CONFIG_DIR: &str = ".ghcrctl";

/// Config file name.
pub const CONFIG_FILE: &str = "config.yaml";

/// Persisted owner settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct OwnerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_type: Option<OwnerKind>,

    #[serde(default)]
    pub network: NetworkConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Whole-operation budget in seconds
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout: u64,

    /// Concurrent manifest fetches during discovery
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_registry_url")]
    pub registry_url: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            operation_timeout: default_operation_timeout(),
            concurrency: default_concurrency(),
            api_url: default_api_url(),
            registry_url: default_registry_url(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_operation_timeout() -> u64 {
    DEFAULT_BUDGET.as_secs()
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}

/// Returns `<home>/.ghcrctl/config.yaml`.
///
/// `$HOME` wins when set and non-empty; otherwise the platform home
/// directory is used.
pub fn default_path() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .ok_or_else(|| {
            GhcrError::config("Cannot determine home directory; set HOME", None::<&str>)
        })?;
    Ok(path_in(&home))
}

/// Returns the config file location under `home`.
pub fn path_in(home: &Path) -> PathBuf {
    home.join(CONFIG_DIR).join(CONFIG_FILE)
}

impl OwnerConfig {
    /// Parses an `OwnerConfig` from a YAML string, over defaults.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let builder = Self::defaults()?.add_source(File::from_str(s, FileFormat::Yaml));
        Self::from_builder(builder, None)
    }

    /// Loads the config at `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let builder = Self::defaults()?.add_source(
            File::from(path)
                .format(FileFormat::Yaml)
                .required(false),
        );
        let config = Self::from_builder(builder, path.to_str())?;
        tracing::debug!(path = %path.display(), owner = ?config.owner_name, "loaded config");
        Ok(config)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = ConfigRs::try_from(&OwnerConfig::default()).map_err(|e| {
            GhcrError::config_with_source("Failed to build default configuration", None, e)
        })?;
        Ok(ConfigRs::builder().add_source(defaults))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        path: Option<&str>,
    ) -> Result<Self> {
        builder
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|e| GhcrError::config_with_source("Failed to read configuration", path, e))
    }

    /// Writes the config to `path`, replacing any existing file.
    ///
    /// The directory is created with mode `0700` and the file gets `0600`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                GhcrError::config_with_source(
                    "Failed to create config directory",
                    parent.to_str(),
                    e,
                )
            })?;
            restrict(parent, 0o700)?;
        }

        let contents = serde_yaml::to_string(self).map_err(|e| {
            GhcrError::config_with_source("Failed to serialize configuration", path.to_str(), e)
        })?;
        fs::write(path, contents).map_err(|e| {
            GhcrError::config_with_source("Failed to write config file", path.to_str(), e)
        })?;
        restrict(path, 0o600)?;

        tracing::info!(path = %path.display(), "saved config");
        Ok(())
    }

    /// Records `name` as the default owner of kind `kind`.
    pub fn set_owner(&mut self, name: &str, kind: OwnerKind) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GhcrError::usage("owner name cannot be empty"));
        }
        if name.contains('/') {
            return Err(GhcrError::usage(format!(
                "owner name '{}' cannot contain '/'",
                name
            )));
        }
        self.owner_name = Some(name.to_string());
        self.owner_type = Some(kind);
        Ok(())
    }

    /// Owner kind to seed the control client with, when `owner` is the
    /// configured one.
    pub fn kind_for(&self, owner: &str) -> Option<OwnerKind> {
        match (&self.owner_name, self.owner_type) {
            (Some(name), Some(kind)) if name.eq_ignore_ascii_case(owner) => Some(kind),
            _ => None,
        }
    }
}

#[cfg(unix)]
fn restrict(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
        GhcrError::config_with_source("Failed to set permissions", path.to_str(), e)
    })
}

#[cfg(not(unix))]
fn restrict(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
