//! Configuration loading for secret-stash.
//!
//! Resolution order for the config file:
//! 1. Explicit `--config` flag
//! 2. `STASH_CONFIG` environment variable
//! 3. `$XDG_CONFIG_HOME/secret_stash/config.toml` (or the platform config dir)
//! 4. Built-in defaults
//!
//! Path overrides from the CLI (`--staging-dir`, `--store`, which clap also
//! reads from `STASH_STAGING_DIR` / `STASH_STORE`) are applied on top.

use crate::error::{Result, StashError};
use serde::{Deserialize, Serialize};
use stash_store::{MalformedLinePolicy, MergeOptions};
use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const ENV_CONFIG: &str = "STASH_CONFIG";
const DIR_NAME: &str = "secret_stash";
const CONFIG_FILE: &str = "config.toml";
const STAGING_DIR_NAME: &str = "staging";
const STORE_FILE_NAME: &str = "secrets.tsv";

/// Settings for one archiving run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StashConfig {
    /// Per-run scratch directory. Wiped at run start.
    pub staging_dir: PathBuf,
    /// Durable `identifier<TAB>secret` file.
    pub store_path: PathBuf,
    /// Handling of staging lines without a tab.
    pub malformed_lines: MalformedLinePolicy,
    /// Sort the store by identifier when writing it.
    pub sort_output: bool,
    /// Optional HMAC key file; plain SHA-256 identifiers when unset.
    pub identifier_key_file: Option<PathBuf>,
}

impl Default for StashConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DIR_NAME);
        StashConfig {
            staging_dir: data_dir.join(STAGING_DIR_NAME),
            store_path: data_dir.join(STORE_FILE_NAME),
            malformed_lines: MalformedLinePolicy::Skip,
            sort_output: true,
            identifier_key_file: None,
        }
    }
}

impl StashConfig {
    /// Parse a TOML document; `origin` is only used in error messages.
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|source| StashError::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load a TOML config file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| StashError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Apply CLI path overrides.
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(ref dir) = overrides.staging_dir {
            self.staging_dir = dir.clone();
        }
        if let Some(ref path) = overrides.store_path {
            self.store_path = path.clone();
        }
        self
    }

    /// Semantic checks that TOML parsing cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.staging_dir.as_os_str().is_empty() {
            return Err(StashError::Config("staging_dir must not be empty".into()));
        }
        if self.store_path.as_os_str().is_empty() {
            return Err(StashError::Config("store_path must not be empty".into()));
        }
        let staging = resolve_path(&self.staging_dir)?;
        let store = resolve_path(&self.store_path)?;
        if store.starts_with(&staging) {
            return Err(StashError::Config(format!(
                "store_path {} is inside staging_dir {}; it would be wiped at run start",
                self.store_path.display(),
                self.staging_dir.display()
            )));
        }
        Ok(())
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            malformed_lines: self.malformed_lines,
            sort_output: self.sort_output,
        }
    }
}

/// Absolute form of `path` for containment checks: the longest existing
/// prefix is canonicalized (symlinks and `..` resolved by the filesystem) and
/// the not-yet-existing remainder is folded lexically.
fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map_err(|e| {
                StashError::Config(format!("cannot resolve {}: {}", path.display(), e))
            })?
            .join(path)
    };

    let components: Vec<Component<'_>> = absolute.components().collect();
    for split in (1..=components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        if let Ok(mut resolved) = prefix.canonicalize() {
            for component in &components[split..] {
                match component {
                    Component::ParentDir => {
                        resolved.pop();
                    }
                    Component::CurDir => {}
                    other => resolved.push(other.as_os_str()),
                }
            }
            return Ok(resolved);
        }
    }
    Ok(absolute)
}

/// Overrides supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Explicit config file path.
    pub config_file: Option<PathBuf>,
    pub staging_dir: Option<PathBuf>,
    pub store_path: Option<PathBuf>,
}

/// How the config file was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigResolution {
    /// From explicit CLI flag
    CliFlag,
    /// From environment variable
    EnvVar,
    /// From XDG config directory
    XdgConfig,
    /// Using built-in defaults
    Default,
}

impl std::fmt::Display for ConfigResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigResolution::CliFlag => write!(f, "cli"),
            ConfigResolution::EnvVar => write!(f, "env"),
            ConfigResolution::XdgConfig => write!(f, "xdg"),
            ConfigResolution::Default => write!(f, "default"),
        }
    }
}

/// A resolved configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: StashConfig,
    pub path: Option<PathBuf>,
    pub resolution: ConfigResolution,
}

/// Find the config file to use, if any.
pub fn resolve_config_path(overrides: &ConfigOverrides) -> (Option<PathBuf>, ConfigResolution) {
    if let Some(ref path) = overrides.config_file {
        return (Some(path.clone()), ConfigResolution::CliFlag);
    }

    if let Ok(path) = env::var(ENV_CONFIG) {
        if !path.is_empty() {
            return (Some(PathBuf::from(path)), ConfigResolution::EnvVar);
        }
    }

    let config_dir = env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::config_dir);
    if let Some(dir) = config_dir {
        let path = dir.join(DIR_NAME).join(CONFIG_FILE);
        if path.is_file() {
            return (Some(path), ConfigResolution::XdgConfig);
        }
    }

    (None, ConfigResolution::Default)
}

/// Resolve, load, override, and validate the configuration.
pub fn load_config(overrides: &ConfigOverrides) -> Result<LoadedConfig> {
    let (path, resolution) = resolve_config_path(overrides);

    let config = match path {
        Some(ref p) => StashConfig::load_file(p)?,
        None => StashConfig::default(),
    }
    .with_overrides(overrides);
    config.validate()?;

    debug!(
        source = %resolution,
        staging = %config.staging_dir.display(),
        store = %config.store_path.display(),
        "Configuration loaded"
    );

    Ok(LoadedConfig {
        config,
        path,
        resolution,
    })
}
