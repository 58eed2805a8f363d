//! Configuration loader built on figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: `anvil.toml` and `anvil.{profile}.toml`
//! - `yaml-config`: `anvil.yaml` / `anvil.yml` and their profile variants
//!
//! # Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic overrides ([`ConfigLoader::merge`])
//! 3. Main config file (`anvil.toml`)
//! 4. Profile config file (`anvil.{profile}.toml`)
//! 5. Environment variables (`ANVIL_*`)
//!
//! # Environment Variable Mapping
//!
//! `ANVIL_` prefix, `__` as the nesting separator:
//!
//! - `ANVIL_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `ANVIL_BUS__ASYNC_DELIVERY=false` → `bus.async_delivery = false`
//! - `ANVIL_PLUGINS__GREETER__GREETING=hey` → `plugins.greeter.greeting = "hey"`
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./deploy/anvil.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::AnvilConfig;
use super::validation::validate_config;

const ENV_PREFIX: &str = "ANVIL_";
const PROFILE_VAR: &str = "ANVIL_PROFILE";
const APP_DIR: &str = "anvil";

/// Selects the `anvil.{profile}.*` overlay file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_owned()),
        }
    }

    /// Reads `ANVIL_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|name| Self::parse(&name))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multi-source configuration loader.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to search for `anvil.*` files.
    ///
    /// Without any search path the current directory and the user config
    /// directory (`~/.config/anvil` on Linux) are searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join(APP_DIR)),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching. The file must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Layers `config` over the built-in defaults, below files and environment.
    pub fn merge(mut self, config: AnvilConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads, extracts and validates the configuration.
    pub fn load(self) -> ConfigResult<AnvilConfig> {
        let profile = self.profile.clone();
        let config: AnvilConfig = self.build_figment()?.extract()?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            plugin_sections = config.plugins.len(),
            disabled = config.disabled_plugins.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(AnvilConfig::default()));
        figment = figment.merge(std::mem::take(&mut self.figment));

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = merge_file(figment, path)?;
            if let Some(overlay) = profile_variant(path, &self.profile)
                && overlay.exists()
            {
                debug!(path = %overlay.display(), "Loading profile configuration");
                figment = merge_file(figment, &overlay)?;
            }
        } else {
            figment = self.search(figment)?;
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment)
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        Self::new()
            .with_current_dir()
            .with_user_config_dir()
            .search_paths
    }

    /// Loads the first directory holding an `anvil.*` file, base before profile.
    fn search(&self, mut figment: Figment) -> ConfigResult<Figment> {
        for dir in self.resolve_search_paths() {
            let mut found = false;
            for name in base_names() {
                let base = dir.join(name);
                if base.exists() {
                    info!(path = %base.display(), "Loading configuration file");
                    figment = merge_file(figment, &base)?;
                    found = true;
                }
                if let Some(overlay) = profile_variant(&base, &self.profile)
                    && overlay.exists()
                {
                    debug!(path = %overlay.display(), "Loading profile configuration");
                    figment = merge_file(figment, &overlay)?;
                    found = true;
                }
            }
            if found {
                return Ok(figment);
            }
        }

        warn!("No configuration file found, using defaults");
        Ok(figment)
    }
}

/// File names searched for, limited to the enabled formats.
fn base_names() -> Vec<&'static str> {
    let mut names = Vec::new();
    #[cfg(feature = "toml-config")]
    names.push("anvil.toml");
    #[cfg(feature = "yaml-config")]
    names.extend(["anvil.yaml", "anvil.yml"]);
    names
}

/// `dir/anvil.toml` → `dir/anvil.production.toml`.
fn profile_variant(path: &Path, profile: &Profile) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    let ext = path.extension()?.to_str()?;
    Some(path.with_file_name(format!("{stem}.{}.{ext}", profile.as_str())))
}

fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    match extension {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::UnsupportedFormat {
            extension: extension.to_owned(),
        }),
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<AnvilConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from `path` plus environment overrides.
pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<AnvilConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================
