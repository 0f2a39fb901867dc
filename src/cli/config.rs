//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Explicit `--config` path
//! 2. Current directory: ./dockyard.toml
//! 3. User config: ~/.dockyard/config.toml
//! 4. System config: /etc/dockyard/config.toml
//! 5. Built-in defaults

use crate::env;
use crate::provisioner::DindConfig;
use crate::reaper::ReaperConfig;
use crate::types::{Playground, PoolSlot};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env as std_env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen: SocketAddr,
    /// Upper bound on a single API operation
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], env::server::DEFAULT_LISTEN_PORT)),
            request_timeout_secs: env::runtime::REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Docker daemon address; local defaults when unset
    pub daemon_url: Option<String>,
    pub timeout_secs: u64,
    pub router_container: String,
    pub network_driver: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            daemon_url: None,
            timeout_secs: env::runtime::REQUEST_TIMEOUT_SECS,
            router_container: env::runtime::ROUTER_CONTAINER_NAME.to_string(),
            network_driver: env::runtime::SESSION_NETWORK_DRIVER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningSettings {
    pub default_dind_image: String,
    pub privileged: bool,
    pub tls_cert_dir: Option<PathBuf>,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            default_dind_image: env::provisioning::DEFAULT_DIND_IMAGE.to_string(),
            privileged: true,
            tls_cert_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from(env::server::DEFAULT_STATE_FILE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperSettings {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: env::server::REAPER_INTERVAL_SECS,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockyardConfig {
    pub server: ServerSettings,
    pub runtime: RuntimeSettings,
    pub provisioning: ProvisioningSettings,
    pub storage: StorageSettings,
    pub reaper: ReaperSettings,
    pub playgrounds: Vec<Playground>,
    pub windows_pool: Vec<PoolSlot>,
}

impl DockyardConfig {
    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: DockyardConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.reaper.enabled && self.reaper.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reaper.interval_secs must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for playground in &self.playgrounds {
            if playground.id.trim().is_empty() {
                return Err(ConfigError::Invalid("playground id is empty".to_string()));
            }
            if !seen.insert(playground.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate playground id: {}",
                    playground.id
                )));
            }
        }

        let mut seen = HashSet::new();
        for slot in &self.windows_pool {
            if !seen.insert(slot.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate windows pool slot: {}",
                    slot.id
                )));
            }
        }
        Ok(())
    }

    /// Playgrounds to seed into storage; a single default one when none are configured.
    pub fn seed_playgrounds(&self) -> Vec<Playground> {
        if self.playgrounds.is_empty() {
            vec![Playground::new(env::server::DEFAULT_PLAYGROUND_ID)]
        } else {
            self.playgrounds.clone()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn dind_config(&self) -> DindConfig {
        DindConfig {
            default_image: self.provisioning.default_dind_image.clone(),
            privileged: self.provisioning.privileged,
            tls_cert_dir: self.provisioning.tls_cert_dir.clone(),
        }
    }

    pub fn reaper_config(&self) -> ReaperConfig {
        ReaperConfig {
            enabled: self.reaper.enabled,
            interval: Duration::from_secs(self.reaper.interval_secs),
        }
    }

    #[cfg(feature = "docker")]
    pub fn docker_factory_config(&self) -> crate::runtime::DockerFactoryConfig {
        crate::runtime::DockerFactoryConfig {
            daemon_url: self.runtime.daemon_url.clone(),
            timeout: self.runtime.timeout_secs,
        }
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Load the explicit file if given, else the first file in the hierarchy,
    /// else defaults. Returns the file the configuration came from.
    pub fn discover_config(
        config_override: Option<&Path>,
    ) -> Result<(DockyardConfig, Option<PathBuf>), ConfigError> {
        if let Some(path) = config_override {
            info!("Loading configuration from: {:?}", path);
            return Ok((DockyardConfig::from_toml_file(path)?, Some(path.to_path_buf())));
        }

        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            let config = DockyardConfig::from_toml_file(&config_path)?;
            return Ok((config, Some(config_path)));
        }

        info!("No configuration file found, using defaults");
        Ok((DockyardConfig::default(), None))
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        for candidate in Self::get_config_candidates() {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Get list of configuration file candidates in priority order
    fn get_config_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = std_env::current_dir() {
            candidates.push(env::local_config_file_path(&current_dir));
        }

        if let Some(home_dir) = Self::get_home_dir() {
            candidates.push(env::user_config_file_path(&home_dir));
        }

        #[cfg(unix)]
        candidates.push(PathBuf::from(env::SYSTEM_CONFIG_FILE));

        candidates
    }

    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info(config_override: Option<&Path>) {
        println!("Configuration Discovery Hierarchy:");
        println!();

        if let Some(path) = config_override {
            println!("  0. {:?} - --config", path);
        }
        for (i, candidate) in Self::get_config_candidates().iter().enumerate() {
            let status = if candidate.is_file() {
                "EXISTS"
            } else if candidate.exists() {
                "NOT A FILE"
            } else {
                "NOT FOUND"
            };
            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        match config_override
            .map(Path::to_path_buf)
            .or_else(Self::find_config_file)
        {
            Some(found) => println!("Active configuration: {:?}", found),
            None => println!("Active configuration: Built-in defaults"),
        }
    }
}
