//! Environment constants and path utilities for dockyard.
//!
//! Centralizes the hardcoded names and defaults used across the control plane
//! so that runtime adapters, provisioners and configuration agree on them.

use std::path::{Path, PathBuf};

/// Application directory name (hidden directory in the user's home)
pub const DOCKYARD_DIR_NAME: &str = ".dockyard";

/// Configuration file name inside [`DOCKYARD_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "dockyard.toml";

/// System-wide configuration file (Unix-like systems)
pub const SYSTEM_CONFIG_FILE: &str = "/etc/dockyard/config.toml";

/// Default tracing filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "dockyard=info";

/// HTTP server and persistence defaults
pub mod server {
    /// Port the API listens on when none is configured
    pub const DEFAULT_LISTEN_PORT: u16 = 3000;

    /// Snapshot file used by the file storage backend
    pub const DEFAULT_STATE_FILE: &str = "dockyard-state.json";

    /// Playground seeded when the configuration defines none
    pub const DEFAULT_PLAYGROUND_ID: &str = "default";

    /// Seconds between expired-session sweeps
    pub const REAPER_INTERVAL_SECS: u64 = 60;
}

/// Runtime defaults
pub mod runtime {
    /// Name of the shared routing container attached to every session network
    pub const ROUTER_CONTAINER_NAME: &str = "pwd-router";

    /// Driver used for per-session networks
    pub const SESSION_NETWORK_DRIVER: &str = "overlay";

    /// Host recorded on a session when the daemon address carries none
    pub const LOCAL_DAEMON_HOST: &str = "localhost";

    /// Bollard request timeout in seconds
    pub const REQUEST_TIMEOUT_SECS: u64 = 120;
}

/// Provisioning defaults
pub mod provisioning {
    /// Image used when neither the request nor the playground names one
    pub const DEFAULT_DIND_IMAGE: &str = "franela/dind";

    /// Prefix of convention-derived instance hostnames (`node1`, `node2`, ...)
    pub const HOSTNAME_PREFIX: &str = "node";

    /// Number of session id characters used as the instance name prefix
    pub const NAME_PREFIX_LEN: usize = 8;

    /// Mount point of the TLS material inside provisioned containers
    pub const CERTS_MOUNT_PATH: &str = "/var/run/pwd/certs";

    /// Label carrying the owning session id on provisioned containers
    pub const SESSION_LABEL: &str = "dockyard.session.id";
}

/// Build config directory path in user's home directory
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    home_dir.join(DOCKYARD_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build local config file path in current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(LOCAL_CONFIG_FILE_NAME)
}
