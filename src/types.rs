//! Playground domain types.
//!
//! Playgrounds, sessions and instances are the records the orchestrator
//! persists; the `*Config` types are request-time parameters that only
//! inform what gets created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

use crate::env;

fn default_session_duration_secs() -> u64 {
    4 * 60 * 60
}

/// A named policy scope that owns sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playground {
    pub id: String,
    /// Public domain instances of this playground are reachable under
    #[serde(default)]
    pub domain: String,
    /// Image used by the standard provisioner when the request names none
    #[serde(default)]
    pub default_dind_instance_image: String,
    /// Whether restricted-pool (windows) instances may be requested
    #[serde(default)]
    pub allow_windows_instances: bool,
    /// Session lifetime applied when the session request carries none
    #[serde(default = "default_session_duration_secs")]
    pub default_session_duration_secs: u64,
}

impl Playground {
    /// Create a playground with default policy.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            domain: String::new(),
            default_dind_instance_image: String::new(),
            allow_windows_instances: false,
            default_session_duration_secs: default_session_duration_secs(),
        }
    }

    pub fn default_session_duration(&self) -> Duration {
        Duration::from_secs(self.default_session_duration_secs)
    }

    /// Whether instances of `kind` may be created in this playground.
    pub fn allows(&self, kind: InstanceKind) -> bool {
        match kind {
            InstanceKind::Linux => true,
            InstanceKind::Windows => self.allow_windows_instances,
        }
    }
}

/// Lifecycle state of a persisted session.
///
/// A session is `Active` once its network exists and moves to `Closing`
/// when teardown starts; it is removed from storage when teardown ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Closing,
}

/// An isolated tenant workspace: one overlay network plus a routing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub user_id: String,
    pub playground_id: String,
    /// Runtime node serving the session
    pub host: String,
    /// Address of the routing component on the session network
    pub router_ip: Option<String>,
    pub image_name: Option<String>,
    #[serde(default)]
    pub status: SessionStatus,
}

impl Session {
    pub fn is_closing(&self) -> bool {
        self.status == SessionStatus::Closing
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Prefix of the session id used to name instances.
    pub fn short_id(&self) -> &str {
        self.id
            .get(..env::provisioning::NAME_PREFIX_LEN)
            .unwrap_or(&self.id)
    }
}

/// Instance type tag used to pick a provisioning strategy.
///
/// Unknown or absent type strings map to [`InstanceKind::Linux`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceKind {
    Windows,
    #[default]
    Linux,
}

impl InstanceKind {
    /// Parse a request type tag, ignoring case.
    pub fn from_type(value: &str) -> Self {
        if value.eq_ignore_ascii_case("windows") {
            InstanceKind::Windows
        } else {
            InstanceKind::Linux
        }
    }
}

impl<'de> Deserialize<'de> for InstanceKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tag = Option::<String>::deserialize(deserializer)?;
        Ok(tag.as_deref().map(Self::from_type).unwrap_or_default())
    }
}

impl fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKind::Linux => write!(f, "linux"),
            InstanceKind::Windows => write!(f, "windows"),
        }
    }
}

/// A provisioned container belonging to exactly one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub image: String,
    pub hostname: String,
    pub ip: String,
    pub routable_ip: String,
    pub session_id: String,
    pub session_host: String,
    pub proxy_host: String,
    #[serde(rename = "type", default)]
    pub kind: InstanceKind,
    /// Pool slot backing a restricted-pool instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows_id: Option<String>,
}

/// Request-time parameters for a new instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    #[serde(rename = "imageName", alias = "image_name", default)]
    pub image_name: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: InstanceKind,
    /// Public FQDN the request arrived on
    #[serde(default, skip_serializing)]
    pub playground_fqdn: String,
}

impl InstanceConfig {
    /// Requested image, ignoring blank values.
    pub fn requested_image(&self) -> Option<&str> {
        self.image_name.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Requested hostname, ignoring blank values.
    pub fn requested_hostname(&self) -> Option<&str> {
        self.hostname.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Request-time parameters for a new session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub playground_id: String,
    pub user_id: String,
    /// Zero means the playground's default duration
    pub duration: Duration,
    pub image_name: Option<String>,
}

/// One pre-provisioned host of the restricted-OS pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSlot {
    pub id: String,
    pub address: String,
}

/// Claim of a pool slot by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAllocation {
    pub slot_id: String,
    pub session_id: String,
    pub allocated_at: DateTime<Utc>,
}
