//! CLI-specific functionality for dockyard
//!
//! This module contains argument parsing and configuration discovery.

pub mod args;
pub mod config;

pub use args::{Args, ExecutionMode, ServeConfig};
pub use config::{ConfigDiscovery, ConfigError, DockyardConfig, StorageBackend};
