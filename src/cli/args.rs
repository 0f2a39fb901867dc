//! Command line argument parsing
//!
//! Subcommands:
//! - `serve`: Run the control plane API
//! - `show-config`: Show configuration discovery information

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Serve(ServeConfig),
    ShowConfig { config_override: Option<PathBuf> },
}

#[derive(Debug, PartialEq, Eq)]
pub struct ServeConfig {
    pub config_override: Option<PathBuf>,
    pub listen_override: Option<SocketAddr>,
    pub verbose: bool,
}

#[derive(Debug, Parser)]
#[command(name = "dockyard")]
#[command(author = "Dockyard Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Control plane for ephemeral multi-tenant container playgrounds")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP API and session reaper
    Serve {
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Address to listen on, overriding the configuration
        #[arg(short = 'l', long = "listen")]
        listen: Option<SocketAddr>,
        /// Enable verbose output
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },
    /// Show configuration discovery information and the effective configuration
    ShowConfig {
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Serve {
                config,
                listen,
                verbose,
            }) => Ok(ExecutionMode::Serve(ServeConfig {
                config_override: config.clone(),
                listen_override: *listen,
                verbose: *verbose,
            })),
            Some(Commands::ShowConfig { config }) => Ok(ExecutionMode::ShowConfig {
                config_override: config.clone(),
            }),
            None => Err(
                "No command specified. Use 'dockyard --help' to see available commands."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_command() {
        let args = Args::try_parse_from([
            "dockyard",
            "serve",
            "--config",
            "/etc/dockyard/config.toml",
            "--listen",
            "127.0.0.1:8080",
            "-v",
        ])
        .unwrap();

        assert_eq!(
            args.mode().unwrap(),
            ExecutionMode::Serve(ServeConfig {
                config_override: Some(PathBuf::from("/etc/dockyard/config.toml")),
                listen_override: Some("127.0.0.1:8080".parse().unwrap()),
                verbose: true,
            })
        );
    }

    #[test]
    fn test_serve_defaults() {
        let args = Args::try_parse_from(["dockyard", "serve"]).unwrap();
        assert_eq!(
            args.mode().unwrap(),
            ExecutionMode::Serve(ServeConfig {
                config_override: None,
                listen_override: None,
                verbose: false,
            })
        );
    }

    #[test]
    fn test_show_config_command() {
        let args = Args::try_parse_from(["dockyard", "show-config"]).unwrap();
        assert_eq!(
            args.mode().unwrap(),
            ExecutionMode::ShowConfig {
                config_override: None
            }
        );
    }

    #[test]
    fn test_invalid_listen_address() {
        assert!(Args::try_parse_from(["dockyard", "serve", "--listen", "nowhere"]).is_err());
    }

    #[test]
    fn test_no_command() {
        let args = Args { command: None };
        assert!(args.mode().is_err());
    }
}
