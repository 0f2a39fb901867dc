//! # Dockyard
//!
//! Control plane for multi-tenant, ephemeral container playgrounds. Every
//! session gets its own overlay network with a shared router attached;
//! instances are provisioned into it by a strategy chosen from the requested
//! instance type.
//!
//! ## Architecture Overview
//!
//! - **[`orchestrator`]**: session and instance lifecycle, ordering and policy
//! - **[`provisioner`]**: session networking and per-type instance strategies
//! - **[`runtime`]**: container runtime abstraction and the Docker backend
//! - **[`storage`]**: persistence of playgrounds, sessions, instances and pool claims
//! - **[`event`]**: lifecycle event publishing
//! - **[`router`]**: encoding of instance addresses into routable host labels
//! - **[`api`]**: HTTP surface and error-to-status mapping
//! - **[`reaper`]**: periodic close of expired sessions
//! - **[`system`]**: assembly of all of the above from configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dockyard::cli::DockyardConfig;
//! use dockyard::runtime::{DockerFactory, DockerFactoryConfig};
//! use dockyard::storage::MemoryStorage;
//! use dockyard::system::PlaygroundSystem;
//! use dockyard::types::{InstanceConfig, SessionConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DockyardConfig::default();
//!     let factory = Arc::new(DockerFactory::new(DockerFactoryConfig::default()));
//!     let system = PlaygroundSystem::new(config, factory, Arc::new(MemoryStorage::new())).await?;
//!
//!     let orchestrator = system.orchestrator();
//!     let session = orchestrator
//!         .session_new(SessionConfig {
//!             playground_id: "default".to_string(),
//!             ..Default::default()
//!         })
//!         .await?;
//!     let instance = orchestrator
//!         .instance_new(&session, InstanceConfig::default())
//!         .await?;
//!     println!("{} is reachable as {}", instance.name, instance.proxy_host);
//!
//!     orchestrator.session_close(&session).await?;
//!     Ok(())
//! }
//! ```

/// HTTP API built on warp.
pub mod api;

/// Command line parsing and configuration discovery.
pub mod cli;

pub mod env;
pub mod error;
pub mod event;
pub mod id;

/// Session and instance lifecycle coordination.
///
/// The orchestrator owns operation ordering: runtime work first, then
/// persistence, then the lifecycle event.
pub mod orchestrator;

pub mod provisioner;
pub mod reaper;
pub mod router;

/// Container runtime abstraction.
///
/// The Docker backend is behind the `docker` feature.
pub mod runtime;

pub mod storage;
pub mod system;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{NotFoundKind, PlaygroundError};
pub use event::{Event, EventBus, EventKind, EventPublisher};
pub use id::{IdGenerator, UuidGenerator};
pub use orchestrator::Orchestrator;
pub use system::PlaygroundSystem;
pub use types::{
    Instance, InstanceConfig, InstanceKind, Playground, Session, SessionConfig, SessionStatus,
};
