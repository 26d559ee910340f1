//! # Dockyard
//!
//! Local orchestration for a fixed backend topology: a Postgres datastore, a
//! PostgREST layer over it and an optional Kong gateway, each in its own
//! Docker container on a private network.
//!
//! ## Lifecycle
//!
//! - **Clean start**: containers carrying the project label and the managed
//!   network left over from a previous run are removed.
//! - **Ordered startup**: each service is created, started, probed for
//!   readiness with bounded backoff and given its post-start hook (credential
//!   patch and migrations for the datastore) before the next one starts.
//! - **Rollback**: every started container is registered in a
//!   [`StopRegistry`] right away, so a failure at any step unwinds exactly what
//!   was started, in reverse order.
//! - **Shutdown**: the [`ShutdownCoordinator`] turns SIGINT/SIGTERM into a
//!   drain of the status server followed by the registry unwind.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dockyard::{DockerClient, MigrationSet, Orchestrator, OrchestratorContext, Parser, Secrets};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), dockyard::Error> {
//! let config = Parser::new().load(None)?;
//! let ctx = OrchestratorContext::new(
//!     config,
//!     Arc::new(DockerClient::new()),
//!     Secrets::generate()?,
//!     CancellationToken::new(),
//! );
//!
//! let mut orchestrator = Orchestrator::new(ctx, MigrationSet::embedded()?);
//! orchestrator.bootstrap().await?;
//!
//! // ... serve traffic ...
//!
//! orchestrator.unwind().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod docker;
pub mod error;
pub mod healthcheck;
pub mod migration;
pub mod network;
pub mod orchestrator;
pub mod server;
pub mod services;
pub mod shutdown;
pub mod status;
pub mod supervisor;

pub use config::{Config, Parser};
pub use docker::{ContainerRuntime, DockerClient};
pub use error::{Error, Result};
pub use migration::{MigrationEngine, MigrationReport, MigrationSet};
pub use network::NetworkManager;
pub use orchestrator::{Orchestrator, OrchestratorContext, StopRegistry, UnwindReport};
pub use services::{Secrets, Service};
pub use shutdown::{ShutdownCoordinator, ShutdownPhase};
pub use status::{Component, StatusFlags};
pub use supervisor::{ContainerHandle, ContainerSupervisor, ServiceDescriptor};
