//! Container runtime boundary.
//!
//! Everything above this module talks to Docker through the
//! [`ContainerRuntime`] trait so the orchestration core can run against the
//! real daemon ([`DockerClient`]) or an in-memory double in tests.

pub mod client;
pub mod error;
pub mod types;

pub use client::DockerClient;
pub use error::DockerError;
pub use types::*;

use async_trait::async_trait;
use std::time::Duration;

/// Result type for runtime calls.
pub type RuntimeResult<T> = std::result::Result<T, DockerError>;

/// Write side of a container's stdin, held open while the container should live.
///
/// Closing it delivers EOF to the containerized process, which the services
/// treat as a cooperative shutdown request.
#[async_trait]
pub trait ControlChannel: Send {
    async fn close(&mut self) -> RuntimeResult<()>;
}

/// Operations the orchestrator needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Cheap liveness check of the daemon itself.
    async fn ping(&self) -> RuntimeResult<()>;

    async fn image_exists(&self, image: &str) -> RuntimeResult<bool>;

    /// Pull an image, discarding progress output.
    async fn pull_image(&self, image: &str) -> RuntimeResult<()>;

    /// Create (but do not start) a container. Returns its id.
    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String>;

    async fn start_container(&self, id: &str) -> RuntimeResult<()>;

    /// Open a stdin-only attachment used as the shutdown signal.
    async fn attach_control(&self, id: &str) -> RuntimeResult<Box<dyn ControlChannel>>;

    /// Block until the container is no longer running. Returns its exit code.
    async fn wait_container(&self, id: &str) -> RuntimeResult<i64>;

    async fn stop_container(&self, id: &str, timeout: Duration) -> RuntimeResult<()>;

    async fn remove_container(&self, id: &str, force: bool) -> RuntimeResult<()>;

    /// All containers (running or not) carrying `label` (`key=value`).
    async fn list_containers(&self, label: &str) -> RuntimeResult<Vec<ContainerSummary>>;

    /// Run a one-shot command in a running container.
    ///
    /// A non-zero exit is reported through [`ExecOutput::exit_code`], not as an error.
    async fn exec(&self, id: &str, argv: &[String]) -> RuntimeResult<ExecOutput>;

    /// Networks whose name is exactly `name`.
    async fn list_networks(&self, name: &str) -> RuntimeResult<Vec<NetworkSummary>>;

    async fn create_network(&self, spec: &NetworkSpec) -> RuntimeResult<String>;

    /// Id of the network called `name`, if it exists.
    async fn inspect_network(&self, name: &str) -> RuntimeResult<Option<String>>;

    async fn remove_network(&self, name: &str) -> RuntimeResult<()>;
}

/// Shorten a container or network id for logs: first and last five characters.
pub fn preview_id(id: &str) -> String {
    if id.len() <= 10 || !id.is_ascii() {
        return id.to_string();
    }
    format!("{}...{}", &id[..5], &id[id.len() - 5..])
}
