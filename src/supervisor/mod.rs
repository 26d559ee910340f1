//! Container lifecycle: pull, create, start, attach, monitor, stop.

mod descriptor;
mod handle;

pub use descriptor::ServiceDescriptor;
pub use handle::{ContainerExit, ContainerHandle, ExitNotice};

use crate::config::StopConfig;
use crate::docker::{preview_id, ContainerRuntime, DockerError, ExecOutput, RuntimeResult};
use crate::error::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs service containers on the managed network.
#[derive(Clone)]
pub struct ContainerSupervisor {
    runtime: Arc<dyn ContainerRuntime>,
    network: String,
    stop: StopConfig,
}

impl ContainerSupervisor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, network: impl Into<String>, stop: StopConfig) -> Self {
        Self {
            runtime,
            network: network.into(),
            stop,
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Start a container for `descriptor` and begin monitoring it.
    ///
    /// On any failure after creation the container is removed before the
    /// error is returned, so a failed run never leaves a container behind.
    pub async fn run(
        &self,
        token: &CancellationToken,
        descriptor: &ServiceDescriptor,
    ) -> Result<(Arc<ContainerHandle>, ExitNotice)> {
        descriptor.validate()?;
        let name = descriptor.name.as_str();
        let unavailable = |step: &str, e: DockerError| Error::RuntimeUnavailable {
            service: name.to_string(),
            reason: format!("{}: {}", step, e),
        };

        let cached = cancellable(token, name, self.runtime.image_exists(&descriptor.image))
            .await?
            .map_err(|e| unavailable("inspect image", e))?;
        if !cached {
            tracing::info!("Pulling image {}", descriptor.image);
            cancellable(token, name, self.runtime.pull_image(&descriptor.image))
                .await?
                .map_err(|e| unavailable("pull", e))?;
        }

        // Not raced against the token; the client's timeout bounds it.
        if token.is_cancelled() {
            return Err(Error::Cancelled(name.to_string()));
        }
        let spec = descriptor.to_spec(&self.network);
        let id = self
            .runtime
            .create_container(&spec)
            .await
            .map_err(|e| unavailable("create", e))?;
        tracing::debug!("Created container '{}' ({})", name, preview_id(&id));
        if token.is_cancelled() {
            self.discard(&id, name).await;
            return Err(Error::Cancelled(name.to_string()));
        }

        let started = cancellable(token, name, self.runtime.start_container(&id)).await;
        if let Err(e) = flatten(started, |e| unavailable("start", e)) {
            self.discard(&id, name).await;
            return Err(e);
        }

        let attached = cancellable(token, name, self.runtime.attach_control(&id)).await;
        let control = match flatten(attached, |e| unavailable("attach", e)) {
            Ok(control) => control,
            Err(e) => {
                tracing::warn!("Could not attach to '{}', stopping it", name);
                self.discard(&id, name).await;
                return Err(e);
            }
        };

        let handle = Arc::new(ContainerHandle::new(
            id.clone(),
            name.to_string(),
            self.runtime.clone(),
            control,
            self.stop.timeout,
            self.stop.settle,
        ));

        let (tx, notice) = ExitNotice::channel();
        let runtime = self.runtime.clone();
        let monitored = name.to_string();
        let monitor = tokio::spawn(async move {
            let exit = match runtime.wait_container(&id).await {
                Ok(code) => ContainerExit {
                    name: monitored,
                    exit_code: Some(code),
                    error: None,
                },
                Err(e) => ContainerExit {
                    name: monitored,
                    exit_code: None,
                    error: Some(e.to_string()),
                },
            };
            let _ = tx.send(exit);
        });
        handle.set_monitor(monitor);

        tracing::info!("Started container '{}' ({})", name, preview_id(handle.id()));
        Ok((handle, notice))
    }

    /// Run a one-shot command, returning combined output with the exit code.
    pub async fn exec_output(
        &self,
        token: &CancellationToken,
        container_id: &str,
        argv: &[String],
    ) -> Result<ExecOutput> {
        let label = argv.first().map(String::as_str).unwrap_or("exec");
        Ok(cancellable(token, label, self.runtime.exec(container_id, argv)).await??)
    }

    /// Run a one-shot command; a non-zero exit is an error carrying the output.
    pub async fn exec(
        &self,
        token: &CancellationToken,
        container_id: &str,
        argv: &[String],
    ) -> Result<String> {
        let out = self.exec_output(token, container_id, argv).await?;
        if out.success() {
            Ok(out.output)
        } else {
            Err(DockerError::cmd_failed(
                argv.join(" "),
                out.output.trim(),
                i32::try_from(out.exit_code).ok(),
            )
            .into())
        }
    }

    /// Stop and remove a container that never became a handle.
    async fn discard(&self, id: &str, name: &str) {
        if let Err(e) = self.runtime.stop_container(id, self.stop.timeout).await {
            if !e.is_gone() {
                tracing::warn!("Stopping '{}' after failed start: {}", name, e);
            }
        }
        if let Err(e) = self.runtime.remove_container(id, true).await {
            tracing::warn!("Removing '{}' after failed start: {}", name, e);
        }
    }
}

/// Race `fut` against cancellation of `token`.
async fn cancellable<T, F>(token: &CancellationToken, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;

        _ = token.cancelled() => Err(Error::Cancelled(what.to_string())),
        value = fut => Ok(value),
    }
}

fn flatten<T>(
    r: Result<RuntimeResult<T>>,
    map: impl FnOnce(DockerError) -> Error,
) -> Result<T> {
    match r {
        Ok(inner) => inner.map_err(map),
        Err(e) => Err(e),
    }
}
