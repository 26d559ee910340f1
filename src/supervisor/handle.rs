use crate::docker::{preview_id, ContainerRuntime, ControlChannel, RuntimeResult};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

/// How a supervised container left the running state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerExit {
    pub name: String,
    /// `None` when the wait itself failed.
    pub exit_code: Option<i64>,
    pub error: Option<String>,
}

/// Fires once, when the container stops running (expectedly or not).
#[derive(Debug)]
pub struct ExitNotice {
    rx: oneshot::Receiver<ContainerExit>,
}

impl ExitNotice {
    pub(crate) fn channel() -> (oneshot::Sender<ContainerExit>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Resolve when the container exits. `None` if the monitor was torn down
    /// without observing an exit.
    pub async fn wait(self) -> Option<ContainerExit> {
        self.rx.await.ok()
    }
}

/// A started container and its idempotent stop operation.
pub struct ContainerHandle {
    id: String,
    name: String,
    runtime: Arc<dyn ContainerRuntime>,
    control: Mutex<Option<Box<dyn ControlChannel>>>,
    monitor: parking_lot::Mutex<Option<JoinHandle<()>>>,
    stop_timeout: Duration,
    settle: Duration,
    stopped: AtomicBool,
}

impl ContainerHandle {
    pub(crate) fn new(
        id: String,
        name: String,
        runtime: Arc<dyn ContainerRuntime>,
        control: Box<dyn ControlChannel>,
        stop_timeout: Duration,
        settle: Duration,
    ) -> Self {
        Self {
            id,
            name,
            runtime,
            control: Mutex::new(Some(control)),
            monitor: parking_lot::Mutex::new(None),
            stop_timeout,
            settle,
            stopped: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_monitor(&self, task: JoinHandle<()>) {
        *self.monitor.lock() = Some(task);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Close the control channel, ask the runtime to stop the container, then
    /// give auto-removal a moment.
    ///
    /// Every step is attempted even if an earlier one failed; the first
    /// failure is returned. Only the first call does any work.
    pub async fn stop(&self) -> Result<()> {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Container '{}' already stopped", self.name);
            return Ok(());
        }

        tracing::debug!("Stopping container '{}' ({})", self.name, preview_id(&self.id));
        let mut first_error: Option<String> = None;

        if let Err(e) = self.close_control().await {
            tracing::debug!("Closing control channel of '{}' failed: {}", self.name, e);
            first_error.get_or_insert_with(|| format!("close control channel: {}", e));
        }

        if let Err(e) = self
            .runtime
            .stop_container(&self.id, self.stop_timeout)
            .await
        {
            if !e.is_gone() {
                tracing::warn!("Stop request for '{}' failed: {}", self.name, e);
                first_error.get_or_insert_with(|| format!("stop request: {}", e));
            }
        }

        tokio::time::sleep(self.settle).await;

        match first_error {
            None => Ok(()),
            Some(reason) => Err(Error::Teardown {
                label: self.name.clone(),
                reason,
            }),
        }
    }

    /// Send EOF on the container's stdin without asking the runtime to stop
    /// it. A no-op once the channel is closed.
    pub async fn close_control(&self) -> RuntimeResult<()> {
        match self.control.lock().await.take() {
            Some(mut control) => control.close().await,
            None => Ok(()),
        }
    }

    /// Force-remove the container. Used when [`stop`](Self::stop) overran its grace.
    pub async fn kill(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(task) = self.monitor.lock().take() {
            task.abort();
        }
        tracing::warn!("Force removing container '{}' ({})", self.name, preview_id(&self.id));
        self.runtime
            .remove_container(&self.id, true)
            .await
            .map_err(|e| Error::Teardown {
                label: self.name.clone(),
                reason: e.to_string(),
            })
    }
}

impl std::fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("id", &preview_id(&self.id))
            .field("name", &self.name)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
