use crate::config::Config;
use crate::docker::{preview_id, ContainerRuntime};
use crate::error::{Error, Result};
use crate::network::NetworkManager;
use std::io;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// What a stale-state sweep removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupSummary {
    pub containers_removed: usize,
}

/// Force-remove every container carrying the project label and drop the
/// managed network. Safe on an already clean host.
pub async fn remove_stale(
    runtime: &dyn ContainerRuntime,
    networks: &NetworkManager,
    config: &Config,
) -> Result<CleanupSummary> {
    let mut summary = CleanupSummary::default();

    let stale = runtime.list_containers(&config.project_label()).await?;
    for container in stale {
        tracing::info!(
            "Removing stale container '{}' ({}, {})",
            container.name,
            preview_id(&container.id),
            container.state
        );
        match runtime.remove_container(&container.id, true).await {
            Ok(()) => summary.containers_removed += 1,
            Err(e) if e.is_gone() => {}
            Err(e) => return Err(e.into()),
        }
    }

    networks.remove(&config.network).await?;
    Ok(summary)
}

/// Clear stale state, then create the managed network afresh. Returns its id.
pub async fn clean_start(
    runtime: &dyn ContainerRuntime,
    networks: &NetworkManager,
    config: &Config,
    token: &CancellationToken,
) -> Result<String> {
    if token.is_cancelled() {
        return Err(Error::Cancelled("clean start".to_string()));
    }
    let summary = remove_stale(runtime, networks, config).await?;
    if summary.containers_removed > 0 {
        tracing::info!(
            "Removed {} stale container(s)",
            summary.containers_removed
        );
    }

    if token.is_cancelled() {
        return Err(Error::Cancelled("clean start".to_string()));
    }
    networks.ensure(&config.network).await
}

/// Directories under the data dir that a reset wipes: the datastore's
/// persisted cluster, its init scripts and the rendered gateway config.
const RESET_DIRS: [&str; 3] = ["db", "init", "gateway"];

/// Delete all persisted datastore state so the next `serve` initializes a
/// fresh cluster. Returns the directories that existed and were removed.
pub fn reset_data(config: &Config) -> Result<Vec<PathBuf>> {
    let root = config.data_dir();
    let mut removed = Vec::new();
    for dir in RESET_DIRS {
        let path = root.join(dir);
        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                tracing::info!("Removed {}", path.display());
                removed.push(path);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Io(io::Error::new(
                    e.kind(),
                    format!("failed to remove {}: {}", path.display(), e),
                )))
            }
        }
    }
    Ok(removed)
}
