use dockyard::docker::{ContainerRuntime, DockerClient};
use dockyard::orchestrator::remove_stale;
use dockyard::{Config, Error, NetworkManager};
use std::sync::Arc;

pub async fn run_clean(config: &Config) -> anyhow::Result<()> {
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerClient::new());
    runtime
        .ping()
        .await
        .map_err(|e| Error::RuntimeUnavailable {
            service: "docker".to_string(),
            reason: e.to_string(),
        })?;

    let networks = NetworkManager::new(runtime.clone());
    let summary = remove_stale(runtime.as_ref(), &networks, config).await?;

    if summary.containers_removed > 0 {
        println!(
            "Removed {} container(s) labelled '{}'",
            summary.containers_removed,
            config.project_label()
        );
    } else {
        println!("No leftover containers found");
    }
    println!("Network '{}' removed", config.network);
    Ok(())
}
