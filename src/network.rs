//! Lookup-or-create of the single managed network.

use crate::docker::{preview_id, ContainerRuntime, NetworkSpec};
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Ensures the isolated bridge network every service attaches to exists.
///
/// Calls to [`NetworkManager::ensure`] are serialized, so two concurrent
/// callers for the same name never both attempt creation; the second one
/// observes the network the first created.
pub struct NetworkManager {
    runtime: Arc<dyn ContainerRuntime>,
    guard: Mutex<()>,
}

impl NetworkManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            guard: Mutex::new(()),
        }
    }

    /// Return the id of the network called `name`, creating it if absent.
    ///
    /// More than one network with this exact name is a [`Error::Conflict`];
    /// it is never resolved automatically.
    pub async fn ensure(&self, name: &str) -> Result<String> {
        let _serialized = self.guard.lock().await;

        let matches = self.runtime.list_networks(name).await?;
        match matches.as_slice() {
            [only] => {
                tracing::debug!("Network '{}' exists ({})", name, preview_id(&only.id));
                return Ok(only.id.clone());
            }
            [] => {}
            many => {
                let ids: Vec<String> = many.iter().map(|n| preview_id(&n.id)).collect();
                return Err(Error::Conflict(format!(
                    "{} networks named '{}' exist: {}",
                    many.len(),
                    name,
                    ids.join(", ")
                )));
            }
        }

        match self.runtime.create_network(&NetworkSpec::local_bridge(name)).await {
            Ok(id) => {
                tracing::info!("Created network '{}' ({})", name, preview_id(&id));
                Ok(id)
            }
            Err(create_err) => {
                // Another process may have won the race.
                match self.runtime.inspect_network(name).await {
                    Ok(Some(id)) => {
                        tracing::debug!(
                            "Network '{}' appeared concurrently ({})",
                            name,
                            preview_id(&id)
                        );
                        Ok(id)
                    }
                    _ => Err(create_err.into()),
                }
            }
        }
    }

    /// Remove the network if present. Missing networks are not an error.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let _serialized = self.guard.lock().await;
        for network in self.runtime.list_networks(name).await? {
            tracing::debug!("Removing network '{}' ({})", name, preview_id(&network.id));
            self.runtime.remove_network(&network.id).await?;
        }
        Ok(())
    }
}
