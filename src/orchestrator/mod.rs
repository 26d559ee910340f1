//! Ordered startup of the service topology with rollback on failure.

mod cleanup;
mod registry;

pub use cleanup::{clean_start, remove_stale, reset_data, CleanupSummary};
pub use registry::{StopRegistry, UnwindReport};

use crate::config::Config;
use crate::docker::{preview_id, ContainerRuntime};
use crate::error::{Error, Result};
use crate::healthcheck::{wait_ready, BackoffPolicy, ReadinessState};
use crate::migration::{MigrationEngine, MigrationSet};
use crate::network::NetworkManager;
use crate::services::{datastore, Secrets, Service, ServiceEnv};
use crate::status::StatusFlags;
use crate::supervisor::{ContainerHandle, ContainerSupervisor, ExitNotice};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything the bootstrap and shutdown paths share.
///
/// Only `status` is written from more than one task; the rest is owned by
/// the orchestrator's single control flow.
#[derive(Clone)]
pub struct OrchestratorContext {
    pub config: Arc<Config>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub status: StatusFlags,
    pub secrets: Arc<Secrets>,
    pub token: CancellationToken,
}

impl OrchestratorContext {
    pub fn new(
        config: Config,
        runtime: Arc<dyn ContainerRuntime>,
        secrets: Secrets,
        token: CancellationToken,
    ) -> Self {
        Self {
            config: Arc::new(config),
            runtime,
            status: StatusFlags::new(),
            secrets: Arc::new(secrets),
            token,
        }
    }
}

/// Sequences clean start, network setup and per-service startup.
pub struct Orchestrator {
    ctx: OrchestratorContext,
    networks: NetworkManager,
    supervisor: ContainerSupervisor,
    migrations: MigrationEngine,
    registry: StopRegistry,
    readiness: BTreeMap<&'static str, ReadinessState>,
    watchers: Vec<JoinHandle<()>>,
    network_id: Option<String>,
}

impl Orchestrator {
    pub fn new(ctx: OrchestratorContext, scripts: MigrationSet) -> Self {
        let supervisor = ContainerSupervisor::new(
            ctx.runtime.clone(),
            ctx.config.network.clone(),
            ctx.config.stop.clone(),
        );
        let target = datastore::psql_target(&ServiceEnv {
            config: &ctx.config,
            secrets: &ctx.secrets,
        });
        Self {
            networks: NetworkManager::new(ctx.runtime.clone()),
            migrations: MigrationEngine::new(supervisor.clone(), target, scripts),
            supervisor,
            registry: StopRegistry::new(),
            readiness: BTreeMap::new(),
            watchers: Vec::new(),
            network_id: None,
            ctx,
        }
    }

    pub fn context(&self) -> &OrchestratorContext {
        &self.ctx
    }

    pub fn registry(&self) -> &StopRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut StopRegistry {
        &mut self.registry
    }

    pub fn readiness(&self, service: Service) -> ReadinessState {
        self.readiness
            .get(service.label())
            .copied()
            .unwrap_or_default()
    }

    pub fn network_id(&self) -> Option<&str> {
        self.network_id.as_deref()
    }

    /// Bring the whole topology up, once.
    ///
    /// On failure everything already started is torn down before the error
    /// is returned.
    pub async fn bootstrap(&mut self) -> Result<()> {
        match self.bootstrap_inner().await {
            Ok(()) => {
                tracing::info!("All services started");
                Ok(())
            }
            Err(e) => {
                if e.is_cancelled() {
                    tracing::info!("Startup cancelled, rolling back");
                } else {
                    tracing::error!("Startup failed: {}", e);
                }
                self.unwind().await;
                Err(e)
            }
        }
    }

    async fn bootstrap_inner(&mut self) -> Result<()> {
        let token = self.ctx.token.clone();

        self.ctx
            .runtime
            .ping()
            .await
            .map_err(|e| Error::RuntimeUnavailable {
                service: "docker".to_string(),
                reason: e.to_string(),
            })?;

        let network_id = clean_start(
            self.ctx.runtime.as_ref(),
            &self.networks,
            &self.ctx.config,
            &token,
        )
        .await?;
        tracing::info!(
            "Network '{}' ready ({})",
            self.ctx.config.network,
            preview_id(&network_id)
        );
        self.network_id = Some(network_id);

        for service in Service::topology(&self.ctx.config) {
            self.start_service(service, &token).await?;
        }
        Ok(())
    }

    async fn start_service(&mut self, service: Service, token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            return Err(Error::Cancelled(service.label().to_string()));
        }

        let ctx = self.ctx.clone();
        let env = ServiceEnv {
            config: &ctx.config,
            secrets: &ctx.secrets,
        };

        service.prepare(&env)?;
        let descriptor = service.descriptor(&env);
        let (handle, notice) = self.supervisor.run(token, &descriptor).await?;

        // registered before anything else can fail
        self.registry.register_container(handle.clone());
        self.watch_exit(service, handle.clone(), notice);

        if let Some(check) =
            service.readiness_check(&env, ctx.runtime.clone(), handle.id())?
        {
            let policy = BackoffPolicy::from(&ctx.config.readiness);
            let state = self.readiness.entry(service.label()).or_default();
            wait_ready(token, handle.name(), check.as_ref(), policy, state).await?;
        }

        service
            .post_start(&env, &self.supervisor, &self.migrations, token, handle.id())
            .await?;

        if let Some(component) = service.status_component() {
            ctx.status.set(component, true);
        }
        tracing::info!(
            "Started {} ({})",
            service,
            preview_id(handle.id())
        );
        Ok(())
    }

    /// Flip the service's liveness flag once its container stops running.
    fn watch_exit(&mut self, service: Service, handle: Arc<ContainerHandle>, notice: ExitNotice) {
        let status = self.ctx.status.clone();
        let watcher = tokio::spawn(async move {
            let exit = notice.wait().await;
            if let Some(component) = service.status_component() {
                status.set(component, false);
            }
            match exit {
                Some(exit) if !handle.is_stopped() => {
                    tracing::warn!(
                        "{} container '{}' exited unexpectedly (code {:?}{})",
                        service,
                        exit.name,
                        exit.exit_code,
                        exit.error
                            .map(|e| format!(", {}", e))
                            .unwrap_or_default()
                    );
                }
                Some(exit) => {
                    tracing::debug!("'{}' exited with {:?}", exit.name, exit.exit_code);
                }
                None => {}
            }
        });
        self.watchers.push(watcher);
    }

    /// Unwind the stop registry and mark everything down.
    pub async fn unwind(&mut self) -> UnwindReport {
        let report = self.registry.unwind(self.ctx.config.stop.grace).await;
        for service in Service::topology(&self.ctx.config) {
            if let Some(component) = service.status_component() {
                self.ctx.status.set(component, false);
            }
        }
        report
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        for watcher in self.watchers.drain(..) {
            watcher.abort();
        }
    }
}
