//! The fixed service topology: datastore, REST layer, optional gateway.
//!
//! Each variant supplies its descriptor, an optional readiness check and an
//! optional post-start hook; the orchestrator sequences them uniformly.

pub mod datastore;
pub mod files;
pub mod gateway;
pub mod rest;
pub mod secrets;

pub use secrets::{generate_secret, Secrets};

use crate::config::Config;
use crate::docker::ContainerRuntime;
use crate::error::Result;
use crate::healthcheck::ReadinessCheck;
use crate::migration::MigrationEngine;
use crate::status::Component;
use crate::supervisor::{ContainerSupervisor, ServiceDescriptor};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Inputs every service derives its container from.
#[derive(Debug, Clone, Copy)]
pub struct ServiceEnv<'a> {
    pub config: &'a Config,
    pub secrets: &'a Secrets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Datastore,
    RestLayer,
    Gateway,
}

impl Service {
    /// Services to start, in dependency order.
    pub fn topology(config: &Config) -> Vec<Service> {
        let mut services = vec![Service::Datastore, Service::RestLayer];
        if config.gateway.enabled {
            services.push(Service::Gateway);
        }
        services
    }

    pub fn label(&self) -> &'static str {
        match self {
            Service::Datastore => "datastore",
            Service::RestLayer => "rest",
            Service::Gateway => "gateway",
        }
    }

    /// Liveness flag this service drives, if any.
    pub fn status_component(&self) -> Option<Component> {
        match self {
            Service::Datastore => Some(Component::Datastore),
            Service::RestLayer => Some(Component::Rest),
            Service::Gateway => None,
        }
    }

    /// Write host-side files the container mounts.
    pub fn prepare(&self, env: &ServiceEnv<'_>) -> Result<()> {
        match self {
            Service::Datastore => datastore::prepare(env),
            Service::RestLayer => Ok(()),
            Service::Gateway => gateway::prepare(env),
        }
    }

    pub fn descriptor(&self, env: &ServiceEnv<'_>) -> ServiceDescriptor {
        match self {
            Service::Datastore => datastore::descriptor(env),
            Service::RestLayer => rest::descriptor(env),
            Service::Gateway => gateway::descriptor(env),
        }
    }

    /// Check gating the next service. `None` means start is enough.
    pub fn readiness_check(
        &self,
        env: &ServiceEnv<'_>,
        runtime: Arc<dyn ContainerRuntime>,
        container_id: &str,
    ) -> Result<Option<Box<dyn ReadinessCheck>>> {
        Ok(match self {
            Service::Datastore => Some(datastore::readiness_check(env, runtime, container_id)),
            Service::RestLayer => Some(rest::readiness_check(env)?),
            Service::Gateway => None,
        })
    }

    /// Work done once the service is ready and before it counts as alive.
    pub async fn post_start(
        &self,
        env: &ServiceEnv<'_>,
        supervisor: &ContainerSupervisor,
        migrations: &MigrationEngine,
        token: &CancellationToken,
        container_id: &str,
    ) -> Result<()> {
        match self {
            Service::Datastore => {
                datastore::post_start(env, supervisor, migrations, token, container_id).await
            }
            Service::RestLayer | Service::Gateway => Ok(()),
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
