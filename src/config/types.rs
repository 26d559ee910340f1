//! Core configuration types.
//!
//! Every section carries `#[serde(default)]`, so an empty file (or no file at
//! all) describes the standard three-service topology.

use super::duration::human;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Label key stamped on every managed container.
pub const PROJECT_LABEL_KEY: &str = "com.docker.compose.project";

/// Root configuration structure for dockyard.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Value of the project label used for bulk cleanup.
    pub project: String,

    /// Name of the managed bridge network.
    pub network: String,

    /// Where the datastore keeps its data and init scripts.
    /// Defaults to `<local data dir>/dockyard`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    pub server: ServerConfig,
    pub datastore: DatastoreConfig,
    pub rest: RestConfig,
    pub gateway: GatewayConfig,
    pub readiness: ReadinessConfig,
    pub stop: StopConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: "dockyard".to_string(),
            network: "dockyard-net".to_string(),
            data_dir: None,
            server: ServerConfig::default(),
            datastore: DatastoreConfig::default(),
            rest: RestConfig::default(),
            gateway: GatewayConfig::default(),
            readiness: ReadinessConfig::default(),
            stop: StopConfig::default(),
        }
    }
}

impl Config {
    /// `key=value` filter matching every container this project owns.
    pub fn project_label(&self) -> String {
        format!("{}={}", PROJECT_LABEL_KEY, self.project)
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("dockyard")
        })
    }
}

/// Edge HTTP server (status surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// How long in-flight requests get during shutdown.
    #[serde(with = "human")]
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    pub image: String,
    pub container_name: String,
    pub alias: String,
    pub port: u16,
    /// Superuser the migration and credential execs connect as.
    pub admin_user: String,
    pub database: String,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            image: "supabase/postgres:17.4.1.055".to_string(),
            container_name: "dockyard-db".to_string(),
            alias: "db".to_string(),
            port: 5432,
            admin_user: "supabase_admin".to_string(),
            database: "postgres".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    pub image: String,
    pub container_name: String,
    pub alias: String,
    pub api_port: u16,
    pub admin_port: u16,
    /// Path on the admin port that answers 2xx once the schema cache is loaded.
    pub ready_path: String,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            image: "postgrest/postgrest:v12.2.12".to_string(),
            container_name: "dockyard-rest".to_string(),
            alias: "rest".to_string(),
            api_port: 3000,
            admin_port: 3001,
            ready_path: "/ready".to_string(),
        }
    }
}

impl RestConfig {
    pub fn ready_url(&self) -> String {
        format!(
            "http://{}:{}{}",
            crate::docker::LOOPBACK,
            self.admin_port,
            self.ready_path
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub enabled: bool,
    pub image: String,
    pub container_name: String,
    pub alias: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            image: "kong:2.8.1".to_string(),
            container_name: "dockyard-gateway".to_string(),
            alias: "kong".to_string(),
            port: 8000,
        }
    }
}

/// Bounded exponential backoff for readiness probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub max_attempts: u32,
    #[serde(with = "human")]
    pub initial_backoff: Duration,
    #[serde(with = "human")]
    pub max_backoff: Duration,
    /// Per-probe timeout (HTTP request or exec).
    #[serde(with = "human")]
    pub probe_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    /// Passed to the runtime's stop request before it kills the container.
    #[serde(with = "human")]
    pub timeout: Duration,
    /// Pause after stop so auto-removal can finish.
    #[serde(with = "human")]
    pub settle: Duration,
    /// Upper bound for one registry entry's stop before it is force-removed.
    #[serde(with = "human")]
    pub grace: Duration,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            settle: Duration::from_millis(200),
            grace: Duration::from_secs(10),
        }
    }
}
