//! In-memory `ContainerRuntime` used by the integration tests.
//!
//! Containers and networks live in a map; `exec` understands just enough of
//! `pg_isready` and `psql` to simulate readiness and the migration ledger.
#![allow(dead_code)]

use async_trait::async_trait;
use dockyard::docker::{
    ContainerRuntime, ContainerSpec, ContainerSummary, ControlChannel, DockerError, ExecOutput,
    NetworkSpec, NetworkSummary, RuntimeResult,
};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// SQL containing this marker makes the simulated `psql` fail the whole batch.
pub const FAIL_MARKER: &str = "-- fake:fail";

pub struct FakeContainer {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    running: watch::Sender<bool>,
}

impl FakeContainer {
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }
}

#[derive(Default)]
pub struct FakeState {
    pub containers: BTreeMap<String, FakeContainer>,
    pub networks: Vec<NetworkSummary>,
    pub images: HashSet<String>,
    /// (version, name) in insertion order.
    pub ledger: Vec<(String, String)>,
}

#[derive(Default)]
pub struct Knobs {
    pub daemon_down: bool,
    /// Container names whose start fails.
    pub fail_start: HashSet<String>,
    /// Container names whose control attachment fails.
    pub fail_attach: HashSet<String>,
    /// `pg_isready` never reports accepting connections.
    pub datastore_never_ready: bool,
    /// Containers whose stop request never returns.
    pub hang_stop: HashSet<String>,
    /// Delay inside `create_network`, to widen race windows.
    pub network_create_delay: Option<Duration>,
    /// Delay inside `create_container`, after the container exists.
    pub container_create_delay: Option<Duration>,
}

#[derive(Default)]
pub struct FakeRuntime {
    pub state: Mutex<FakeState>,
    calls: Arc<Mutex<Vec<String>>>,
    pub knobs: Mutex<Knobs>,
    next_id: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{}{:0>60}", prefix, n)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls_starting_with(prefix).len()
    }

    pub fn ledger_versions(&self) -> Vec<String> {
        self.state
            .lock()
            .ledger
            .iter()
            .map(|(v, _)| v.clone())
            .collect()
    }

    pub fn running_names(&self) -> Vec<String> {
        self.state
            .lock()
            .containers
            .values()
            .filter(|c| c.is_running())
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state
            .lock()
            .containers
            .values()
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn name_of(&self, id: &str) -> String {
        self.state
            .lock()
            .containers
            .get(id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Add a container as if a previous run had left it behind.
    pub fn seed_container(&self, name: &str, labels: &[(&str, &str)]) -> String {
        let id = self.id("c");
        let (running, _) = watch::channel(true);
        self.state.lock().containers.insert(
            id.clone(),
            FakeContainer {
                name: name.to_string(),
                labels: labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                env: BTreeMap::new(),
                running,
            },
        );
        id
    }

    pub fn seed_network(&self, name: &str) -> String {
        let id = self.id("n");
        self.state.lock().networks.push(NetworkSummary {
            id: id.clone(),
            name: name.to_string(),
        });
        id
    }

    /// Simulate the container dying on its own.
    pub fn crash(&self, name: &str) {
        let state = self.state.lock();
        if let Some(c) = state.containers.values().find(|c| c.name == name) {
            c.running.send_replace(false);
        }
    }

    fn psql(&self, sql: &str) -> ExecOutput {
        if sql.contains("json_agg") {
            let rows: Vec<serde_json::Value> = self
                .state
                .lock()
                .ledger
                .iter()
                .map(|(v, n)| serde_json::json!({"version": v, "statements": null, "name": n}))
                .collect();
            return ExecOutput {
                output: serde_json::Value::Array(rows).to_string(),
                exit_code: 0,
            };
        }

        if sql.contains(FAIL_MARKER) {
            return ExecOutput {
                output: "ERROR:  simulated failure\n".to_string(),
                exit_code: 3,
            };
        }

        if sql.contains("INSERT INTO") {
            let re = Regex::new(r"VALUES \('((?:[^']|'')*)', '((?:[^']|'')*)'\)")
                .expect("valid regex");
            let mut state = self.state.lock();
            for caps in re.captures_iter(sql) {
                state
                    .ledger
                    .push((caps[1].replace("''", "'"), caps[2].replace("''", "'")));
            }
            return ExecOutput {
                output: "BEGIN\nINSERT 0 1\nCOMMIT\n".to_string(),
                exit_code: 0,
            };
        }

        ExecOutput {
            output: "ALTER ROLE\n".to_string(),
            exit_code: 0,
        }
    }
}

struct FakeControl {
    calls: Arc<Mutex<Vec<String>>>,
    name: String,
}

#[async_trait]
impl ControlChannel for FakeControl {
    async fn close(&mut self) -> RuntimeResult<()> {
        self.calls.lock().push(format!("detach {}", self.name));
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> RuntimeResult<()> {
        self.record("ping");
        if self.knobs.lock().daemon_down {
            return Err(DockerError::cmd_failed(
                "docker version",
                "Cannot connect to the Docker daemon",
                Some(1),
            ));
        }
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> RuntimeResult<bool> {
        Ok(self.state.lock().images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        self.record(format!("pull {}", image));
        self.state.lock().images.insert(image.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        self.record(format!("create {}", spec.name));
        let id = self.id("c");
        let (running, _) = watch::channel(false);
        self.state.lock().containers.insert(
            id.clone(),
            FakeContainer {
                name: spec.name.clone(),
                labels: spec.labels.clone(),
                env: spec.env.clone(),
                running,
            },
        );
        let delay = self.knobs.lock().container_create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> RuntimeResult<()> {
        let name = self.name_of(id);
        self.record(format!("start {}", name));
        if self.knobs.lock().fail_start.contains(&name) {
            return Err(DockerError::cmd_failed(
                format!("docker start {}", id),
                "port is already allocated",
                Some(125),
            ));
        }
        let state = self.state.lock();
        let container = state
            .containers
            .get(id)
            .ok_or_else(|| DockerError::ContainerNotFound {
                container: id.to_string(),
            })?;
        container.running.send_replace(true);
        Ok(())
    }

    async fn attach_control(&self, id: &str) -> RuntimeResult<Box<dyn ControlChannel>> {
        let name = self.name_of(id);
        self.record(format!("attach {}", name));
        if self.knobs.lock().fail_attach.contains(&name) {
            return Err(DockerError::cmd_failed(
                format!("docker attach {}", id),
                "container exited before attach",
                Some(1),
            ));
        }
        Ok(Box::new(FakeControl {
            calls: self.calls.clone(),
            name,
        }))
    }

    async fn wait_container(&self, id: &str) -> RuntimeResult<i64> {
        let rx = {
            let state = self.state.lock();
            match state.containers.get(id) {
                Some(c) => c.running.subscribe(),
                None => return Ok(0),
            }
        };
        let mut rx = rx;
        // a dropped sender means the container was removed
        let _ = rx.wait_for(|running| !*running).await;
        Ok(0)
    }

    async fn stop_container(&self, id: &str, _timeout: Duration) -> RuntimeResult<()> {
        let name = self.name_of(id);
        self.record(format!("stop {}", name));
        if self.knobs.lock().hang_stop.contains(&name) {
            std::future::pending::<()>().await;
        }
        let mut state = self.state.lock();
        match state.containers.remove(id) {
            // auto-remove
            Some(c) => {
                c.running.send_replace(false);
                Ok(())
            }
            None => Err(DockerError::ContainerNotFound {
                container: id.to_string(),
            }),
        }
    }

    async fn remove_container(&self, id: &str, _force: bool) -> RuntimeResult<()> {
        let name = self.name_of(id);
        self.record(format!("remove {}", name));
        let mut state = self.state.lock();
        match state.containers.remove(id) {
            Some(c) => {
                c.running.send_replace(false);
                Ok(())
            }
            None => Err(DockerError::ContainerNotFound {
                container: id.to_string(),
            }),
        }
    }

    async fn list_containers(&self, label: &str) -> RuntimeResult<Vec<ContainerSummary>> {
        self.record(format!("ps {}", label));
        let (key, value) = label.split_once('=').unwrap_or((label, ""));
        let state = self.state.lock();
        Ok(state
            .containers
            .iter()
            .filter(|(_, c)| c.labels.get(key).map(String::as_str) == Some(value))
            .map(|(id, c)| ContainerSummary {
                id: id.clone(),
                name: c.name.clone(),
                state: if c.is_running() { "running" } else { "exited" }.to_string(),
            })
            .collect())
    }

    async fn exec(&self, id: &str, argv: &[String]) -> RuntimeResult<ExecOutput> {
        let name = self.name_of(id);
        let program = argv.first().cloned().unwrap_or_default();
        self.record(format!("exec {} {}", name, program));
        {
            let state = self.state.lock();
            match state.containers.get(id) {
                Some(c) if c.is_running() => {}
                _ => {
                    return Err(DockerError::ContainerNotFound {
                        container: id.to_string(),
                    })
                }
            }
        }

        match program.as_str() {
            "pg_isready" => {
                if self.knobs.lock().datastore_never_ready {
                    Ok(ExecOutput {
                        output: "127.0.0.1:5432 - no response\n".to_string(),
                        exit_code: 2,
                    })
                } else {
                    Ok(ExecOutput {
                        output: "127.0.0.1:5432 - accepting connections\n".to_string(),
                        exit_code: 0,
                    })
                }
            }
            "psql" => Ok(self.psql(argv.last().map(String::as_str).unwrap_or(""))),
            other => Ok(ExecOutput {
                output: format!("{}: not found\n", other),
                exit_code: 127,
            }),
        }
    }

    async fn list_networks(&self, name: &str) -> RuntimeResult<Vec<NetworkSummary>> {
        self.record(format!("network.ls {}", name));
        Ok(self
            .state
            .lock()
            .networks
            .iter()
            .filter(|n| n.name == name)
            .cloned()
            .collect())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> RuntimeResult<String> {
        self.record(format!("network.create {}", spec.name));
        let delay = self.knobs.lock().network_create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        if state.networks.iter().any(|n| n.name == spec.name) {
            return Err(DockerError::cmd_failed(
                "docker network create",
                format!("network with name {} already exists", spec.name),
                Some(1),
            ));
        }
        let id = self.id("n");
        state.networks.push(NetworkSummary {
            id: id.clone(),
            name: spec.name.clone(),
        });
        Ok(id)
    }

    async fn inspect_network(&self, name: &str) -> RuntimeResult<Option<String>> {
        Ok(self
            .state
            .lock()
            .networks
            .iter()
            .find(|n| n.name == name)
            .map(|n| n.id.clone()))
    }

    async fn remove_network(&self, id_or_name: &str) -> RuntimeResult<()> {
        self.record(format!("network.rm {}", id_or_name));
        self.state
            .lock()
            .networks
            .retain(|n| n.id != id_or_name && n.name != id_or_name);
        Ok(())
    }
}

/// Config pointing at `data_dir` with short backoffs and no settle delay.
pub fn test_config(data_dir: &std::path::Path) -> dockyard::Config {
    let mut config = dockyard::Config {
        data_dir: Some(data_dir.to_path_buf()),
        ..dockyard::Config::default()
    };
    config.readiness.max_attempts = 3;
    config.readiness.initial_backoff = Duration::from_millis(10);
    config.readiness.max_backoff = Duration::from_millis(40);
    config.readiness.probe_timeout = Duration::from_millis(500);
    config.stop.settle = Duration::ZERO;
    config.stop.grace = Duration::from_secs(2);
    config
}

/// Serve `GET <path>` with `status` on an ephemeral loopback port, standing in
/// for the REST layer's admin endpoint. Returns the port.
pub async fn stub_admin_endpoint(path: &'static str, status: u16) -> u16 {
    use axum::http::StatusCode;
    use axum::routing::get;

    let code = StatusCode::from_u16(status).expect("valid status");
    let app = axum::Router::new().route(path, get(move || async move { code }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub endpoint");
    let port = listener.local_addr().expect("local addr").port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    port
}
