//! Docker CLI implementation of [`ContainerRuntime`].
//!
//! All Docker CLI interactions go through `DockerClient`, which provides
//! consistent timeout handling, error mapping to [`DockerError`], and a single
//! point where `Command::new("docker")` is constructed.

use super::{
    ContainerRuntime, ContainerSpec, ContainerSummary, ControlChannel, DockerError, ExecOutput,
    NetworkSpec, NetworkSummary, RuntimeResult,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const PULL_TIMEOUT: Duration = Duration::from_secs(300);
const EXEC_TIMEOUT: Duration = Duration::from_secs(120);
/// How long an attach must survive before it counts as established.
const ATTACH_SETTLE: Duration = Duration::from_millis(150);
const ATTACH_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Client for the `docker` command-line tool.
///
/// Every subprocess is spawned with `kill_on_drop`, so dropping an in-flight
/// call (for example when the root cancellation token fires inside a
/// `select!`) also terminates the CLI process.
#[derive(Debug, Clone)]
pub struct DockerClient {
    binary: String,
}

impl DockerClient {
    pub fn new() -> Self {
        DockerClient {
            binary: "docker".to_string(),
        }
    }

    /// Use a different CLI binary (e.g. `podman`, which accepts the same flags).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        DockerClient {
            binary: binary.into(),
        }
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    /// Run a docker command with a timeout, returning raw Output.
    async fn run(&self, args: &[&str], timeout: Duration) -> RuntimeResult<Output> {
        self.run_with_env(args, &BTreeMap::new(), timeout).await
    }

    /// Run with extra environment on the CLI process itself.
    ///
    /// Paired with bare `-e KEY` flags this keeps secret values off the argv.
    async fn run_with_env(
        &self,
        args: &[&str],
        env: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> RuntimeResult<Output> {
        let mut cmd = self.command(args);
        cmd.envs(env);
        let result = tokio::time::timeout(timeout, cmd.output()).await;

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(DockerError::exec_failed(self.describe(args), e)),
            Err(_) => Err(DockerError::timeout(self.describe(args), timeout)),
        }
    }

    /// Run a docker command with a timeout, returning Output only if exit 0.
    async fn run_success(&self, args: &[&str], timeout: Duration) -> RuntimeResult<Output> {
        let output = self.run(args, timeout).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(DockerError::failed(self.describe(args), &output))
        }
    }

    fn stdout_trimmed(output: &Output) -> String {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Build `docker create` arguments. Secret-bearing env values stay out of
    /// the argv: only `-e KEY` is emitted and the value travels in the CLI's
    /// own environment.
    fn create_args(spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec!["create".to_string(), "--name".to_string(), spec.name.clone()];

        if spec.open_stdin {
            // With stdin attached the CLI also sets StdinOnce, so closing the
            // attach session delivers EOF to the container.
            args.push("--interactive".to_string());
            args.push("--attach".to_string());
            args.push("stdin".to_string());
        }
        if spec.auto_remove {
            args.push("--rm".to_string());
        }
        args.push("--restart".to_string());
        args.push("no".to_string());

        if !spec.network.is_empty() {
            args.push("--network".to_string());
            args.push(spec.network.clone());
            for alias in &spec.aliases {
                args.push("--network-alias".to_string());
                args.push(alias.clone());
            }
        }

        for (key, value) in &spec.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }

        for key in spec.env.keys() {
            args.push("-e".to_string());
            args.push(key.clone());
        }

        for binding in &spec.port_bindings {
            args.push("--expose".to_string());
            args.push(binding.exposed_port());
            args.push("-p".to_string());
            args.push(binding.to_publish_arg());
        }

        for mount in &spec.mounts {
            args.push("--mount".to_string());
            args.push(mount.to_mount_arg());
        }

        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }
}

impl Default for DockerClient {
    fn default() -> Self {
        Self::new()
    }
}

/// A `docker attach` child whose stdin is the container's stdin.
struct AttachedStdin {
    child: Child,
}

#[async_trait]
impl ControlChannel for AttachedStdin {
    async fn close(&mut self) -> RuntimeResult<()> {
        // Dropping the pipe is the EOF.
        drop(self.child.stdin.take());

        match tokio::time::timeout(ATTACH_CLOSE_TIMEOUT, self.child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DockerError::exec_failed("docker attach", e)),
            Err(_) => {
                tracing::debug!("attach did not exit after stdin close, killing it");
                self.child
                    .kill()
                    .await
                    .map_err(|e| DockerError::exec_failed("docker attach", e))
            }
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn ping(&self) -> RuntimeResult<()> {
        self.run_success(
            &["info", "--format", "{{.ServerVersion}}"],
            Duration::from_secs(5),
        )
        .await
        .map(|_| ())
    }

    async fn image_exists(&self, image: &str) -> RuntimeResult<bool> {
        match self
            .run(&["image", "inspect", image], Duration::from_secs(10))
            .await
        {
            Ok(o) => Ok(o.status.success()),
            Err(DockerError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let output = self.run(&["pull", "--quiet", image], PULL_TIMEOUT).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        // "up to date" or "already exists" aren't real failures
        if stderr.contains("up to date") || stderr.contains("already exists") {
            return Ok(());
        }
        Err(DockerError::failed(self.describe(&["pull", image]), &output))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        let args = Self::create_args(spec);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self
            .run_with_env(&arg_refs, &spec.env, DEFAULT_TIMEOUT)
            .await?;
        if !output.status.success() {
            return Err(DockerError::failed(
                format!("{} create {}", self.binary, spec.name),
                &output,
            ));
        }
        let id = Self::stdout_trimmed(&output);
        if id.is_empty() {
            return Err(DockerError::unexpected("docker create", "empty container id"));
        }
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> RuntimeResult<()> {
        self.run_success(&["start", id], DEFAULT_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn attach_control(&self, id: &str) -> RuntimeResult<Box<dyn ControlChannel>> {
        let args = ["attach", "--sig-proxy=false", id];
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DockerError::exec_failed(self.describe(&args), e))?;

        // An attach that cannot connect exits almost immediately.
        tokio::time::sleep(ATTACH_SETTLE).await;
        match child.try_wait() {
            Ok(None) => Ok(Box::new(AttachedStdin { child })),
            Ok(Some(status)) => Err(DockerError::cmd_failed(
                self.describe(&args),
                "attach exited before the container stopped",
                status.code(),
            )),
            Err(e) => Err(DockerError::exec_failed(self.describe(&args), e)),
        }
    }

    async fn wait_container(&self, id: &str) -> RuntimeResult<i64> {
        let args = ["wait", id];
        let output = self
            .command(&args)
            .output()
            .await
            .map_err(|e| DockerError::exec_failed(self.describe(&args), e))?;
        if !output.status.success() {
            return Err(DockerError::failed(self.describe(&args), &output));
        }
        let text = Self::stdout_trimmed(&output);
        text.parse::<i64>()
            .map_err(|_| DockerError::unexpected(self.describe(&args), text))
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> RuntimeResult<()> {
        let secs = timeout.as_secs().max(1).to_string();
        let args = ["stop", "--time", secs.as_str(), id];
        let output = self.run(&args, timeout + DEFAULT_TIMEOUT).await?;
        if output.status.success() {
            return Ok(());
        }
        let err = DockerError::failed(self.describe(&args), &output);
        if err.is_gone() {
            return Ok(());
        }
        Err(err)
    }

    async fn remove_container(&self, id: &str, force: bool) -> RuntimeResult<()> {
        let args: Vec<&str> = if force {
            vec!["rm", "--force", id]
        } else {
            vec!["rm", id]
        };
        let output = self.run(&args, DEFAULT_TIMEOUT).await?;
        if output.status.success() {
            return Ok(());
        }
        let err = DockerError::failed(self.describe(&args), &output);
        if err.is_gone() {
            return Ok(());
        }
        Err(err)
    }

    async fn list_containers(&self, label: &str) -> RuntimeResult<Vec<ContainerSummary>> {
        let filter = format!("label={}", label);
        let output = self
            .run_success(
                &[
                    "ps",
                    "--all",
                    "--no-trunc",
                    "--filter",
                    &filter,
                    "--format",
                    "{{.ID}}\t{{.State}}\t{{.Names}}",
                ],
                DEFAULT_TIMEOUT,
            )
            .await?;

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| {
                let mut parts = line.trim().splitn(3, '\t');
                let id = parts.next()?.to_string();
                let state = parts.next().unwrap_or_default().to_string();
                let name = parts.next().unwrap_or_default().to_string();
                (!id.is_empty()).then_some(ContainerSummary { id, name, state })
            })
            .collect())
    }

    async fn exec(&self, id: &str, argv: &[String]) -> RuntimeResult<ExecOutput> {
        let mut args: Vec<&str> = vec!["exec", id];
        args.extend(argv.iter().map(String::as_str));
        let output = self.run(&args, EXEC_TIMEOUT).await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() && stderr.contains("No such container") {
            return Err(DockerError::ContainerNotFound {
                container: id.to_string(),
            });
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&stderr);
        Ok(ExecOutput {
            output: combined,
            exit_code: output.status.code().map(i64::from).unwrap_or(-1),
        })
    }

    async fn list_networks(&self, name: &str) -> RuntimeResult<Vec<NetworkSummary>> {
        // The name filter is a substring match; exactness is enforced below.
        let filter = format!("name={}", name);
        let output = self
            .run_success(
                &[
                    "network",
                    "ls",
                    "--no-trunc",
                    "--filter",
                    &filter,
                    "--format",
                    "{{.ID}}\t{{.Name}}",
                ],
                DEFAULT_TIMEOUT,
            )
            .await?;

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| {
                let (id, net_name) = line.trim().split_once('\t')?;
                (net_name == name).then(|| NetworkSummary {
                    id: id.to_string(),
                    name: net_name.to_string(),
                })
            })
            .collect())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> RuntimeResult<String> {
        let mut args: Vec<String> = vec![
            "network".into(),
            "create".into(),
            "--driver".into(),
            spec.driver.clone(),
            "--scope".into(),
            spec.scope.clone(),
            format!("--ipv6={}", spec.ipv6),
        ];
        if spec.attachable {
            args.push("--attachable".into());
        }
        for (key, value) in &spec.labels {
            args.push("--label".into());
            args.push(format!("{}={}", key, value));
        }
        args.push(spec.name.clone());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_success(&arg_refs, DEFAULT_TIMEOUT).await?;
        Ok(Self::stdout_trimmed(&output))
    }

    async fn inspect_network(&self, name: &str) -> RuntimeResult<Option<String>> {
        let output = self
            .run(
                &["network", "inspect", "--format", "{{.Id}}", name],
                DEFAULT_TIMEOUT,
            )
            .await?;
        if output.status.success() {
            let id = Self::stdout_trimmed(&output);
            return Ok((!id.is_empty()).then_some(id));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not found") || stderr.contains("No such network") {
            return Ok(None);
        }
        Err(DockerError::failed("docker network inspect", &output))
    }

    async fn remove_network(&self, name: &str) -> RuntimeResult<()> {
        let output = self.run(&["network", "rm", name], DEFAULT_TIMEOUT).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not found") || stderr.contains("No such network") {
            return Ok(());
        }
        Err(DockerError::failed("docker network rm", &output))
    }
}
