//! Plain data exchanged with the container runtime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Loopback address every published port is bound to.
pub const LOOPBACK: &str = "127.0.0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Bind,
    Volume,
}

/// A bind or named-volume mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub kind: MountKind,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

impl Mount {
    pub fn bind(source: impl Into<String>, target: impl Into<String>, read_only: bool) -> Self {
        Self {
            kind: MountKind::Bind,
            source: source.into(),
            target: target.into(),
            read_only,
        }
    }

    pub fn volume(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: MountKind::Volume,
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    /// Render as a `--mount` value, e.g. `type=bind,source=/a,target=/b,readonly`.
    pub fn to_mount_arg(&self) -> String {
        let kind = match self.kind {
            MountKind::Bind => "bind",
            MountKind::Volume => "volume",
        };
        let mut arg = format!("type={},source={},target={}", kind, self.source, self.target);
        if self.read_only {
            arg.push_str(",readonly");
        }
        arg
    }
}

/// Exposed container port paired with its host binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub container_port: u16,
    pub host_ip: String,
    pub host_port: u16,
}

impl PortBinding {
    /// Container port `port/tcp` published on the same host port, loopback only.
    pub fn loopback(port: u16) -> Self {
        Self {
            container_port: port,
            host_ip: LOOPBACK.to_string(),
            host_port: port,
        }
    }

    pub fn exposed_port(&self) -> String {
        format!("{}/tcp", self.container_port)
    }

    /// Render as a `-p` value, e.g. `127.0.0.1:5432:5432/tcp`.
    pub fn to_publish_arg(&self) -> String {
        format!("{}:{}:{}", self.host_ip, self.host_port, self.exposed_port())
    }
}

/// Everything the runtime needs to create one container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
    pub port_bindings: Vec<PortBinding>,
    pub network: String,
    pub aliases: Vec<String>,
    /// Keep a stdin pipe open so a detached attach can signal EOF.
    pub open_stdin: bool,
    /// Remove the container once it stops.
    pub auto_remove: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub state: String,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    pub scope: String,
    pub attachable: bool,
    pub ipv6: bool,
    pub labels: BTreeMap<String, String>,
}

impl NetworkSpec {
    /// Bridge-mode, locally scoped, IPv4-only, attachable.
    pub fn local_bridge(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: "bridge".to_string(),
            scope: "local".to_string(),
            attachable: true,
            ipv6: false,
            labels: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
}

/// Combined stdout+stderr of a one-shot command plus its exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub output: String,
    pub exit_code: i64,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Output on one line, suitable for a log field.
    pub fn one_line(&self) -> String {
        self.output.trim().replace('\n', "\\n")
    }
}
