use crate::config::PROJECT_LABEL_KEY;
use crate::docker::{ContainerSpec, Mount, PortBinding};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Immutable description of one service container.
///
/// Built once per run from static defaults plus generated secrets. Env values
/// may hold secrets, so `Debug` prints only the keys.
#[derive(Clone, Default)]
pub struct ServiceDescriptor {
    pub image: String,
    pub name: String,
    /// DNS alias on the managed network.
    pub alias: String,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
    /// Container ports, each published on the same loopback host port.
    pub ports: Vec<u16>,
    pub labels: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    pub fn new(image: impl Into<String>, name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: name.into(),
            alias: alias.into(),
            ..Default::default()
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn command<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.ports.push(port);
        self
    }

    /// Stamp the project label used by clean start to find stale containers.
    pub fn project(mut self, project: &str) -> Self {
        self.labels
            .insert(PROJECT_LABEL_KEY.to_string(), project.to_string());
        self
    }

    /// Reject descriptors missing a required field.
    pub fn validate(&self) -> Result<()> {
        let missing = |field: &str| {
            Error::Config(format!(
                "service descriptor '{}' is missing required field '{}'",
                if self.name.is_empty() {
                    "<unnamed>"
                } else {
                    self.name.as_str()
                },
                field
            ))
        };
        if self.image.trim().is_empty() {
            return Err(missing("image"));
        }
        if self.name.trim().is_empty() {
            return Err(missing("name"));
        }
        if self.alias.trim().is_empty() {
            return Err(missing("alias"));
        }
        if self.ports.contains(&0) {
            return Err(Error::Config(format!(
                "service descriptor '{}' exposes port 0",
                self.name
            )));
        }
        for mount in &self.mounts {
            if mount.source.is_empty() || mount.target.is_empty() {
                return Err(missing("mount source/target"));
            }
        }
        Ok(())
    }

    /// Translate into a runtime create request attached to `network`.
    ///
    /// Ports become loopback-only bindings; the container keeps stdin open for
    /// the control channel and is auto-removed once stopped.
    pub fn to_spec(&self, network: &str) -> ContainerSpec {
        ContainerSpec {
            name: self.name.clone(),
            image: self.image.clone(),
            command: self.command.clone(),
            env: self.env.clone(),
            labels: self.labels.clone(),
            mounts: self.mounts.clone(),
            port_bindings: self.ports.iter().copied().map(PortBinding::loopback).collect(),
            network: network.to_string(),
            aliases: vec![self.alias.clone()],
            open_stdin: true,
            auto_remove: true,
        }
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("image", &self.image)
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("command", &self.command)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("mounts", &self.mounts)
            .field("ports", &self.ports)
            .field("labels", &self.labels)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ServiceDescriptor {
        ServiceDescriptor::new("postgrest/postgrest:v12.2.12", "dockyard-rest", "rest")
            .env("PGRST_JWT_SECRET", "s3cr3t-value")
            .port(3000)
            .port(3001)
            .project("dockyard")
    }

    #[test]
    fn test_to_spec_binds_loopback_and_alias() {
        let spec = sample().to_spec("dockyard-net");
        assert_eq!(spec.network, "dockyard-net");
        assert_eq!(spec.aliases, vec!["rest".to_string()]);
        assert!(spec.open_stdin && spec.auto_remove);
        assert_eq!(spec.port_bindings.len(), 2);
        assert!(spec.port_bindings.iter().all(|b| b.host_ip == "127.0.0.1"));
        assert_eq!(
            spec.labels.get(PROJECT_LABEL_KEY).map(String::as_str),
            Some("dockyard")
        );
    }

    #[test]
    fn test_debug_hides_env_values() {
        let rendered = format!("{:?}", sample());
        assert!(rendered.contains("PGRST_JWT_SECRET"));
        assert!(!rendered.contains("s3cr3t-value"));
    }

    #[test]
    fn test_missing_image_is_config_error() {
        let desc = ServiceDescriptor::new("", "dockyard-db", "db");
        match desc.validate() {
            Err(Error::Config(msg)) => assert!(msg.contains("image")),
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_port_zero_rejected() {
        let desc = ServiceDescriptor::new("img", "c", "a").port(0);
        assert!(desc.validate().is_err());
    }
}
