use super::Config;
use crate::error::{Error, Result};
use std::collections::HashSet;

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            return Err(Error::Config("'project' must not be empty".to_string()));
        }
        if self.network.trim().is_empty() {
            return Err(Error::Config("'network' must not be empty".to_string()));
        }
        if self.server.port == 0 {
            return Err(Error::Config("'server.port' must be non-zero".to_string()));
        }

        let mut services = vec![
            (
                "datastore",
                &self.datastore.image,
                &self.datastore.container_name,
                &self.datastore.alias,
            ),
            (
                "rest",
                &self.rest.image,
                &self.rest.container_name,
                &self.rest.alias,
            ),
        ];
        if self.gateway.enabled {
            services.push((
                "gateway",
                &self.gateway.image,
                &self.gateway.container_name,
                &self.gateway.alias,
            ));
        }

        let mut names = HashSet::new();
        for (section, image, name, alias) in services {
            for (field, value) in [("image", image), ("container_name", name), ("alias", alias)] {
                if value.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "'{}.{}' must not be empty",
                        section, field
                    )));
                }
            }
            if !names.insert(name.as_str()) {
                return Err(Error::Config(format!(
                    "Container name '{}' is used by more than one service",
                    name
                )));
            }
        }

        let mut ports = vec![
            ("datastore.port", self.datastore.port),
            ("rest.api_port", self.rest.api_port),
            ("rest.admin_port", self.rest.admin_port),
        ];
        if self.gateway.enabled {
            ports.push(("gateway.port", self.gateway.port));
        }
        let mut seen = HashSet::new();
        for (field, port) in ports {
            if port == 0 {
                return Err(Error::Config(format!("'{}' must be non-zero", field)));
            }
            if !seen.insert(port) {
                return Err(Error::Config(format!(
                    "'{}' ({}) collides with another published port",
                    field, port
                )));
            }
        }

        if !self.rest.ready_path.starts_with('/') {
            return Err(Error::Config(format!(
                "'rest.ready_path' must start with '/', got '{}'",
                self.rest.ready_path
            )));
        }

        let r = &self.readiness;
        if r.max_attempts == 0 {
            return Err(Error::Config(
                "'readiness.max_attempts' must be at least 1".to_string(),
            ));
        }
        if r.initial_backoff > r.max_backoff {
            return Err(Error::Config(format!(
                "'readiness.initial_backoff' ({:?}) exceeds 'readiness.max_backoff' ({:?})",
                r.initial_backoff, r.max_backoff
            )));
        }
        if r.probe_timeout.is_zero() {
            return Err(Error::Config(
                "'readiness.probe_timeout' must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_empty_image_rejected() {
        let mut config = Config::default();
        config.rest.image = " ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rest.image"));
    }

    #[test]
    fn test_disabled_gateway_skips_its_checks() {
        let mut config = Config::default();
        config.gateway.enabled = false;
        config.gateway.image.clear();
        config.gateway.port = config.rest.api_port;
        config.validate().unwrap();
    }

    #[test]
    fn test_port_collision_rejected() {
        let mut config = Config::default();
        config.rest.admin_port = config.rest.api_port;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_backoff_bounds() {
        let mut config = Config::default();
        config.readiness.initial_backoff = Duration::from_secs(10);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.readiness.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
