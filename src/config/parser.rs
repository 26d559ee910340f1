use super::Config;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "DOCKYARD_CONFIG";

pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// Pick the config file: explicit path, then `DOCKYARD_CONFIG`, then
    /// `dockyard.yaml`/`dockyard.yml` in the current directory.
    ///
    /// Returns `None` when nothing is found; defaults apply in that case.
    pub fn locate(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        let cwd = std::env::current_dir().ok()?;
        ["dockyard.yaml", "dockyard.yml"]
            .iter()
            .map(|name| cwd.join(name))
            .find(|p| p.exists())
    }

    /// Load config from file path
    pub fn load_config<P: AsRef<Path>>(&self, path: P) -> Result<Config> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        self.parse_config(&content)
    }

    /// Parse and validate YAML text. Empty text yields the defaults.
    pub fn parse_config(&self, content: &str) -> Result<Config> {
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Locate and load, falling back to defaults.
    pub fn load(&self, explicit: Option<&Path>) -> Result<Config> {
        match self.locate(explicit) {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                self.load_config(path)
            }
            None => {
                let config = Config::default();
                config.validate()?;
                Ok(config)
            }
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_empty_config_is_defaults() {
        let config = Parser::new().parse_config("").unwrap();
        assert_eq!(config.network, "dockyard-net");
        assert_eq!(config.readiness.max_attempts, 5);
        assert_eq!(config.stop.settle, Duration::from_millis(200));
        assert!(config.gateway.enabled);
    }

    #[test]
    fn test_partial_config_overrides() {
        let yaml = r#"
project: shop
readiness:
  max_attempts: 8
  initial_backoff: 250ms
gateway:
  enabled: false
"#;
        let config = Parser::new().parse_config(yaml).unwrap();
        assert_eq!(config.project, "shop");
        assert_eq!(config.project_label(), "com.docker.compose.project=shop");
        assert_eq!(config.readiness.max_attempts, 8);
        assert_eq!(config.readiness.initial_backoff, Duration::from_millis(250));
        // untouched fields keep their defaults
        assert_eq!(config.readiness.max_backoff, Duration::from_secs(5));
        assert!(!config.gateway.enabled);
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        let err = Parser::new().parse_config("netwrok: x\n").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "network: custom-net").unwrap();
        let config = Parser::new().load(Some(file.path())).unwrap();
        assert_eq!(config.network, "custom-net");
    }

    #[test]
    fn test_missing_explicit_file_is_config_error() {
        let err = Parser::new()
            .load(Some(Path::new("/nonexistent/dockyard.yaml")))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
