// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings on the named fields.
#![allow(unused_assignments)]

use crate::docker::DockerError;
use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(dockyard::config::invalid),
        help("Fix the configuration file (or unset DOCKYARD_CONFIG) and retry")
    )]
    Config(String),

    #[error("Container runtime unavailable for '{service}': {reason}")]
    #[diagnostic(
        code(dockyard::runtime::unavailable),
        help("Check that Docker is running with `docker ps`")
    )]
    RuntimeUnavailable { service: String, reason: String },

    #[error("Service '{service}' not ready after {attempts} attempt(s): {last_failure}")]
    #[diagnostic(
        code(dockyard::service::readiness_timeout),
        help("Inspect the container logs with `docker logs {service}`")
    )]
    ReadinessTimeout {
        service: String,
        attempts: u32,
        last_failure: String,
    },

    #[error("Migration batch failed: {reason}\n{output}")]
    #[diagnostic(
        code(dockyard::migration::apply_failed),
        help("No statement of the failed batch was committed; fix the script and restart")
    )]
    MigrationApply { reason: String, output: String },

    #[error("Conflicting runtime state: {0}")]
    #[diagnostic(
        code(dockyard::network::conflict),
        help("Remove the duplicate networks with `docker network rm` and retry")
    )]
    Conflict(String),

    #[error("Teardown of '{label}' failed: {reason}")]
    #[diagnostic(code(dockyard::teardown::failed))]
    Teardown { label: String, reason: String },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Docker error: {0}")]
    #[diagnostic(
        code(dockyard::docker::error),
        help("Check that Docker is running with `docker ps`")
    )]
    Docker(#[from] DockerError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token signing error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::Config(_) => Some(
                "Validate the configuration file passed with --config (or DOCKYARD_CONFIG)"
                    .to_string(),
            ),
            Error::RuntimeUnavailable { .. } | Error::Docker(_) => {
                Some("Check that Docker is running: docker ps".to_string())
            }
            Error::ReadinessTimeout { service, .. } => Some(format!(
                "The service may be slow to start. Check its output with: docker logs {}",
                service
            )),
            Error::MigrationApply { .. } => Some(
                "The whole batch was rolled back. Fix the failing statement shown above and restart."
                    .to_string(),
            ),
            Error::Conflict(_) => Some(
                "List duplicates with `docker network ls` and remove all but one (or all of them)."
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// Whether this error came from cancellation rather than a real failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}
