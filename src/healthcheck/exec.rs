use super::ReadinessCheck;
use crate::docker::ContainerRuntime;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Readiness via a command run inside the container.
///
/// Passes when the command exits zero and its combined output contains
/// `expect`.
pub struct ExecCheck {
    runtime: Arc<dyn ContainerRuntime>,
    container_id: String,
    argv: Vec<String>,
    expect: String,
    timeout: Duration,
}

impl ExecCheck {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        container_id: impl Into<String>,
        argv: Vec<String>,
        expect: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            container_id: container_id.into(),
            argv,
            expect: expect.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ReadinessCheck for ExecCheck {
    async fn probe(&self) -> std::result::Result<(), String> {
        let result =
            tokio::time::timeout(self.timeout, self.runtime.exec(&self.container_id, &self.argv))
                .await;

        match result {
            Err(_) => Err(format!("no answer within {:?}", self.timeout)),
            Ok(Err(e)) => Err(e.to_string()),
            Ok(Ok(out)) if out.success() && out.output.contains(&self.expect) => Ok(()),
            Ok(Ok(out)) => Err(format!("exit {}: {}", out.exit_code, out.one_line())),
        }
    }

    fn describe(&self) -> String {
        format!("exec `{}` until \"{}\"", self.argv.join(" "), self.expect)
    }
}
