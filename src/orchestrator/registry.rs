use crate::error::Result;
use crate::supervisor::ContainerHandle;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;

type StopFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

struct Entry {
    label: String,
    stop: StopFn,
    force: Option<StopFn>,
}

/// Outcome of [`StopRegistry::unwind`], in the order entries were visited.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnwindReport {
    pub stopped: Vec<String>,
    /// Entries whose stop overran the grace period and were force-terminated.
    pub forced: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl UnwindReport {
    pub fn is_clean(&self) -> bool {
        self.forced.is_empty() && self.failed.is_empty()
    }
}

/// Teardown operations for everything that started, unwound last-in first-out.
///
/// Entries are only ever appended; [`unwind`](Self::unwind) drains them, so
/// each stop runs at most once.
#[derive(Default)]
pub struct StopRegistry {
    entries: Vec<Entry>,
}

impl StopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, label: impl Into<String>, stop: F)
    where
        F: FnOnce() -> BoxFuture<'static, Result<()>> + Send + 'static,
    {
        self.entries.push(Entry {
            label: label.into(),
            stop: Box::new(stop),
            force: None,
        });
    }

    /// Register a stop plus the fallback used when it overruns its grace.
    pub fn register_with_force<F, K>(&mut self, label: impl Into<String>, stop: F, force: K)
    where
        F: FnOnce() -> BoxFuture<'static, Result<()>> + Send + 'static,
        K: FnOnce() -> BoxFuture<'static, Result<()>> + Send + 'static,
    {
        self.entries.push(Entry {
            label: label.into(),
            stop: Box::new(stop),
            force: Some(Box::new(force)),
        });
    }

    pub fn register_container(&mut self, handle: Arc<ContainerHandle>) {
        let label = handle.name().to_string();
        let killer = handle.clone();
        self.register_with_force(
            label,
            move || async move { handle.stop().await }.boxed(),
            move || async move { killer.kill().await }.boxed(),
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels in registration order.
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    /// Run every stop in reverse registration order.
    ///
    /// Each stop gets `grace`; on overrun its force fallback runs. Failures
    /// are logged and recorded, never propagated, and never stop the unwind.
    pub async fn unwind(&mut self, grace: Duration) -> UnwindReport {
        let mut report = UnwindReport::default();
        if self.entries.is_empty() {
            return report;
        }
        tracing::info!("Stopping {} resource(s)", self.entries.len());

        while let Some(entry) = self.entries.pop() {
            let Entry { label, stop, force } = entry;
            tracing::debug!("Stopping '{}'", label);

            match tokio::time::timeout(grace, stop()).await {
                Ok(Ok(())) => report.stopped.push(label),
                Ok(Err(e)) => {
                    tracing::warn!("Stopping '{}' failed: {}", label, e);
                    report.failed.push((label, e.to_string()));
                }
                Err(_) => {
                    tracing::warn!("Stopping '{}' exceeded {:?}", label, grace);
                    match force {
                        Some(force) => match force().await {
                            Ok(()) => report.forced.push(label),
                            Err(e) => {
                                tracing::warn!("Force stop of '{}' failed: {}", label, e);
                                report.failed.push((label, e.to_string()));
                            }
                        },
                        None => report
                            .failed
                            .push((label, format!("timed out after {:?}", grace))),
                    }
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for StopRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopRegistry")
            .field("entries", &self.labels())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use parking_lot::Mutex;

    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        label: &str,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<()>> + Send + 'static {
        let log = log.clone();
        let label = label.to_string();
        move || {
            async move {
                log.lock().push(label);
                Ok::<(), Error>(())
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_unwinds_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = StopRegistry::new();
        for label in ["db", "rest", "gateway"] {
            registry.register(label, recorder(&log, label));
        }

        let report = registry.unwind(Duration::from_secs(1)).await;
        assert_eq!(*log.lock(), vec!["gateway", "rest", "db"]);
        assert_eq!(report.stopped, vec!["gateway", "rest", "db"]);
        assert!(report.is_clean());
        assert!(registry.is_empty());

        // second unwind is a no-op
        let again = registry.unwind(Duration::from_secs(1)).await;
        assert_eq!(again, UnwindReport::default());
        assert_eq!(log.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_unwind() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = StopRegistry::new();
        registry.register("db", recorder(&log, "db"));
        registry.register("rest", || {
            async {
                Err::<(), _>(Error::Teardown {
                    label: "rest".into(),
                    reason: "daemon hiccup".into(),
                })
            }
            .boxed()
        });

        let report = registry.unwind(Duration::from_secs(1)).await;
        assert_eq!(*log.lock(), vec!["db"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "rest");
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_falls_back_to_force() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = StopRegistry::new();
        registry.register_with_force(
            "db",
            || {
                async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<(), Error>(())
                }
                .boxed()
            },
            recorder(&log, "db-killed"),
        );
        registry.register("stuck-no-force", || {
            async {
                std::future::pending::<()>().await;
                Ok::<(), Error>(())
            }
            .boxed()
        });

        let report = registry.unwind(Duration::from_secs(2)).await;
        assert_eq!(report.forced, vec!["db"]);
        assert_eq!(report.failed[0].0, "stuck-no-force");
        assert_eq!(*log.lock(), vec!["db-killed"]);
    }
}
