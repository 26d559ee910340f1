//! Signal handling and ordered teardown.

use crate::orchestrator::{StopRegistry, UnwindReport};
use crate::server::ServerHandle;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Exit code used when a second interrupt forces termination.
pub const FORCE_QUIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    Draining,
    Stopped,
}

/// Turns interrupts and cancellation into a single, ordered drain.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    phase: Arc<Mutex<ShutdownPhase>>,
    server_grace: Duration,
    stop_grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(token: CancellationToken, server_grace: Duration, stop_grace: Duration) -> Self {
        Self {
            token,
            phase: Arc::new(Mutex::new(ShutdownPhase::Running)),
            server_grace,
            stop_grace,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.lock()
    }

    /// Request shutdown. Everything waiting on the token wakes up.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!("Shutdown requested");
            self.token.cancel();
        }
    }

    /// Spawn the signal listener.
    ///
    /// First SIGINT or any SIGTERM triggers a graceful drain. A second SIGINT
    /// exits the process immediately with [`FORCE_QUIT_CODE`].
    #[cfg(unix)]
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("Failed to create SIGINT handler: {}", e);
                    None
                }
            };
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("Failed to create SIGTERM handler: {}", e);
                    None
                }
            };

            if sigint.is_none() && sigterm.is_none() {
                tracing::warn!(
                    "No signal handlers available - process can only be terminated externally"
                );
                std::future::pending::<()>().await;
                return;
            }

            let mut signal_count = 0;
            loop {
                tokio::select! {
                    _ = async {
                        if let Some(ref mut s) = sigint {
                            s.recv().await
                        } else {
                            std::future::pending::<Option<()>>().await
                        }
                    } => {
                        signal_count += 1;
                        if signal_count == 1 {
                            eprintln!("\n\nStopping services... (Press Ctrl+C again to force quit)");
                            coordinator.trigger();
                        } else {
                            eprintln!("\n\nForce quitting...");
                            std::process::exit(FORCE_QUIT_CODE);
                        }
                    }
                    _ = async {
                        if let Some(ref mut s) = sigterm {
                            s.recv().await
                        } else {
                            std::future::pending::<Option<()>>().await
                        }
                    } => {
                        tracing::info!("Received SIGTERM, stopping services gracefully");
                        coordinator.trigger();
                    }
                }
            }
        })
    }

    #[cfg(not(unix))]
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut signal_count = 0;
            while tokio::signal::ctrl_c().await.is_ok() {
                signal_count += 1;
                if signal_count == 1 {
                    eprintln!("\n\nStopping services... (Press Ctrl+C again to force quit)");
                    coordinator.trigger();
                } else {
                    eprintln!("\n\nForce quitting...");
                    std::process::exit(FORCE_QUIT_CODE);
                }
            }
        })
    }

    /// Stop the HTTP server, then unwind the registry. Runs once; later calls
    /// return an empty report.
    pub async fn drain(
        &self,
        server: Option<ServerHandle>,
        registry: &mut StopRegistry,
    ) -> UnwindReport {
        {
            let mut phase = self.phase.lock();
            if *phase != ShutdownPhase::Running {
                return UnwindReport::default();
            }
            *phase = ShutdownPhase::Draining;
        }
        self.trigger();

        if let Some(server) = server {
            server.shutdown(self.server_grace).await;
        }

        let report = registry.unwind(self.stop_grace).await;
        for (label, reason) in &report.failed {
            tracing::warn!("'{}' did not stop cleanly: {}", label, reason);
        }

        *self.phase.lock() = ShutdownPhase::Stopped;
        tracing::info!("Shutdown complete");
        report
    }
}
