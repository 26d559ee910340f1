use dockyard::docker::{ContainerRuntime, DockerClient};
use dockyard::{
    server, Config, MigrationSet, Orchestrator, OrchestratorContext, Secrets, ShutdownCoordinator,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn run_serve(config: Config) -> anyhow::Result<()> {
    // Fail on bad scripts before anything starts
    let scripts = MigrationSet::embedded()?;
    let secrets = Secrets::generate()?;

    let token = CancellationToken::new();
    let coordinator =
        ShutdownCoordinator::new(token.clone(), config.server.shutdown_grace, config.stop.grace);
    let signals = coordinator.listen_for_signals();

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerClient::new());
    let ctx = OrchestratorContext::new(config, runtime, secrets, token.clone());
    let server = server::start(
        &ctx.config.server.host,
        ctx.config.server.port,
        ctx.status.clone(),
    )
    .await?;
    let health_url = format!("http://{}/health", server.local_addr());

    let mut orchestrator = Orchestrator::new(ctx, scripts);
    if let Err(e) = orchestrator.bootstrap().await {
        // bootstrap already unwound what it started; this stops the server
        coordinator
            .drain(Some(server), orchestrator.registry_mut())
            .await;
        signals.abort();
        if e.is_cancelled() {
            return Ok(());
        }
        return Err(e.into());
    }

    println!("Services are up. Health: {}", health_url);
    println!("Press Ctrl+C to stop");

    token.cancelled().await;
    let report = coordinator
        .drain(Some(server), orchestrator.registry_mut())
        .await;
    signals.abort();

    if !report.forced.is_empty() {
        println!("Force-stopped: {}", report.forced.join(", "));
    }
    if !report.failed.is_empty() {
        println!(
            "Some resources did not stop cleanly: {}",
            report
                .failed
                .iter()
                .map(|(label, _)| label.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    println!("All services stopped");
    Ok(())
}
