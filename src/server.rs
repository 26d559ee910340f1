//! Edge HTTP server exposing the liveness flags.

use crate::error::Result;
use crate::status::StatusFlags;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub fn create_router(status: StatusFlags) -> Router {
    Router::new()
        .route("/", get(|| async { "OK" }))
        .route("/health", get(health))
        .with_state(status)
}

async fn health(State(status): State<StatusFlags>) -> (StatusCode, Json<crate::status::StatusSnapshot>) {
    let snapshot = status.snapshot();
    let code = if snapshot.alive {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(snapshot))
}

/// A running server and the means to stop it.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

/// Bind `host:port` and serve in the background.
pub async fn start(host: &str, port: u16, status: StatusFlags) -> Result<ServerHandle> {
    let listener = TcpListener::bind((host, port)).await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = oneshot::channel::<()>();

    let app = create_router(status);
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await
    });

    tracing::info!("Status server listening on http://{}", addr);
    Ok(ServerHandle {
        addr,
        shutdown: Some(tx),
        task,
    })
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and let in-flight requests finish within
    /// `grace`; after that the server task is aborted.
    ///
    /// Errors are logged, never returned.
    pub async fn shutdown(mut self, grace: Duration) {
        if let Some(tx) = self.shutdown.take() {
            // a dropped receiver means the server already stopped
            let _ = tx.send(());
        }

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(Ok(()))) => tracing::debug!("Status server stopped"),
            Ok(Ok(Err(e))) => tracing::warn!("Status server error during shutdown: {}", e),
            Ok(Err(e)) if e.is_cancelled() => {}
            Ok(Err(e)) => tracing::warn!("Status server task failed: {}", e),
            Err(_) => {
                tracing::warn!("Status server did not drain within {:?}, aborting", grace);
                self.task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Component;

    #[tokio::test]
    async fn test_health_reflects_flags() {
        let status = StatusFlags::new();
        let server = start("127.0.0.1", 0, status.clone()).await.unwrap();
        let url = format!("http://{}/health", server.local_addr());

        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["alive"], false);

        status.set(Component::Datastore, true);
        status.set(Component::Rest, true);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["datastore"], true);
        assert_eq!(body["rest"], true);

        server.shutdown(Duration::from_secs(2)).await;
        assert!(reqwest::get(&url).await.is_err());
    }
}
