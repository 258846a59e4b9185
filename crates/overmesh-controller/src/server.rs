//! API server

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

/// Controller HTTP server
pub struct ApiServer {
    bind: SocketAddr,
    router: Router,
}

impl ApiServer {
    /// Create a server for a prepared router
    pub fn new(bind: SocketAddr, router: Router) -> Self {
        Self { bind, router }
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind
    }

    /// Run the server until `shutdown` resolves
    pub async fn run_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind).await?;

        info!(bind = %self.bind, "Starting controller API server");

        serve(listener, self.router, shutdown).await
    }
}

/// Serve `router` on an already bound listener
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    info!("API server shut down");
    Ok(())
}
