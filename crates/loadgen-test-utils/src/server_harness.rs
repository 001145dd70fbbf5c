//! Test server harness for end-to-end tests.
//!
//! Provides `TestReviewServer` for spawning the in-memory stub service.

use crate::stub_service::{self, StubService};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Test harness for spawning the stub review service.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<(), anyhow::Error> {
///     let server = TestReviewServer::spawn().await?;
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestReviewServer {
    addr: SocketAddr,
    service: Arc<StubService>,
    handle: JoinHandle<()>,
}

impl TestReviewServer {
    /// Spawn a stub server on a random local port.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(StubService::new()).await
    }

    /// Spawn a stub server that delays every response by `latency`.
    pub async fn spawn_with_latency(latency: Duration) -> Result<Self, anyhow::Error> {
        Self::spawn_with(StubService::new().with_latency(latency)).await
    }

    async fn spawn_with(service: StubService) -> Result<Self, anyhow::Error> {
        let service = Arc::new(service);
        let app = stub_service::build_routes(Arc::clone(&service));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            service,
            handle,
        })
    }

    /// Base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The stub's state, for assertions.
    pub fn service(&self) -> &StubService {
        &self.service
    }
}

impl Drop for TestReviewServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
