//! Shared utilities for integration tests.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use marquee_api::config::ServerConfig;
use marquee_api::lifecycle::{DrainOutcome, ShutdownCoordinator};
use marquee_api::ApiServer;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A server running on an ephemeral localhost port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub coordinator: Arc<ShutdownCoordinator>,
    pub handle: JoinHandle<io::Result<DrainOutcome>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Start the drain and wait for the server to report how it ended.
    #[allow(dead_code)]
    pub async fn shutdown(self) -> DrainOutcome {
        self.coordinator.signal();
        self.handle.await.unwrap().unwrap()
    }
}

/// Defaults with a short drain budget.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.shutdown.drain_budget_secs = 2;
    config
}

pub async fn start_server(config: ServerConfig) -> TestServer {
    start(ApiServer::new(config)).await
}

#[allow(dead_code)]
pub async fn start(server: ApiServer) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let coordinator = server.coordinator();
    let handle = tokio::spawn(server.run(listener));
    TestServer {
        addr,
        coordinator,
        handle,
    }
}

/// Client without connection pooling, so each request is a fresh connection.
#[allow(dead_code)]
pub fn fresh_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
