//! Outbound calls to node execution endpoints

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;
use weft_core::{Error, Result, RouterConfig, Task};
use weft_registry::NodeView;

/// Transport seam between the router and the nodes it dispatches to.
/// Mocked in tests; HTTP in production.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Send a task to a node's execution endpoint under the dispatch
    /// timeout. A timeout is a node failure.
    async fn execute(&self, node: &NodeView, task: &Task) -> Result<()>;

    /// Cheap health probe under the short probe timeout
    async fn probe(&self, address: SocketAddr) -> Result<()>;
}

/// HTTP client against the node agent's REST endpoints
pub struct HttpNodeClient {
    client: reqwest::Client,
    dispatch_timeout: Duration,
    probe_timeout: Duration,
}

impl HttpNodeClient {
    /// Create a client from router configuration
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            dispatch_timeout: config.dispatch_timeout,
            probe_timeout: config.probe_timeout,
        }
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn execute(&self, node: &NodeView, task: &Task) -> Result<()> {
        let url = format!("http://{}/v1/execute", node.address);
        debug!(node = %node.name, task = %task.id, "Dispatching task");

        let request = self.client.post(&url).json(task).send();

        let response = tokio::time::timeout(self.dispatch_timeout, request)
            .await
            .map_err(|_| {
                Error::dispatch_timeout(format!(
                    "node {} did not respond within {:?}",
                    node.name, self.dispatch_timeout
                ))
            })?
            .map_err(|e| Error::network(format!("dispatch to {} failed: {}", node.name, e)))?;

        if !response.status().is_success() {
            return Err(Error::network(format!(
                "node {} rejected task: HTTP {}",
                node.name,
                response.status()
            )));
        }

        Ok(())
    }

    async fn probe(&self, address: SocketAddr) -> Result<()> {
        let url = format!("http://{}/health", address);

        let response = tokio::time::timeout(self.probe_timeout, self.client.get(&url).send())
            .await
            .map_err(|_| Error::dispatch_timeout(format!("probe of {} timed out", address)))?
            .map_err(|e| Error::network(format!("probe of {} failed: {}", address, e)))?;

        if !response.status().is_success() {
            return Err(Error::network(format!(
                "probe of {} returned HTTP {}",
                address,
                response.status()
            )));
        }

        Ok(())
    }
}
