// SPDX-License-Identifier: MIT OR Apache-2.0

// src/core/manager/server.rs

use super::handler::RequestHandler;
use crate::core::catalog::Catalog;
use crate::core::cluster::NodeRegistry;
use crate::core::config::ManagerConfig;
use crate::core::distributed::transport::{Listener, TcpTransport, Transport};
use crate::core::distributed::{
    BroadcastCoordinator, DispatchTracker, DistributedError, DistributedResult, ScanCoordinator,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Accept loop in front of a [`RequestHandler`]
pub struct ManagerServer {
    handler: Arc<RequestHandler>,
    transport: Arc<dyn Transport>,
}

/// Running manager
pub struct ManagerHandle {
    pub local_addr: String,
    task: JoinHandle<()>,
}

impl ManagerHandle {
    pub fn shutdown(self) {
        self.task.abort();
    }

    /// Wait for the accept loop to end
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                log::error!("Manager task ended abnormally: {}", e);
            }
        }
    }
}

impl ManagerServer {
    pub fn new(handler: RequestHandler, transport: Arc<dyn Transport>) -> Self {
        ManagerServer {
            handler: Arc::new(handler),
            transport,
        }
    }

    /// Wire up catalog, registry and coordinators from configuration
    pub fn from_config(config: &ManagerConfig) -> DistributedResult<Self> {
        config
            .validate()
            .map_err(|e| DistributedError::ConfigurationError {
                message: e.to_string(),
            })?;

        let catalog = match &config.catalog.path {
            Some(path) => {
                log::info!("Opening catalog at {}", path);
                Catalog::open(path)?
            }
            None => {
                log::info!("Using in-memory catalog");
                Catalog::in_memory()?
            }
        };

        let nodes = config
            .node_infos()
            .map_err(|e| DistributedError::ConfigurationError {
                message: e.to_string(),
            })?;
        let registry = NodeRegistry::from_nodes(nodes);
        log::info!("Registered {} storage node(s)", registry.len());

        let transport: Arc<dyn Transport> =
            Arc::new(TcpTransport::with_config(config.transport.clone()));
        let broadcaster = Arc::new(BroadcastCoordinator::new(
            Arc::clone(&transport),
            config.broadcast.clone(),
        ));
        let scanner = Arc::new(ScanCoordinator::new(
            catalog.clone(),
            Arc::clone(&transport),
            config.scan.clone(),
        ));

        let handler = RequestHandler::new(
            catalog,
            registry,
            broadcaster,
            scanner,
            Arc::clone(&transport),
            DispatchTracker::new(),
        );
        Ok(ManagerServer::new(handler, transport))
    }

    pub fn handler(&self) -> &Arc<RequestHandler> {
        &self.handler
    }

    /// Bind and serve in the background
    pub async fn start(&self, endpoint: &str) -> DistributedResult<ManagerHandle> {
        let listener = self.transport.listen(endpoint).await?;
        let local_addr = listener.local_addr().to_string();
        log::info!("Manager listening on {}", local_addr);

        let handler = Arc::clone(&self.handler);
        let transport = Arc::clone(&self.transport);
        let task = tokio::spawn(async move { serve(handler, transport, listener).await });
        Ok(ManagerHandle { local_addr, task })
    }
}

async fn serve(handler: Arc<RequestHandler>, transport: Arc<dyn Transport>, listener: Listener) {
    loop {
        match transport.accept(&listener).await {
            Ok(connection) => {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let peer = connection.endpoint.clone();
                    if let Err(e) = handler.handle_connection(connection).await {
                        log::warn!("Manager: connection from {} failed: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                log::error!("Manager: accept failed: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            }
        }
    }
}
