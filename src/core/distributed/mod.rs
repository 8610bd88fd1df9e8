// SPDX-License-Identifier: MIT OR Apache-2.0

// src/core/distributed/mod.rs

//! Distributed Coordination
//!
//! Everything that crosses the network between the manager, the storage nodes
//! and clients lives here:
//!
//! - [`transport`]: length-prefixed TCP channel behind the [`transport::Transport`] trait
//! - [`protocol`]: the message vocabulary carried over that channel
//! - [`broadcast`]: one command fanned out to many nodes, outcomes fanned back in
//! - [`scan`]: sequential proxy of every node's page stream to a single client
//! - [`dispatch`]: in-flight accounting and round-robin placement for data dispatch

pub mod broadcast;
pub mod dispatch;
pub mod protocol;
pub mod scan;
pub mod transport;

pub use broadcast::{
    BroadcastConfig, BroadcastCoordinator, BroadcastOutcome, NodeOutcome, TargetMode,
};
pub use dispatch::{DispatchGuard, DispatchTracker, RoundRobinPlacement};
pub use protocol::{
    ExportFormat, ManagerRequest, Message, MessageBody, SimpleResult, StorageCommand,
};
pub use scan::{ScanConfig, ScanCoordinator, ScanOutcome, ScanReport};
pub use transport::{Connection, Listener, TcpTransport, TcpTransportConfig, Transport};

use crate::core::catalog::CatalogError;

/// Result type for distributed operations
pub type DistributedResult<T> = Result<T, DistributedError>;

/// Error types for distributed coordination
#[derive(thiserror::Error, Debug)]
pub enum DistributedError {
    #[error("Transport error: {message}")]
    TransportError { message: String },

    #[error("Protocol error: {message}")]
    ProtocolError { message: String },

    #[error("Remote error: {message}")]
    RemoteError { message: String },

    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl DistributedError {
    pub fn protocol(message: impl Into<String>) -> Self {
        DistributedError::ProtocolError {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        DistributedError::TransportError {
            message: message.into(),
        }
    }
}
