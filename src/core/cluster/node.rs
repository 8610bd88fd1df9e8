// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::distributed::{DistributedError, DistributedResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Port assumed when a node address carries no `:port` suffix
pub const DEFAULT_NODE_PORT: u16 = 8108;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[default]
    Storage,
    Manager,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Storage => write!(f, "storage"),
            NodeType::Manager => write!(f, "manager"),
        }
    }
}

/// Health reported for a node by the resource manager
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Active,
    Suspect,
    Down,
}

impl NodeStatus {
    /// Numeric status code persisted in the catalog
    pub fn code(&self) -> i64 {
        match self {
            NodeStatus::Active => 0,
            NodeStatus::Suspect => 1,
            NodeStatus::Down => 2,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => NodeStatus::Active,
            1 => NodeStatus::Suspect,
            _ => NodeStatus::Down,
        }
    }
}

/// A cluster node. Immutable once registered except for `status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeInfo {
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub node_type: NodeType,
    #[serde(default)]
    pub status: NodeStatus,
}

impl NodeInfo {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        let address = address.into();
        NodeInfo {
            name: format!("{}:{}", address, port),
            address,
            port,
            node_type: NodeType::Storage,
            status: NodeStatus::Active,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.node_type = node_type;
        self
    }

    /// Parse `host:port` or a bare `host`, which falls back to `default_port`.
    pub fn parse(endpoint: &str, default_port: u16) -> DistributedResult<Self> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(DistributedError::ConfigurationError {
                message: "Node address cannot be empty".to_string(),
            });
        }
        match endpoint.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                let port = port.parse::<u16>().map_err(|e| {
                    DistributedError::ConfigurationError {
                        message: format!("Invalid port in node address '{}': {}", endpoint, e),
                    }
                })?;
                Ok(NodeInfo::new(host, port))
            }
            Some(_) => Err(DistributedError::ConfigurationError {
                message: format!("Node address '{}' has no host", endpoint),
            }),
            None => Ok(NodeInfo::new(endpoint, default_port)),
        }
    }

    /// Identity used by the catalog and in broadcast outcomes
    pub fn identity(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn is_available(&self) -> bool {
        self.status != NodeStatus::Down
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.identity(), self.name)
    }
}
