// SPDX-License-Identifier: MIT OR Apache-2.0

// src/core/config/mod.rs

//! # Manager Configuration
//!
//! Configuration is layered, lowest precedence first:
//!
//! 1. Rust defaults (`ManagerConfig::default()`)
//! 2. A TOML or YAML file, chosen by extension, with `${VAR}` / `${VAR:default}`
//!    environment substitution
//! 3. CLI `--set path.to.key=value` overrides
//!
//! ```toml
//! [manager]
//! listen = "0.0.0.0:8108"
//!
//! [catalog]
//! path = "${CATALOG_PATH:./catalog.db}"
//!
//! [broadcast]
//! target_mode = "narrow"
//!
//! [[nodes]]
//! address = "storage-a:8108"
//!
//! [[nodes]]
//! address = "storage-b"   # default_node_port applies
//! ```

pub mod override_utils;
pub mod toml_config;

pub use override_utils::apply_config_overrides;
pub use toml_config::{load_config_file, substitute_env_vars};

use crate::core::cluster::{NodeInfo, DEFAULT_NODE_PORT};
use crate::core::distributed::{BroadcastConfig, ScanConfig, TcpTransportConfig};
use serde::{Deserialize, Serialize};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse configuration: {message}")]
    Parse { message: String },

    #[error("Environment variable substitution failed: {message}")]
    EnvSubstitution { message: String },

    #[error("Invalid configuration: {message}")]
    Validation { message: String },

    #[error("Internal configuration error: {message}")]
    Internal { message: String },
}

impl ConfigError {
    pub fn internal_error(message: String) -> Self {
        ConfigError::Internal { message }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ManagerSection {
    /// Address the manager accepts client requests on
    pub listen: String,
    /// Port used for node addresses that omit one
    pub default_node_port: u16,
}

impl Default for ManagerSection {
    fn default() -> Self {
        ManagerSection {
            listen: "0.0.0.0:8108".to_string(),
            default_node_port: DEFAULT_NODE_PORT,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    /// SQLite file; the catalog is kept in memory when unset
    pub path: Option<String>,
}

/// Statically configured cluster node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeEntry {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ManagerConfig {
    pub manager: ManagerSection,
    pub catalog: CatalogConfig,
    pub transport: TcpTransportConfig,
    pub broadcast: BroadcastConfig,
    pub scan: ScanConfig,
    pub nodes: Vec<NodeEntry>,
}

impl ManagerConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.manager.listen.trim().is_empty() {
            return Err(ConfigError::validation_error(
                "manager.listen cannot be empty",
            ));
        }
        if self.broadcast.max_concurrency == 0 {
            return Err(ConfigError::validation_error(
                "broadcast.max_concurrency must be greater than zero",
            ));
        }
        if self.transport.max_message_size == 0 {
            return Err(ConfigError::validation_error(
                "transport.max_message_size must be greater than zero",
            ));
        }
        self.node_infos().map(|_| ())
    }

    /// Static node list with default ports applied
    pub fn node_infos(&self) -> ConfigResult<Vec<NodeInfo>> {
        self.nodes
            .iter()
            .map(|entry| {
                let node = NodeInfo::parse(&entry.address, self.manager.default_node_port)
                    .map_err(|e| ConfigError::validation_error(e.to_string()))?;
                Ok(match &entry.name {
                    Some(name) => node.with_name(name.clone()),
                    None => node,
                })
            })
            .collect()
    }
}
