// SPDX-License-Identifier: MIT OR Apache-2.0

// src/core/mod.rs

pub mod catalog;
pub mod cluster;
pub mod config;
pub mod distributed;
pub mod manager;
pub mod storage;

pub use self::catalog::{Catalog, CatalogError, CatalogResult};
pub use self::cluster::{NodeInfo, NodeRegistry};
pub use self::config::{ConfigError, ManagerConfig};
pub use self::distributed::{DistributedError, DistributedResult};
pub use self::manager::{ManagerClient, ManagerServer};
pub use self::storage::StorageNode;
