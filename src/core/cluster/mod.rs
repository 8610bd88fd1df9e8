// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cluster membership as seen by the manager.
//!
//! Nodes are supplied externally (static configuration or a resource manager
//! pushing updates); nothing here discovers peers on its own.

pub mod node;
pub mod registry;

pub use node::{NodeInfo, NodeStatus, NodeType, DEFAULT_NODE_PORT};
pub use registry::NodeRegistry;
