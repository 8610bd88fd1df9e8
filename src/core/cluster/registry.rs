// SPDX-License-Identifier: MIT OR Apache-2.0

//! NodeRegistry: in-memory table of the nodes the manager may target.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::node::{NodeInfo, NodeStatus, NodeType};
use crate::core::distributed::{DistributedError, DistributedResult};

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    node: NodeInfo,
}

/// Thread-safe registry of cluster nodes keyed by identity (`address:port`).
///
/// Cloning is cheap and shares the underlying map. Snapshots come back in
/// registration order so broadcasts and listings are stable.
#[derive(Clone, Debug, Default)]
pub struct NodeRegistry {
    nodes: Arc<DashMap<String, Entry>>,
    next_seq: Arc<AtomicU64>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = NodeInfo>) -> Self {
        let registry = Self::new();
        for node in nodes {
            registry.register(node);
        }
        registry
    }

    /// Register a node. Re-registering an identity replaces the record but
    /// keeps its original position. Returns `true` for a new identity.
    pub fn register(&self, node: NodeInfo) -> bool {
        let identity = node.identity();
        let mut inserted = false;
        self.nodes
            .entry(identity)
            .and_modify(|entry| entry.node = node.clone())
            .or_insert_with(|| {
                inserted = true;
                Entry {
                    seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                    node: node.clone(),
                }
            });
        if inserted {
            log::info!("Registered node {}", node);
        }
        inserted
    }

    pub fn remove(&self, identity: &str) -> Option<NodeInfo> {
        self.nodes.remove(identity).map(|(_, entry)| entry.node)
    }

    /// Status is the only attribute that changes after registration.
    pub fn mark_status(&self, identity: &str, status: NodeStatus) -> DistributedResult<()> {
        match self.nodes.get_mut(identity) {
            Some(mut entry) => {
                if entry.node.status != status {
                    log::info!(
                        "Node {} status {:?} -> {:?}",
                        identity,
                        entry.node.status,
                        status
                    );
                }
                entry.node.status = status;
                Ok(())
            }
            None => Err(DistributedError::NodeNotFound {
                node_id: identity.to_string(),
            }),
        }
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.nodes.contains_key(identity)
    }

    pub fn get(&self, identity: &str) -> Option<NodeInfo> {
        self.nodes.get(identity).map(|entry| entry.node.clone())
    }

    /// Snapshot of all nodes in registration order
    pub fn all_nodes(&self) -> Vec<NodeInfo> {
        let mut entries: Vec<Entry> = self.nodes.iter().map(|r| r.value().clone()).collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| entry.node).collect()
    }

    /// Storage nodes in registration order, whatever their status. A node that
    /// is down still gets targeted and is reported as failed.
    pub fn storage_nodes(&self) -> Vec<NodeInfo> {
        self.all_nodes()
            .into_iter()
            .filter(|node| node.node_type == NodeType::Storage)
            .collect()
    }

    pub fn storage_identities(&self) -> Vec<String> {
        self.storage_nodes().iter().map(NodeInfo::identity).collect()
    }

    pub fn available_nodes(&self) -> Vec<NodeInfo> {
        self.all_nodes()
            .into_iter()
            .filter(NodeInfo::is_available)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_order_is_stable() {
        let registry = NodeRegistry::new();
        assert!(registry.register(NodeInfo::new("c", 3)));
        assert!(registry.register(NodeInfo::new("a", 1)));
        assert!(registry.register(NodeInfo::new("b", 2)));

        let ids: Vec<String> = registry.all_nodes().iter().map(|n| n.identity()).collect();
        assert_eq!(ids, vec!["c:3", "a:1", "b:2"]);
    }

    #[test]
    fn test_reregister_keeps_position() {
        let registry = NodeRegistry::from_nodes(vec![NodeInfo::new("a", 1), NodeInfo::new("b", 2)]);
        assert!(!registry.register(NodeInfo::new("a", 1).with_name("renamed")));

        let nodes = registry.all_nodes();
        assert_eq!(nodes[0].name, "renamed");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_mark_status() {
        let registry = NodeRegistry::from_nodes(vec![NodeInfo::new("a", 1)]);
        registry.mark_status("a:1", NodeStatus::Down).unwrap();
        assert!(registry.available_nodes().is_empty());
        // down nodes are still broadcast targets
        assert_eq!(registry.storage_identities(), vec!["a:1"]);
        assert!(registry.mark_status("zz:9", NodeStatus::Active).is_err());
    }

    #[test]
    fn test_storage_nodes_exclude_managers() {
        let registry = NodeRegistry::from_nodes(vec![
            NodeInfo::new("m", 1).with_type(NodeType::Manager),
            NodeInfo::new("s", 2),
        ]);
        assert_eq!(registry.storage_identities(), vec!["s:2"]);
        assert!(registry.remove("m:1").is_some());
        assert!(!registry.contains("m:1"));
    }
}
