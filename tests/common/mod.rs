// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(dead_code)]

use setmesh::core::config::{ManagerConfig, NodeEntry};
use setmesh::core::distributed::protocol::{Message, MessageBody, SimpleResult, StorageCommand};
use setmesh::core::distributed::{
    DistributedError, DistributedResult, TcpTransport, TcpTransportConfig, Transport,
};
use setmesh::core::manager::{ManagerClient, ManagerHandle, ManagerServer};
use setmesh::core::storage::{StorageNode, StorageNodeHandle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn is_socket_permission_denied(err: &DistributedError) -> bool {
    match err {
        DistributedError::TransportError { message } => {
            let message = message.to_ascii_lowercase();
            message.contains("operation not permitted")
                || message.contains("permission denied")
                || message.contains("eacces")
                || message.contains("eperm")
                || message.contains("os error 1")
                || message.contains("os error 13")
        }
        _ => false,
    }
}

fn should_panic_on_socket_skip() -> bool {
    std::env::var("CI").is_ok() || std::env::var("GITHUB_ACTIONS").is_ok()
}

pub fn skip_or_panic_socket_denied(test_name: &str, err: &DistributedError) {
    if should_panic_on_socket_skip() {
        panic!("CI environment cannot bind sockets; failing {test_name} ({err:?})");
    } else {
        eprintln!("skipping {test_name}: cannot bind sockets ({err:?})");
    }
}

/// Unwrap a bind result, or return `None` when the sandbox forbids sockets
pub fn bound_or_skip<T>(test_name: &str, result: DistributedResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) if is_socket_permission_denied(&err) => {
            skip_or_panic_socket_denied(test_name, &err);
            None
        }
        Err(err) => panic!("{test_name}: failed to bind: {err:?}"),
    }
}

pub struct TestNode {
    pub node: Arc<StorageNode>,
    pub handle: StorageNodeHandle,
}

impl TestNode {
    pub fn address(&self) -> String {
        self.handle.local_addr.clone()
    }
}

/// A manager wired to a set of in-process storage nodes
pub struct TestCluster {
    pub nodes: Vec<TestNode>,
    pub server: ManagerServer,
    pub manager: ManagerHandle,
    pub client: ManagerClient,
}

impl TestCluster {
    pub fn node_addresses(&self) -> Vec<String> {
        self.nodes.iter().map(TestNode::address).collect()
    }
}

pub fn fast_transport() -> Arc<TcpTransport> {
    Arc::new(TcpTransport::with_config(TcpTransportConfig {
        connection_timeout_ms: 1000,
        read_timeout_ms: 5000,
        write_timeout_ms: 5000,
        ..Default::default()
    }))
}

pub async fn start_storage_nodes(test_name: &str, count: usize) -> Option<Vec<TestNode>> {
    let mut nodes = Vec::with_capacity(count);
    for i in 0..count {
        let node = StorageNode::new(format!("node-{}", i), fast_transport());
        let handle = bound_or_skip(test_name, node.start("127.0.0.1:0").await)?;
        nodes.push(TestNode { node, handle });
    }
    Some(nodes)
}

/// Start a manager over `extra_nodes` plus `count` fresh storage nodes
pub async fn start_cluster_with(
    test_name: &str,
    count: usize,
    extra_nodes: &[String],
    configure: impl FnOnce(&mut ManagerConfig),
) -> Option<TestCluster> {
    let nodes = start_storage_nodes(test_name, count).await?;

    let mut config = ManagerConfig::default();
    config.transport.connection_timeout_ms = 1000;
    config.transport.read_timeout_ms = 5000;
    config.transport.write_timeout_ms = 5000;
    config.nodes = nodes
        .iter()
        .map(TestNode::address)
        .chain(extra_nodes.iter().cloned())
        .map(|address| NodeEntry {
            address,
            name: None,
        })
        .collect();
    configure(&mut config);

    let server = ManagerServer::from_config(&config).expect("manager config");
    let manager = bound_or_skip(test_name, server.start("127.0.0.1:0").await)?;
    let client = ManagerClient::new(fast_transport(), manager.local_addr.clone());
    Some(TestCluster {
        nodes,
        server,
        manager,
        client,
    })
}

pub async fn start_cluster(test_name: &str, count: usize) -> Option<TestCluster> {
    start_cluster_with(test_name, count, &[], |_| {}).await
}

/// A node that answers every command after `delay`, with `reply`
pub async fn start_fake_node(
    test_name: &str,
    delay: Duration,
    reply: SimpleResult,
) -> Option<(String, tokio::task::JoinHandle<()>)> {
    let transport = fast_transport();
    let listener = bound_or_skip(test_name, transport.listen("127.0.0.1:0").await)?;
    let address = listener.local_addr().to_string();
    let task = tokio::spawn(async move {
        loop {
            let Ok(connection) = transport.accept(&listener).await else {
                continue;
            };
            let transport = Arc::clone(&transport);
            let reply = reply.clone();
            tokio::spawn(async move {
                if transport.receive(&connection).await.is_ok() {
                    tokio::time::sleep(delay).await;
                    let _ = transport.send(&connection, Message::result(reply)).await;
                }
                let _ = transport.close(connection).await;
            });
        }
    });
    Some((address, task))
}

/// A node that acknowledges every command and streams `chunks` for any scan.
/// `sent` counts chunks written. With `finish` unset the connection is dropped
/// after the last chunk instead of ending with a terminal frame.
pub async fn start_scripted_scan_node(
    test_name: &str,
    chunks: Vec<Vec<u8>>,
    finish: bool,
    sent: Arc<AtomicUsize>,
) -> Option<(String, tokio::task::JoinHandle<()>)> {
    let transport = fast_transport();
    let listener = bound_or_skip(test_name, transport.listen("127.0.0.1:0").await)?;
    let address = listener.local_addr().to_string();
    let task = tokio::spawn(async move {
        loop {
            let Ok(connection) = transport.accept(&listener).await else {
                continue;
            };
            let transport = Arc::clone(&transport);
            let chunks = chunks.clone();
            let sent = Arc::clone(&sent);
            tokio::spawn(async move {
                let Ok(message) = transport.receive(&connection).await else {
                    return;
                };
                match message.body {
                    MessageBody::Command(StorageCommand::SetScan { .. }) => {
                        let mut ended_by_peer = false;
                        for chunk in chunks {
                            if transport.send(&connection, Message::chunk(chunk)).await.is_err() {
                                return;
                            }
                            sent.fetch_add(1, Ordering::SeqCst);
                            match transport.receive(&connection).await {
                                Ok(Message {
                                    body: MessageBody::KeepGoing,
                                    ..
                                }) => continue,
                                _ => {
                                    ended_by_peer = true;
                                    break;
                                }
                            }
                        }
                        if finish && !ended_by_peer {
                            let _ = transport
                                .send(&connection, Message::done_with_result())
                                .await;
                        }
                    }
                    _ => {
                        let _ = transport
                            .send(&connection, Message::result(SimpleResult::ok()))
                            .await;
                    }
                }
                let _ = transport.close(connection).await;
            });
        }
    });
    Some((address, task))
}

/// Concatenate and split scanned pages back into records
pub fn decode_all(chunks: &[Vec<u8>]) -> Vec<Vec<u8>> {
    chunks
        .iter()
        .flat_map(|chunk| setmesh::core::storage::decode_records(chunk).expect("page"))
        .collect()
}
