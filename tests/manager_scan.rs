// SPDX-License-Identifier: MIT OR Apache-2.0

// Distributed scans through the manager

mod common;

use common::{decode_all, start_cluster, start_cluster_with, start_scripted_scan_node, TestCluster};
use setmesh::core::distributed::protocol::{ManagerRequest, Message, MessageBody};
use setmesh::core::distributed::{DistributedError, Transport};
use setmesh::core::manager::ScanEnd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

async fn load_set(cluster: &TestCluster, records: Vec<Vec<u8>>) {
    assert!(cluster.client.add_database("db").await.unwrap().success);
    let added = cluster.client.add_set("db", "s", "string", 48).await.unwrap();
    assert!(added.success, "{}", added.error);
    let dispatched = cluster
        .client
        .dispatch_data("db", "s", records)
        .await
        .unwrap();
    assert!(dispatched.success, "{}", dispatched.error);
}

fn records(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| format!("record-{i:03}").into_bytes())
        .collect()
}

#[tokio::test]
async fn test_scan_streams_nodes_in_membership_order() {
    let Some(cluster) = start_cluster("test_scan_streams_nodes_in_membership_order", 3).await
    else {
        return;
    };
    load_set(&cluster, records(30)).await;

    // expected: every page of every member, node by node in catalog order
    let members = cluster
        .server
        .handler()
        .catalog()
        .get_nodes_with_set("db", "s")
        .unwrap();
    assert_eq!(members.len(), 3);
    let mut expected = Vec::new();
    for member in &members {
        let node = cluster
            .nodes
            .iter()
            .find(|n| &n.address() == member)
            .unwrap();
        expected.extend(node.node.pages("db", "s").await.unwrap());
    }

    let mut reader = cluster.client.scan("db", "s").await.unwrap();
    let chunks = reader.collect().await.unwrap();
    assert_eq!(reader.end(), Some(&ScanEnd::Complete));
    assert_eq!(chunks, expected);

    let mut scanned = decode_all(&chunks);
    scanned.sort();
    assert_eq!(scanned, records(30));

    // the terminal frame was the last one
    assert_eq!(reader.next_chunk().await.unwrap(), None);
}

#[tokio::test]
async fn test_scan_ended_early_by_client() {
    let Some(cluster) = start_cluster("test_scan_ended_early_by_client", 2).await else {
        return;
    };
    load_set(&cluster, records(40)).await;

    let mut reader = cluster.client.scan("db", "s").await.unwrap();
    let first = reader.next_chunk().await.unwrap();
    assert!(first.is_some());
    assert_eq!(reader.finish_early().await.unwrap(), ScanEnd::Complete);
    assert_eq!(reader.next_chunk().await.unwrap(), None);

    // the manager is still serving
    let again = cluster.client.scan("db", "s").await.unwrap().collect().await;
    assert_eq!(decode_all(&again.unwrap()).len(), 40);
}

#[tokio::test]
async fn test_scan_of_missing_set_fails_without_stream() {
    let Some(cluster) = start_cluster("test_scan_of_missing_set_fails_without_stream", 1).await
    else {
        return;
    };

    let mut reader = cluster.client.scan("db", "nothing").await.unwrap();
    match reader.next_chunk().await {
        Err(DistributedError::RemoteError { message }) => {
            assert!(message.contains("db:nothing"), "{message}");
        }
        other => panic!("expected a remote failure, got {other:?}"),
    }
    assert_eq!(reader.end(), None);
}

#[tokio::test]
async fn test_scan_forwards_one_chunk_per_keep_going() {
    let test_name = "test_scan_forwards_one_chunk_per_keep_going";
    let sent = Arc::new(AtomicUsize::new(0));
    let chunks = vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()];
    let Some((address, node_task)) =
        start_scripted_scan_node(test_name, chunks.clone(), true, Arc::clone(&sent)).await
    else {
        return;
    };
    let Some(cluster) = start_cluster_with(test_name, 0, &[address], |_| {}).await else {
        return;
    };
    assert!(cluster.client.add_database("db").await.unwrap().success);
    assert!(cluster
        .client
        .add_set("db", "s", "bytes", 64)
        .await
        .unwrap()
        .success);

    let transport = common::fast_transport();
    let connection = transport.connect(&cluster.manager.local_addr).await.unwrap();
    transport
        .send(
            &connection,
            Message::request(ManagerRequest::SetScan {
                database: "db".to_string(),
                set: "s".to_string(),
            }),
        )
        .await
        .unwrap();

    for (i, expected) in chunks.iter().enumerate() {
        let message = transport.receive(&connection).await.unwrap();
        assert_eq!(
            message.body,
            MessageBody::DataChunk {
                bytes: expected.clone()
            }
        );
        // nothing more is pulled from the node until the client answers
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sent.load(Ordering::SeqCst), i + 1);
        transport
            .send(&connection, Message::keep_going())
            .await
            .unwrap();
    }

    let terminal = transport.receive(&connection).await.unwrap();
    assert_eq!(terminal.body, MessageBody::DoneWithResult);
    // exactly one terminal frame, then the manager hangs up
    assert!(transport.receive(&connection).await.is_err());

    node_task.abort();
}

#[tokio::test]
async fn test_client_done_still_gets_terminal_frame() {
    let test_name = "test_client_done_still_gets_terminal_frame";
    let sent = Arc::new(AtomicUsize::new(0));
    let chunks = vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];
    let Some((address, node_task)) =
        start_scripted_scan_node(test_name, chunks, true, Arc::clone(&sent)).await
    else {
        return;
    };
    let Some(cluster) = start_cluster_with(test_name, 0, &[address], |_| {}).await else {
        return;
    };
    assert!(cluster.client.add_database("db").await.unwrap().success);
    assert!(cluster
        .client
        .add_set("db", "s", "bytes", 64)
        .await
        .unwrap()
        .success);

    let transport = common::fast_transport();
    let connection = transport.connect(&cluster.manager.local_addr).await.unwrap();
    transport
        .send(
            &connection,
            Message::request(ManagerRequest::SetScan {
                database: "db".to_string(),
                set: "s".to_string(),
            }),
        )
        .await
        .unwrap();

    let first = transport.receive(&connection).await.unwrap();
    assert!(matches!(first.body, MessageBody::DataChunk { .. }));
    transport.send(&connection, Message::done()).await.unwrap();

    let terminal = transport.receive(&connection).await.unwrap();
    assert_eq!(terminal.body, MessageBody::DoneWithResult);
    assert_eq!(sent.load(Ordering::SeqCst), 1);

    node_task.abort();
}

#[tokio::test]
async fn test_failed_node_truncates_scan_silently_by_default() {
    let test_name = "test_failed_node_truncates_scan_silently_by_default";
    let sent = Arc::new(AtomicUsize::new(0));
    let Some((flaky, node_task)) =
        start_scripted_scan_node(test_name, vec![b"lost".to_vec()], false, sent).await
    else {
        return;
    };
    let Some(cluster) = start_cluster_with(test_name, 2, &[flaky], |_| {}).await else {
        return;
    };
    load_set(&cluster, records(12)).await;

    let mut reader = cluster.client.scan("db", "s").await.unwrap();
    let chunks = reader.collect().await.unwrap();
    assert_eq!(reader.end(), Some(&ScanEnd::Complete));

    // real pages from both healthy nodes plus whatever the flaky node sent
    let real: Vec<Vec<u8>> = chunks
        .iter()
        .filter(|chunk| chunk.as_slice() != b"lost")
        .cloned()
        .collect();
    assert_eq!(decode_all(&real).len(), 8);

    node_task.abort();
}

#[tokio::test]
async fn test_failed_node_reported_when_partial_results_enabled() {
    let test_name = "test_failed_node_reported_when_partial_results_enabled";
    let sent = Arc::new(AtomicUsize::new(0));
    let Some((flaky, node_task)) =
        start_scripted_scan_node(test_name, vec![b"lost".to_vec()], false, sent).await
    else {
        return;
    };
    let Some(cluster) = start_cluster_with(test_name, 1, &[flaky.clone()], |config| {
        config.scan.report_partial_results = true
    })
    .await
    else {
        return;
    };
    load_set(&cluster, records(6)).await;

    let mut reader = cluster.client.scan("db", "s").await.unwrap();
    reader.collect().await.unwrap();
    assert_eq!(reader.end(), Some(&ScanEnd::Partial(vec![flaky])));

    node_task.abort();
}

#[tokio::test]
async fn test_client_disconnect_mid_scan_leaves_manager_serving() {
    let Some(cluster) =
        start_cluster("test_client_disconnect_mid_scan_leaves_manager_serving", 2).await
    else {
        return;
    };
    load_set(&cluster, records(20)).await;

    {
        let mut reader = cluster.client.scan("db", "s").await.unwrap();
        assert!(reader.next_chunk().await.unwrap().is_some());
        // dropped without answering
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let chunks = cluster
        .client
        .scan("db", "s")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(decode_all(&chunks).len(), 20);
}
