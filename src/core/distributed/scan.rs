// SPDX-License-Identifier: MIT OR Apache-2.0

// src/core/distributed/scan.rs

//! Distributed Scan Coordinator
//!
//! Serves a set scan by visiting every node that holds the set, one at a time
//! in catalog membership order, and relaying each node's page stream to the
//! client byte-for-byte. At most one chunk is ever outstanding towards the
//! client: the next chunk is only requested from the node once the client's
//! keep-going has been forwarded.
//!
//! ```text
//! Discover -> NextNode -> Connect -> Stream <-> AwaitClient
//!                ^                      |           |
//!                +------- Drain <-------+-----------+
//!                           |
//!                          Done
//! ```
//!
//! A node that fails or disconnects mid-stream is treated as exhausted and the
//! scan moves on. A client that disconnects aborts the whole scan.

use super::protocol::{Message, MessageBody, SimpleResult, StorageCommand};
use super::transport::{Connection, Transport};
use crate::core::catalog::Catalog;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Terminate scans that lost a shard with a partial-result frame listing
    /// the failed nodes instead of the plain done frame
    pub report_partial_results: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Every member node was visited
    Completed,
    /// The client sent done before the data ran out
    EndedByClient,
    /// Discovery failed; nothing was streamed
    SetNotFound,
    /// The client went away mid-scan
    ClientDisconnected,
}

/// What happened during one scan, for logging by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub database: String,
    pub set: String,
    pub outcome: ScanOutcome,
    pub nodes_streamed: Vec<String>,
    pub failed_nodes: Vec<(String, String)>,
    pub chunks_forwarded: u64,
    pub bytes_forwarded: u64,
}

impl ScanReport {
    fn new(database: &str, set: &str) -> Self {
        ScanReport {
            database: database.to_string(),
            set: set.to_string(),
            outcome: ScanOutcome::Completed,
            nodes_streamed: Vec::new(),
            failed_nodes: Vec::new(),
            chunks_forwarded: 0,
            bytes_forwarded: 0,
        }
    }

    /// Some shard was lost along the way
    pub fn is_partial(&self) -> bool {
        !self.failed_nodes.is_empty()
    }
}

#[derive(Debug)]
struct NodeStream {
    node: String,
    connection: Connection,
}

#[derive(Debug)]
enum DrainReason {
    NodeExhausted,
    NodeFailed(String),
    ClientDone,
}

#[derive(Debug)]
enum ScanState {
    Discover,
    NextNode,
    Connect(String),
    /// Waiting for the node's next unit
    Stream(NodeStream),
    /// A chunk is with the client; waiting for its control message
    AwaitClient(NodeStream),
    Drain(NodeStream, DrainReason),
    Done,
    Failed(String),
    Aborted(String),
}

pub struct ScanCoordinator {
    catalog: Catalog,
    transport: Arc<dyn Transport>,
    config: ScanConfig,
}

impl ScanCoordinator {
    pub fn new(catalog: Catalog, transport: Arc<dyn Transport>, config: ScanConfig) -> Self {
        ScanCoordinator {
            catalog,
            transport,
            config,
        }
    }

    /// Run one scan to completion over an accepted client connection
    pub async fn serve(&self, client: &Connection, database: &str, set: &str) -> ScanReport {
        let mut session = ScanSession {
            coordinator: self,
            client,
            database,
            set,
            pending: VecDeque::new(),
            report: ScanReport::new(database, set),
        };
        session.run().await;

        let report = session.report;
        match report.outcome {
            ScanOutcome::SetNotFound => {}
            _ if report.is_partial() => log::warn!(
                "Scan {}:{} finished with {} failed node(s): {:?}",
                database,
                set,
                report.failed_nodes.len(),
                report.failed_nodes
            ),
            outcome => log::info!(
                "Scan {}:{} finished ({:?}): {} node(s), {} chunk(s), {} bytes",
                database,
                set,
                outcome,
                report.nodes_streamed.len(),
                report.chunks_forwarded,
                report.bytes_forwarded
            ),
        }
        report
    }
}

struct ScanSession<'a> {
    coordinator: &'a ScanCoordinator,
    client: &'a Connection,
    database: &'a str,
    set: &'a str,
    pending: VecDeque<String>,
    report: ScanReport,
}

impl<'a> ScanSession<'a> {
    fn transport(&self) -> &dyn Transport {
        self.coordinator.transport.as_ref()
    }

    async fn run(&mut self) {
        let mut state = ScanState::Discover;
        loop {
            state = match state {
                ScanState::Done => {
                    self.finish().await;
                    return;
                }
                ScanState::Failed(reason) => {
                    self.fail(reason).await;
                    return;
                }
                ScanState::Aborted(reason) => {
                    log::warn!(
                        "Scan {}:{} aborted: {}",
                        self.database,
                        self.set,
                        reason
                    );
                    self.report.outcome = ScanOutcome::ClientDisconnected;
                    return;
                }
                other => self.step(other).await,
            };
        }
    }

    async fn step(&mut self, state: ScanState) -> ScanState {
        match state {
            ScanState::Discover => self.discover(),
            ScanState::NextNode => match self.pending.pop_front() {
                Some(node) => ScanState::Connect(node),
                None => ScanState::Done,
            },
            ScanState::Connect(node) => self.connect(node).await,
            ScanState::Stream(stream) => self.stream(stream).await,
            ScanState::AwaitClient(stream) => self.await_client(stream).await,
            ScanState::Drain(stream, reason) => self.drain(stream, reason).await,
            terminal => terminal,
        }
    }

    fn discover(&mut self) -> ScanState {
        let coordinator = self.coordinator;
        let catalog = &coordinator.catalog;
        match catalog.set_exists(self.database, self.set) {
            Ok(true) => {}
            Ok(false) => {
                return ScanState::Failed(format!(
                    "Set {}:{} does not exist",
                    self.database, self.set
                ))
            }
            Err(e) => return ScanState::Failed(e.to_string()),
        }
        match catalog.get_nodes_with_set(self.database, self.set) {
            Ok(nodes) => {
                log::debug!(
                    "Scan {}:{} over {} node(s): {:?}",
                    self.database,
                    self.set,
                    nodes.len(),
                    nodes
                );
                self.pending = nodes.into();
                ScanState::NextNode
            }
            Err(e) => ScanState::Failed(e.to_string()),
        }
    }

    async fn connect(&mut self, node: String) -> ScanState {
        let connection = match self.transport().connect(&node).await {
            Ok(connection) => connection,
            Err(e) => {
                self.node_failed(node, e.to_string());
                return ScanState::NextNode;
            }
        };
        let request = Message::command(StorageCommand::SetScan {
            database: self.database.to_string(),
            set: self.set.to_string(),
        });
        let stream = NodeStream { node, connection };
        match self.transport().send(&stream.connection, request).await {
            Ok(()) => ScanState::Stream(stream),
            Err(e) => ScanState::Drain(stream, DrainReason::NodeFailed(e.to_string())),
        }
    }

    async fn stream(&mut self, stream: NodeStream) -> ScanState {
        let message = match self.transport().receive(&stream.connection).await {
            Ok(message) => message,
            Err(e) => return ScanState::Drain(stream, DrainReason::NodeFailed(e.to_string())),
        };
        match message.body {
            MessageBody::DataChunk { bytes } => {
                let len = bytes.len() as u64;
                if let Err(e) = self.transport().send(self.client, Message::chunk(bytes)).await {
                    self.release(stream).await;
                    return ScanState::Aborted(format!("failed to forward chunk: {}", e));
                }
                self.report.chunks_forwarded += 1;
                self.report.bytes_forwarded += len;
                ScanState::AwaitClient(stream)
            }
            MessageBody::DoneWithResult => ScanState::Drain(stream, DrainReason::NodeExhausted),
            MessageBody::Result(result) if !result.success => {
                ScanState::Drain(stream, DrainReason::NodeFailed(result.error))
            }
            other => ScanState::Drain(
                stream,
                DrainReason::NodeFailed(format!("unexpected {} frame", other.kind())),
            ),
        }
    }

    async fn await_client(&mut self, stream: NodeStream) -> ScanState {
        let control = match self.transport().receive(self.client).await {
            Ok(message) => message,
            Err(e) => {
                self.release(stream).await;
                return ScanState::Aborted(format!("client read failed: {}", e));
            }
        };
        match control.body {
            MessageBody::KeepGoing => {
                match self.transport().send(&stream.connection, Message::keep_going()).await {
                    Ok(()) => ScanState::Stream(stream),
                    Err(e) => ScanState::Drain(stream, DrainReason::NodeFailed(e.to_string())),
                }
            }
            MessageBody::Done => {
                if let Err(e) = self.transport().send(&stream.connection, Message::done()).await {
                    log::debug!("Scan: node {} gone before done: {}", stream.node, e);
                }
                ScanState::Drain(stream, DrainReason::ClientDone)
            }
            other => {
                self.release(stream).await;
                ScanState::Aborted(format!("unexpected {} control frame", other.kind()))
            }
        }
    }

    async fn drain(&mut self, stream: NodeStream, reason: DrainReason) -> ScanState {
        let node = stream.node.clone();
        self.release(stream).await;
        match reason {
            DrainReason::NodeExhausted => {
                self.report.nodes_streamed.push(node);
                ScanState::NextNode
            }
            DrainReason::NodeFailed(error) => {
                self.node_failed(node, error);
                ScanState::NextNode
            }
            DrainReason::ClientDone => {
                self.report.nodes_streamed.push(node);
                self.report.outcome = ScanOutcome::EndedByClient;
                ScanState::Done
            }
        }
    }

    async fn release(&self, stream: NodeStream) {
        if let Err(e) = self.transport().close(stream.connection).await {
            log::debug!("Scan: closing connection to {} failed: {}", stream.node, e);
        }
    }

    fn node_failed(&mut self, node: String, error: String) {
        log::warn!(
            "Scan {}:{}: node {} failed, treating shard as exhausted: {}",
            self.database,
            self.set,
            node,
            error
        );
        self.report.failed_nodes.push((node, error));
    }

    /// Exactly one terminal frame per scan
    async fn finish(&mut self) {
        let terminal = if self.coordinator.config.report_partial_results && self.report.is_partial()
        {
            Message::new(MessageBody::PartialResult {
                failed_nodes: self
                    .report
                    .failed_nodes
                    .iter()
                    .map(|(node, _)| node.clone())
                    .collect(),
            })
        } else {
            Message::done_with_result()
        };
        if let Err(e) = self.transport().send(self.client, terminal).await {
            log::warn!("Scan {}:{}: client gone before done: {}", self.database, self.set, e);
            self.report.outcome = ScanOutcome::ClientDisconnected;
        }
    }

    async fn fail(&mut self, reason: String) {
        log::warn!("Scan {}:{} rejected: {}", self.database, self.set, reason);
        self.report.outcome = ScanOutcome::SetNotFound;
        let reply = Message::result(SimpleResult::failure(reason));
        if let Err(e) = self.transport().send(self.client, reply).await {
            log::debug!("Scan: could not report failure to client: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_partial_flag() {
        let mut report = ScanReport::new("db", "s");
        assert!(!report.is_partial());
        assert_eq!(report.outcome, ScanOutcome::Completed);
        report
            .failed_nodes
            .push(("a:1".to_string(), "reset".to_string()));
        assert!(report.is_partial());
    }

    #[test]
    fn test_scan_config_default_is_silent_truncation() {
        assert!(!ScanConfig::default().report_partial_results);
    }
}
