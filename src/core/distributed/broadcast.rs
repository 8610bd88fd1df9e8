// SPDX-License-Identifier: MIT OR Apache-2.0

// src/core/distributed/broadcast.rs

//! Broadcast Coordinator
//!
//! Sends one [`StorageCommand`] to every target node concurrently and
//! partitions the targets into succeeded and failed. Each per-node task owns a
//! dedicated connection and reports exactly one `(node, outcome)` pair over a
//! fan-in channel; the consumer loop is the only writer of the outcome lists.
//!
//! A transport failure (connect, send, receive, timeout) is classified exactly
//! like a negative acknowledgement. Callers reconcile the catalog from the
//! returned [`BroadcastOutcome`].

use super::protocol::{Message, MessageBody, SimpleResult, StorageCommand};
use super::transport::{round_trip, Transport};
use super::{DistributedError, DistributedResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

/// How the manager chooses broadcast targets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    /// Every registered storage node
    #[default]
    All,
    /// Only nodes that still need the change
    Narrow,
}

impl FromStr for TargetMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(TargetMode::All),
            "narrow" => Ok(TargetMode::Narrow),
            other => Err(format!("Unknown broadcast target mode: {}", other)),
        }
    }
}

impl fmt::Display for TargetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetMode::All => write!(f, "all"),
            TargetMode::Narrow => write!(f, "narrow"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BroadcastConfig {
    pub target_mode: TargetMode,
    /// Upper bound on per-node exchanges running at once
    pub max_concurrency: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        BroadcastConfig {
            target_mode: TargetMode::All,
            max_concurrency: 64,
        }
    }
}

/// Classification of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Succeeded,
    Failed(String),
}

/// Aggregated result of one broadcast. Request-scoped, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub succeeded: Vec<String>,
    /// Failed node identity and its error string
    pub failed: Vec<(String, String)>,
}

impl BroadcastOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_nodes(&self) -> Vec<String> {
        self.failed.iter().map(|(node, _)| node.clone()).collect()
    }

    /// Failed node identities, each followed by `;`
    pub fn failure_summary(&self) -> String {
        self.failed
            .iter()
            .map(|(node, _)| format!("{};", node))
            .collect()
    }

    pub fn error_for(&self, node: &str) -> Option<&str> {
        self.failed
            .iter()
            .find(|(n, _)| n == node)
            .map(|(_, e)| e.as_str())
    }

    pub fn outcome_for(&self, node: &str) -> Option<NodeOutcome> {
        if self.succeeded.iter().any(|n| n == node) {
            return Some(NodeOutcome::Succeeded);
        }
        self.error_for(node)
            .map(|e| NodeOutcome::Failed(e.to_string()))
    }

    fn record(&mut self, node: String, outcome: NodeOutcome) {
        match outcome {
            NodeOutcome::Succeeded => self.succeeded.push(node),
            NodeOutcome::Failed(error) => self.failed.push((node, error)),
        }
    }
}

type Report = (String, DistributedResult<SimpleResult>);

/// Fans a command out to many storage nodes
pub struct BroadcastCoordinator {
    transport: Arc<dyn Transport>,
    limiter: Arc<Semaphore>,
    config: BroadcastConfig,
}

impl BroadcastCoordinator {
    pub fn new(transport: Arc<dyn Transport>, config: BroadcastConfig) -> Self {
        let permits = config.max_concurrency.max(1);
        BroadcastCoordinator {
            transport,
            limiter: Arc::new(Semaphore::new(permits)),
            config,
        }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    pub fn target_mode(&self) -> TargetMode {
        self.config.target_mode
    }

    /// Broadcast and return only the aggregated outcome
    pub async fn broadcast(
        &self,
        command: &StorageCommand,
        targets: &[String],
    ) -> BroadcastOutcome {
        self.broadcast_with(command, targets, |_, _| {}, |_, _| {})
            .await
    }

    /// Broadcast, invoking `on_ack` for every reply and `on_error` for every
    /// transport failure as they arrive.
    pub async fn broadcast_with<A, E>(
        &self,
        command: &StorageCommand,
        targets: &[String],
        on_ack: A,
        on_error: E,
    ) -> BroadcastOutcome
    where
        A: FnMut(&str, &SimpleResult),
        E: FnMut(&str, &DistributedError),
    {
        let jobs = targets
            .iter()
            .map(|node| (node.clone(), command.clone()))
            .collect();
        self.fan_out(command.name(), jobs, on_ack, on_error).await
    }

    /// Send a different command to each node, classified like a broadcast
    pub async fn scatter(&self, jobs: Vec<(String, StorageCommand)>) -> BroadcastOutcome {
        let name = jobs
            .first()
            .map(|(_, command)| command.name())
            .unwrap_or("scatter");
        self.fan_out(name, jobs, |_, _| {}, |_, _| {}).await
    }

    async fn fan_out<A, E>(
        &self,
        name: &str,
        jobs: Vec<(String, StorageCommand)>,
        mut on_ack: A,
        mut on_error: E,
    ) -> BroadcastOutcome
    where
        A: FnMut(&str, &SimpleResult),
        E: FnMut(&str, &DistributedError),
    {
        let mut seen = HashSet::new();
        let jobs: Vec<(String, StorageCommand)> = jobs
            .into_iter()
            .filter(|(node, _)| seen.insert(node.clone()))
            .collect();
        let targets: Vec<String> = jobs.iter().map(|(node, _)| node.clone()).collect();

        let mut outcome = BroadcastOutcome::default();
        if jobs.is_empty() {
            log::debug!("Broadcast {}: no target nodes", name);
            return outcome;
        }
        log::info!("Broadcast {} to {} node(s)", name, jobs.len());

        let (tx, mut rx) = mpsc::channel::<Report>(jobs.len());
        for (node, command) in jobs {
            let tx = tx.clone();
            let transport = Arc::clone(&self.transport);
            let limiter = Arc::clone(&self.limiter);
            tokio::spawn(async move {
                let _permit = limiter.acquire_owned().await.ok();
                let result = exchange(transport.as_ref(), &node, Message::command(command)).await;
                let _ = tx.send((node, result)).await;
            });
        }
        drop(tx);

        let mut reported = HashSet::new();
        while let Some((node, result)) = rx.recv().await {
            reported.insert(node.clone());
            let classified = match result {
                Ok(reply) => {
                    on_ack(&node, &reply);
                    if reply.success {
                        NodeOutcome::Succeeded
                    } else {
                        NodeOutcome::Failed(reply.error)
                    }
                }
                Err(e) => {
                    on_error(&node, &e);
                    NodeOutcome::Failed(e.to_string())
                }
            };
            if let NodeOutcome::Failed(error) = &classified {
                log::warn!("Broadcast {}: node {} failed: {}", name, node, error);
            }
            outcome.record(node, classified);
        }

        // A task that died before reporting still counts, as a failure.
        for node in targets {
            if !reported.contains(&node) {
                log::error!("Broadcast {}: node {} task ended without reporting", name, node);
                outcome.record(
                    node,
                    NodeOutcome::Failed("broadcast task ended without a result".to_string()),
                );
            }
        }

        log::info!(
            "Broadcast {} finished: {} succeeded, {} failed",
            name,
            outcome.succeeded.len(),
            outcome.failed.len()
        );
        outcome
    }
}

async fn exchange(
    transport: &dyn Transport,
    node: &str,
    message: Message,
) -> DistributedResult<SimpleResult> {
    let reply = round_trip(transport, node, message).await?;
    match reply.body {
        MessageBody::Result(result) => Ok(result),
        other => Err(DistributedError::protocol(format!(
            "Expected acknowledgement from {}, got {}",
            node,
            other.kind()
        ))),
    }
}
