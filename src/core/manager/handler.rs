// SPDX-License-Identifier: MIT OR Apache-2.0

// src/core/manager/handler.rs

//! Manager request handling: every command kind, and how its broadcast
//! outcome is reconciled with the catalog.

use crate::core::catalog::{set_key, Catalog, CatalogError};
use crate::core::cluster::NodeRegistry;
use crate::core::distributed::protocol::{
    ExportFormat, ManagerRequest, Message, MessageBody, SimpleResult, StorageCommand,
};
use crate::core::distributed::transport::{Connection, Transport};
use crate::core::distributed::{
    BroadcastCoordinator, BroadcastOutcome, DispatchTracker, DistributedResult,
    RoundRobinPlacement, ScanCoordinator, TargetMode,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Category recorded for types registered through the manager
const USER_TYPE_CATEGORY: &str = "user";

/// Turns one broadcast outcome into the client-facing result
fn summarize(outcome: &BroadcastOutcome) -> SimpleResult {
    if outcome.all_succeeded() {
        SimpleResult::ok()
    } else {
        SimpleResult::failure(outcome.failure_summary())
    }
}

fn without(nodes: Vec<String>, exclude: &[String]) -> Vec<String> {
    let exclude: HashSet<&str> = exclude.iter().map(String::as_str).collect();
    nodes
        .into_iter()
        .filter(|node| !exclude.contains(node.as_str()))
        .collect()
}

/// Handles manager requests. Collaborators are supplied by the caller.
pub struct RequestHandler {
    catalog: Catalog,
    registry: NodeRegistry,
    broadcaster: Arc<BroadcastCoordinator>,
    scanner: Arc<ScanCoordinator>,
    transport: Arc<dyn Transport>,
    dispatch: DispatchTracker,
    placement: RoundRobinPlacement,
}

impl RequestHandler {
    pub fn new(
        catalog: Catalog,
        registry: NodeRegistry,
        broadcaster: Arc<BroadcastCoordinator>,
        scanner: Arc<ScanCoordinator>,
        transport: Arc<dyn Transport>,
        dispatch: DispatchTracker,
    ) -> Self {
        RequestHandler {
            catalog,
            registry,
            broadcaster,
            scanner,
            transport,
            dispatch,
            placement: RoundRobinPlacement::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn dispatch_tracker(&self) -> &DispatchTracker {
        &self.dispatch
    }

    fn target_mode(&self) -> TargetMode {
        self.broadcaster.target_mode()
    }

    /// Serve one client connection: a single request, or a scan stream
    pub async fn handle_connection(&self, connection: Connection) -> DistributedResult<()> {
        let message = self.transport.receive(&connection).await?;
        match message.body {
            MessageBody::Request(ManagerRequest::SetScan { database, set }) => {
                log::info!("Request set-scan {}:{} from {}", database, set, connection.endpoint);
                self.scanner.serve(&connection, &database, &set).await;
            }
            MessageBody::Request(request) => {
                let reply = self.handle(request).await;
                self.transport
                    .send(&connection, Message::new(reply))
                    .await?;
            }
            other => {
                let reply =
                    SimpleResult::failure(format!("Expected a request, got {}", other.kind()));
                self.transport
                    .send(&connection, Message::result(reply))
                    .await?;
            }
        }
        self.transport.close(connection).await
    }

    /// Handle a request that has a single reply
    pub async fn handle(&self, request: ManagerRequest) -> MessageBody {
        let name = request.name();
        log::info!("Request {}", name);
        let result = match request {
            ManagerRequest::AddDatabase { database } => self.add_database(&database).await,
            ManagerRequest::AddSet {
                database,
                set,
                type_name,
                page_size,
            } => self.add_set(&database, &set, &type_name, page_size).await,
            ManagerRequest::AddTempSet {
                database,
                set,
                type_name,
                page_size,
            } => self.add_temp_set(&database, &set, &type_name, page_size).await,
            ManagerRequest::RemoveTempSet {
                database,
                set,
                type_name,
            } => self.remove_temp_set(&database, &set, &type_name).await,
            ManagerRequest::RemoveDatabase { database } => self.remove_database(&database).await,
            ManagerRequest::RemoveSet { database, set } => self.remove_set(&database, &set).await,
            ManagerRequest::ClearSet {
                database,
                set,
                type_name,
            } => self.clear_set(&database, &set, &type_name).await,
            ManagerRequest::ExportSet {
                database,
                set,
                output_path,
                format,
            } => self.export_set(&database, &set, &output_path, format).await,
            ManagerRequest::Cleanup => self.cleanup().await,
            ManagerRequest::DispatchData {
                database,
                set,
                records,
            } => self.dispatch_data(&database, &set, records).await,
            ManagerRequest::RegisterType { type_name } => {
                return match self.catalog.register_type(&type_name, USER_TYPE_CATEGORY) {
                    Ok(type_id) => MessageBody::TypeRegistered { type_id },
                    Err(e) => MessageBody::Result(SimpleResult::failure(e.to_string())),
                };
            }
            ManagerRequest::DescribeCatalog => {
                return match self.catalog.describe() {
                    Ok(text) => MessageBody::CatalogListing { text },
                    Err(e) => MessageBody::Result(SimpleResult::failure(e.to_string())),
                };
            }
            ManagerRequest::SetScan { .. } => Ok(SimpleResult::failure(
                "set-scan needs a streaming connection",
            )),
        };

        let reply = result.unwrap_or_else(|e| SimpleResult::failure(e.to_string()));
        if reply.success {
            log::info!("Request {} succeeded", name);
        } else {
            log::warn!("Request {} failed: {}", name, reply.error);
        }
        MessageBody::Result(reply)
    }

    /// Registered storage nodes, mirrored into the catalog so membership can
    /// reference them
    fn storage_targets(&self) -> DistributedResult<Vec<String>> {
        let nodes = self.registry.storage_nodes();
        for node in &nodes {
            self.catalog.register_node(node)?;
        }
        Ok(nodes.iter().map(|node| node.identity()).collect())
    }

    pub async fn add_database(&self, database: &str) -> DistributedResult<SimpleResult> {
        match self.catalog.create_database(database) {
            Ok(()) => {}
            Err(CatalogError::DatabaseExists { .. }) => {
                log::info!(
                    "Database {} already registered, skipping catalog registration",
                    database
                );
            }
            Err(e) => return Ok(SimpleResult::failure(e.to_string())),
        }

        let all = self.storage_targets()?;
        let targets = match self.target_mode() {
            TargetMode::All => all,
            TargetMode::Narrow => {
                without(all, &self.catalog.get_nodes_with_database(database)?)
            }
        };
        let command = StorageCommand::AddDatabase {
            database: database.to_string(),
        };
        let outcome = self.broadcaster.broadcast(&command, &targets).await;
        for node in &outcome.succeeded {
            self.catalog.add_node_to_database(node, database)?;
        }
        Ok(summarize(&outcome))
    }

    pub async fn add_set(
        &self,
        database: &str,
        set: &str,
        type_name: &str,
        page_size: u64,
    ) -> DistributedResult<SimpleResult> {
        let Some(set_type) = self.catalog.resolve_type(type_name)? else {
            return Ok(SimpleResult::failure(format!(
                "Could not identify type={}",
                type_name
            )));
        };

        if self.catalog.set_exists(database, set)? {
            log::info!(
                "Set {} already registered, skipping catalog registration",
                set_key(database, set)
            );
        } else if let Err(e) =
            self.catalog
                .create_set(set_type.id, &set_type.name, database, set, page_size)
        {
            return Ok(SimpleResult::failure(e.to_string()));
        }

        let all = self.storage_targets()?;
        let targets = match self.target_mode() {
            TargetMode::All => all,
            TargetMode::Narrow => without(all, &self.catalog.get_nodes_with_set(database, set)?),
        };
        let command = StorageCommand::AddSet {
            database: database.to_string(),
            set: set.to_string(),
            type_name: set_type.name.clone(),
            page_size,
        };
        let outcome = self.broadcaster.broadcast(&command, &targets).await;

        for node in &outcome.succeeded {
            self.catalog.add_node_to_set(node, database, set)?;
        }
        Ok(summarize(&outcome))
    }

    /// Create a set on every node without registering it in the catalog
    pub async fn add_temp_set(
        &self,
        database: &str,
        set: &str,
        type_name: &str,
        page_size: u64,
    ) -> DistributedResult<SimpleResult> {
        let command = StorageCommand::AddSet {
            database: database.to_string(),
            set: set.to_string(),
            type_name: type_name.to_string(),
            page_size,
        };
        let targets = self.storage_targets()?;
        Ok(summarize(&self.broadcaster.broadcast(&command, &targets).await))
    }

    pub async fn remove_temp_set(
        &self,
        database: &str,
        set: &str,
        type_name: &str,
    ) -> DistributedResult<SimpleResult> {
        let command = StorageCommand::RemoveSet {
            database: database.to_string(),
            set: set.to_string(),
            type_name: type_name.to_string(),
        };
        let targets = self.storage_targets()?;
        Ok(summarize(&self.broadcaster.broadcast(&command, &targets).await))
    }

    pub async fn remove_database(&self, database: &str) -> DistributedResult<SimpleResult> {
        if !self.catalog.database_exists(database)? {
            return Ok(SimpleResult::failure(format!(
                "Database {} does not exist",
                database
            )));
        }

        // creation acks plus set members, in every target mode
        let targets = self.catalog.get_nodes_with_database(database)?;
        let command = StorageCommand::RemoveDatabase {
            database: database.to_string(),
        };
        let outcome = self.broadcaster.broadcast(&command, &targets).await;

        if outcome.all_succeeded() {
            self.catalog.delete_database(database)?;
            return Ok(SimpleResult::ok());
        }

        log::warn!(
            "Failed to delete database {} on {} nodes. Skipping removal from catalog",
            database,
            outcome.failed.len()
        );
        for node in &outcome.succeeded {
            self.catalog.remove_node_from_database(node, database)?;
        }
        Ok(summarize(&outcome))
    }

    /// Remove a set from its member nodes. The catalog entry survives any
    /// failure, minus the nodes that did remove it, so a retry only targets
    /// the nodes that still hold it.
    pub async fn remove_set(&self, database: &str, set: &str) -> DistributedResult<SimpleResult> {
        let Some(record) = self.catalog.get_set(database, set)? else {
            return Ok(SimpleResult::failure(format!(
                "Set {} does not exist",
                set_key(database, set)
            )));
        };

        let command = StorageCommand::RemoveSet {
            database: database.to_string(),
            set: set.to_string(),
            type_name: record.type_name.clone(),
        };
        let outcome = self
            .broadcaster
            .broadcast(&command, &record.member_ids())
            .await;

        if outcome.all_succeeded() {
            self.catalog.delete_set(database, set)?;
            return Ok(SimpleResult::ok());
        }
        for node in &outcome.succeeded {
            self.catalog.remove_node_from_set(node, database, set)?;
        }
        Ok(summarize(&outcome))
    }

    pub async fn clear_set(
        &self,
        database: &str,
        set: &str,
        type_name: &str,
    ) -> DistributedResult<SimpleResult> {
        if !self.catalog.set_exists(database, set)? {
            return Ok(SimpleResult::failure(format!(
                "Set to clear with name={} doesn't exist",
                set_key(database, set)
            )));
        }

        let targets = match self.target_mode() {
            TargetMode::All => self.storage_targets()?,
            TargetMode::Narrow => self.catalog.get_nodes_with_set(database, set)?,
        };
        let command = StorageCommand::ClearSet {
            database: database.to_string(),
            set: set.to_string(),
            type_name: type_name.to_string(),
        };
        let outcome = self.broadcaster.broadcast(&command, &targets).await;
        if outcome.all_succeeded() {
            self.catalog.reset_set_statistics(database, set)?;
        }
        Ok(summarize(&outcome))
    }

    pub async fn export_set(
        &self,
        database: &str,
        set: &str,
        output_path: &str,
        format: ExportFormat,
    ) -> DistributedResult<SimpleResult> {
        let targets = match self.target_mode() {
            TargetMode::All => self.storage_targets()?,
            TargetMode::Narrow => self.catalog.get_nodes_with_set(database, set)?,
        };
        let command = StorageCommand::ExportSet {
            database: database.to_string(),
            set: set.to_string(),
            output_path: output_path.to_string(),
            format,
        };
        Ok(summarize(&self.broadcaster.broadcast(&command, &targets).await))
    }

    /// Flush every node once no data dispatch is in flight
    pub async fn cleanup(&self) -> DistributedResult<SimpleResult> {
        let in_flight = self.dispatch.in_flight();
        if in_flight > 0 {
            log::info!("Cleanup waiting for {} dispatch(es) to finish", in_flight);
        }
        self.dispatch.wait_idle().await;

        let targets = self.storage_targets()?;
        Ok(summarize(
            &self
                .broadcaster
                .broadcast(&StorageCommand::Cleanup, &targets)
                .await,
        ))
    }

    /// Spread records round-robin over the set's member nodes
    pub async fn dispatch_data(
        &self,
        database: &str,
        set: &str,
        records: Vec<Vec<u8>>,
    ) -> DistributedResult<SimpleResult> {
        let _guard = self.dispatch.begin();

        let Some(record) = self.catalog.get_set(database, set)? else {
            return Ok(SimpleResult::failure(format!(
                "Set {} does not exist",
                set_key(database, set)
            )));
        };
        let members = record.member_ids();
        if members.is_empty() {
            return Ok(SimpleResult::failure(format!(
                "Set {} has no storage nodes",
                record.key()
            )));
        }

        let shares = self.placement.assign(&record.key(), &members, records);
        let mut share_bytes = std::collections::HashMap::new();
        let jobs = shares
            .into_iter()
            .map(|(node, share)| {
                let bytes: u64 = share.iter().map(|r| r.len() as u64).sum();
                share_bytes.insert(node.clone(), bytes);
                let command = StorageCommand::AppendRecords {
                    database: database.to_string(),
                    set: set.to_string(),
                    records: share,
                };
                (node, command)
            })
            .collect();
        let outcome = self.broadcaster.scatter(jobs).await;

        let stored: u64 = outcome
            .succeeded
            .iter()
            .filter_map(|node| share_bytes.get(node))
            .sum();
        let pages = stored.div_ceil(record.page_size.max(1));
        self.catalog
            .update_set_statistics(database, set, pages, stored)?;
        Ok(summarize(&outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_preserves_order() {
        let nodes = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(without(nodes, &["b".to_string()]), vec!["a", "c"]);
    }

    #[test]
    fn test_summarize() {
        let ok = BroadcastOutcome {
            succeeded: vec!["a:1".to_string()],
            failed: vec![],
        };
        assert!(summarize(&ok).success);

        let partial = BroadcastOutcome {
            succeeded: vec!["a:1".to_string()],
            failed: vec![("b:2".to_string(), "boom".to_string())],
        };
        let reply = summarize(&partial);
        assert!(!reply.success);
        assert_eq!(reply.error, "b:2;");
    }
}
