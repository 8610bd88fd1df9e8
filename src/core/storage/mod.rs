// SPDX-License-Identifier: MIT OR Apache-2.0

// src/core/storage/mod.rs

//! Storage Node Agent
//!
//! In-memory storage node that answers the manager's broadcast commands and
//! serves scans one page per chunk, waiting for the peer's flow-control reply
//! between chunks.

pub mod page;

pub use page::{decode_records, Page, PageAppend};

use crate::core::distributed::protocol::{
    ExportFormat, Message, MessageBody, SimpleResult, StorageCommand,
};
use crate::core::distributed::transport::{Connection, Listener, Transport};
use crate::core::distributed::{DistributedError, DistributedResult};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct StoredSet {
    type_name: String,
    page_size: usize,
    sealed: Vec<Page>,
    open: Option<Page>,
}

impl StoredSet {
    fn new(type_name: &str, page_size: u64) -> Self {
        StoredSet {
            type_name: type_name.to_string(),
            page_size: page_size.max(1) as usize,
            sealed: Vec::new(),
            open: None,
        }
    }

    /// Append records, sealing pages as they fill. Returns bytes written.
    /// A batch holding any record too large for a page is rejected whole.
    fn append(&mut self, records: &[Vec<u8>]) -> Result<u64, String> {
        let limit = Page::max_record_len(self.page_size);
        if let Some(record) = records.iter().find(|record| record.len() > limit) {
            return Err(format!(
                "Record of {} bytes does not fit page size {}",
                record.len(),
                self.page_size
            ));
        }

        let mut written = 0u64;
        for record in records {
            loop {
                let page_size = self.page_size;
                let open = self.open.get_or_insert_with(|| Page::new(page_size));
                match open.try_append(record) {
                    PageAppend::Appended => {
                        written += record.len() as u64;
                        break;
                    }
                    PageAppend::PageFull => self.seal(),
                    PageAppend::RecordTooLarge => {
                        return Err(format!(
                            "Record of {} bytes does not fit page size {}",
                            record.len(),
                            self.page_size
                        ))
                    }
                }
            }
        }
        Ok(written)
    }

    fn seal(&mut self) {
        if let Some(page) = self.open.take() {
            if !page.is_empty() {
                self.sealed.push(page);
            }
        }
    }

    fn clear(&mut self) {
        self.sealed.clear();
        self.open = None;
    }

    /// Page bytes in storage order, open page last
    fn snapshot(&self) -> Vec<Vec<u8>> {
        self.sealed
            .iter()
            .chain(self.open.iter())
            .filter(|page| !page.is_empty())
            .map(|page| page.as_bytes().to_vec())
            .collect()
    }
}

#[derive(Debug, Default)]
struct NodeState {
    databases: BTreeSet<String>,
    sets: HashMap<(String, String), StoredSet>,
}

/// Reference storage node
pub struct StorageNode {
    name: String,
    transport: Arc<dyn Transport>,
    state: RwLock<NodeState>,
    maintenance: AtomicBool,
}

/// Running storage node; dropping the handle leaves the node running
pub struct StorageNodeHandle {
    pub local_addr: String,
    task: JoinHandle<()>,
}

impl StorageNodeHandle {
    /// Stop accepting connections. In-flight exchanges are cut off.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl StorageNode {
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(StorageNode {
            name: name.into(),
            transport,
            state: RwLock::new(NodeState::default()),
            maintenance: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// In maintenance mode every mutating command is rejected
    pub fn set_maintenance(&self, enabled: bool) {
        log::info!("Storage node {} maintenance mode: {}", self.name, enabled);
        self.maintenance.store(enabled, Ordering::SeqCst);
    }

    pub async fn has_database(&self, database: &str) -> bool {
        self.state.read().await.databases.contains(database)
    }

    pub async fn has_set(&self, database: &str, set: &str) -> bool {
        self.state
            .read()
            .await
            .sets
            .contains_key(&(database.to_string(), set.to_string()))
    }

    /// Page bytes currently held for a set, `None` if the set is absent
    pub async fn pages(&self, database: &str, set: &str) -> Option<Vec<Vec<u8>>> {
        self.state
            .read()
            .await
            .sets
            .get(&(database.to_string(), set.to_string()))
            .map(StoredSet::snapshot)
    }

    /// Bind and serve in the background
    pub async fn start(self: &Arc<Self>, endpoint: &str) -> DistributedResult<StorageNodeHandle> {
        let listener = self.transport.listen(endpoint).await?;
        let local_addr = listener.local_addr().to_string();
        log::info!("Storage node {} listening on {}", self.name, local_addr);
        let node = Arc::clone(self);
        let task = tokio::spawn(async move { node.serve(listener).await });
        Ok(StorageNodeHandle { local_addr, task })
    }

    pub async fn serve(self: Arc<Self>, listener: Listener) {
        loop {
            match self.transport.accept(&listener).await {
                Ok(connection) => {
                    let node = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = node.handle_connection(connection).await {
                            log::warn!("Storage node {}: connection error: {}", node.name, e);
                        }
                    });
                }
                Err(e) => {
                    log::error!("Storage node {}: accept failed: {}", self.name, e);
                    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
                }
            }
        }
    }

    async fn handle_connection(&self, connection: Connection) -> DistributedResult<()> {
        let message = self.transport.receive(&connection).await?;
        let result = match message.body {
            MessageBody::Command(StorageCommand::SetScan { database, set }) => {
                self.serve_scan(&connection, &database, &set).await
            }
            MessageBody::Command(command) => {
                let reply = self.execute(command).await;
                self.transport
                    .send(&connection, Message::result(reply))
                    .await
            }
            other => {
                let reply =
                    SimpleResult::failure(format!("Unexpected {} message", other.kind()));
                self.transport
                    .send(&connection, Message::result(reply))
                    .await
            }
        };
        self.transport.close(connection).await?;
        result
    }

    /// Apply one command to local state
    pub async fn execute(&self, command: StorageCommand) -> SimpleResult {
        let name = command.name();
        if command.is_mutation() && self.maintenance.load(Ordering::SeqCst) {
            log::warn!("Storage node {} rejected {}: maintenance mode", self.name, name);
            return SimpleResult::failure(format!("Node {} is in maintenance mode", self.name));
        }

        let outcome = match command {
            StorageCommand::AddDatabase { database } => {
                self.state.write().await.databases.insert(database);
                Ok(())
            }
            StorageCommand::AddSet {
                database,
                set,
                type_name,
                page_size,
            } => {
                let mut state = self.state.write().await;
                state.databases.insert(database.clone());
                state
                    .sets
                    .entry((database, set))
                    .or_insert_with(|| StoredSet::new(&type_name, page_size));
                Ok(())
            }
            StorageCommand::RemoveDatabase { database } => {
                let mut state = self.state.write().await;
                state.databases.remove(&database);
                state.sets.retain(|(db, _), _| db != &database);
                Ok(())
            }
            StorageCommand::RemoveSet { database, set, .. } => {
                self.state.write().await.sets.remove(&(database, set));
                Ok(())
            }
            StorageCommand::ClearSet { database, set, .. } => {
                // nothing to clear on a node that never got the set
                if let Some(stored) = self.state.write().await.sets.get_mut(&(database, set)) {
                    stored.clear();
                }
                Ok(())
            }
            StorageCommand::ExportSet {
                database,
                set,
                output_path,
                format,
            } => self.export(&database, &set, &output_path, format).await,
            StorageCommand::Cleanup => {
                let mut state = self.state.write().await;
                for stored in state.sets.values_mut() {
                    stored.seal();
                }
                Ok(())
            }
            StorageCommand::AppendRecords {
                database,
                set,
                records,
            } => {
                let mut state = self.state.write().await;
                match state.sets.get_mut(&(database.clone(), set.clone())) {
                    Some(stored) => stored.append(&records).map(|bytes| {
                        log::debug!(
                            "Storage node {}: appended {} records ({} bytes) to {}:{}",
                            self.name,
                            records.len(),
                            bytes,
                            database,
                            set
                        );
                    }),
                    None => Err(format!(
                        "Set {}:{} not found on node {}",
                        database, set, self.name
                    )),
                }
            }
            StorageCommand::SetScan { .. } => {
                Err("Scans must be served on their own connection".to_string())
            }
        };

        match outcome {
            Ok(()) => {
                log::debug!("Storage node {}: {} ok", self.name, name);
                SimpleResult::ok()
            }
            Err(e) => {
                log::warn!("Storage node {}: {} failed: {}", self.name, name, e);
                SimpleResult::failure(e)
            }
        }
    }

    async fn export(
        &self,
        database: &str,
        set: &str,
        output_path: &str,
        format: ExportFormat,
    ) -> Result<(), String> {
        let (type_name, pages) = {
            let state = self.state.read().await;
            match state.sets.get(&(database.to_string(), set.to_string())) {
                Some(stored) => (stored.type_name.clone(), stored.snapshot()),
                None => {
                    return Err(format!(
                        "Set {}:{} not found on node {}",
                        database, set, self.name
                    ))
                }
            }
        };

        let path = self.export_file(output_path, database, set, format);
        let contents = match format {
            ExportFormat::Raw => pages.concat(),
            ExportFormat::Json => {
                let mut decoded = Vec::with_capacity(pages.len());
                for page in &pages {
                    let records: Vec<String> = decode_records(page)?
                        .iter()
                        .map(|r| String::from_utf8_lossy(r).into_owned())
                        .collect();
                    decoded.push(records);
                }
                let document = serde_json::json!({
                    "node": self.name,
                    "database": database,
                    "set": set,
                    "type": type_name,
                    "pages": decoded,
                });
                serde_json::to_vec_pretty(&document).map_err(|e| e.to_string())?
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&path, contents).map_err(|e| e.to_string())?;
        log::info!(
            "Storage node {} exported {}:{} to {}",
            self.name,
            database,
            set,
            path.display()
        );
        Ok(())
    }

    fn export_file(
        &self,
        output_path: &str,
        database: &str,
        set: &str,
        format: ExportFormat,
    ) -> PathBuf {
        let node: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        Path::new(output_path).join(format!("{}.{}.{}.{}", database, set, node, format.extension()))
    }

    async fn serve_scan(
        &self,
        connection: &Connection,
        database: &str,
        set: &str,
    ) -> DistributedResult<()> {
        let Some(pages) = self.pages(database, set).await else {
            let reply = SimpleResult::failure(format!(
                "Set {}:{} not found on node {}",
                database, set, self.name
            ));
            return self.transport.send(connection, Message::result(reply)).await;
        };

        log::debug!(
            "Storage node {}: scanning {}:{} ({} pages)",
            self.name,
            database,
            set,
            pages.len()
        );
        for page in pages {
            self.transport.send(connection, Message::chunk(page)).await?;
            match self.transport.receive(connection).await?.body {
                MessageBody::KeepGoing => continue,
                MessageBody::Done => {
                    log::debug!(
                        "Storage node {}: scan of {}:{} ended early",
                        self.name,
                        database,
                        set
                    );
                    return Ok(());
                }
                other => {
                    return Err(DistributedError::protocol(format!(
                        "Expected keep-going or done during scan, got {}",
                        other.kind()
                    )))
                }
            }
        }
        self.transport
            .send(connection, Message::done_with_result())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::distributed::transport::TcpTransport;

    fn node() -> Arc<StorageNode> {
        StorageNode::new("node-1", Arc::new(TcpTransport::new()))
    }

    fn add_set(page_size: u64) -> StorageCommand {
        StorageCommand::AddSet {
            database: "db".to_string(),
            set: "s".to_string(),
            type_name: "bytes".to_string(),
            page_size,
        }
    }

    fn append(records: &[&[u8]]) -> StorageCommand {
        StorageCommand::AppendRecords {
            database: "db".to_string(),
            set: "s".to_string(),
            records: records.iter().map(|r| r.to_vec()).collect(),
        }
    }

    #[tokio::test]
    async fn test_append_seals_full_pages() {
        let node = node();
        assert!(node.execute(add_set(16)).await.success);
        assert!(node.execute(append(&[b"aaaa", b"bbbb", b"cccc"])).await.success);

        let pages = node.pages("db", "s").await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(decode_records(&pages[0]).unwrap().len(), 2);
        assert_eq!(decode_records(&pages[1]).unwrap(), vec![b"cccc".to_vec()]);
    }

    #[tokio::test]
    async fn test_oversized_record_is_rejected() {
        let node = node();
        node.execute(add_set(8)).await;
        let reply = node.execute(append(&[b"too large"])).await;
        assert!(!reply.success);
        assert!(reply.error.contains("does not fit"));
    }

    #[tokio::test]
    async fn test_batch_with_oversized_record_stores_nothing() {
        let node = node();
        assert!(node.execute(add_set(32)).await.success);
        let oversized = vec![b'z'; 100];
        let reply = node
            .execute(append(&[b"ok-1", b"ok-2", oversized.as_slice()]))
            .await;
        assert!(!reply.success);
        assert!(node.pages("db", "s").await.unwrap().is_empty());

        // the set still takes a valid batch afterwards
        assert!(node.execute(append(&[b"ok-3"])).await.success);
        let pages = node.pages("db", "s").await.unwrap();
        assert_eq!(decode_records(&pages[0]).unwrap(), vec![b"ok-3".to_vec()]);
    }

    #[tokio::test]
    async fn test_clear_and_remove() {
        let node = node();
        node.execute(add_set(64)).await;
        node.execute(append(&[b"x"])).await;

        let clear = StorageCommand::ClearSet {
            database: "db".to_string(),
            set: "s".to_string(),
            type_name: "bytes".to_string(),
        };
        assert!(node.execute(clear.clone()).await.success);
        assert_eq!(node.pages("db", "s").await.unwrap().len(), 0);

        let remove_db = StorageCommand::RemoveDatabase {
            database: "db".to_string(),
        };
        assert!(node.execute(remove_db.clone()).await.success);
        assert!(!node.has_set("db", "s").await);
        assert!(!node.has_database("db").await);
        // removal and clearing are both idempotent
        assert!(node.execute(remove_db).await.success);
        assert!(node.execute(clear).await.success);
    }

    #[tokio::test]
    async fn test_maintenance_mode_rejects_mutations() {
        let node = node();
        node.set_maintenance(true);
        let reply = node
            .execute(StorageCommand::AddDatabase {
                database: "db".to_string(),
            })
            .await;
        assert!(!reply.success);
        assert!(reply.error.contains("maintenance"));
        node.set_maintenance(false);
        assert!(node.execute(add_set(64)).await.success);
        assert!(node.has_database("db").await);
    }

    #[tokio::test]
    async fn test_export_json() {
        let dir = tempfile::tempdir().unwrap();
        let node = node();
        node.execute(add_set(64)).await;
        node.execute(append(&[b"alice", b"bob"])).await;

        let reply = node
            .execute(StorageCommand::ExportSet {
                database: "db".to_string(),
                set: "s".to_string(),
                output_path: dir.path().to_string_lossy().into_owned(),
                format: ExportFormat::Json,
            })
            .await;
        assert!(reply.success, "{}", reply.error);

        let file = dir.path().join("db.s.node-1.json");
        let document: serde_json::Value =
            serde_json::from_slice(&std::fs::read(file).unwrap()).unwrap();
        assert_eq!(document["pages"][0][1], "bob");
        assert_eq!(document["type"], "bytes");
    }

    #[tokio::test]
    async fn test_cleanup_seals_open_pages() {
        let node = node();
        node.execute(add_set(64)).await;
        node.execute(append(&[b"a"])).await;
        assert!(node.execute(StorageCommand::Cleanup).await.success);
        node.execute(append(&[b"b"])).await;
        // sealed page plus a fresh open page
        assert_eq!(node.pages("db", "s").await.unwrap().len(), 2);
    }
}
