// SPDX-License-Identifier: MIT OR Apache-2.0

// src/core/manager/client.rs

//! Typed client for the manager. Every call opens its own connection.

use crate::core::distributed::protocol::{
    ExportFormat, ManagerRequest, Message, MessageBody, SimpleResult,
};
use crate::core::distributed::transport::{round_trip, Connection, Transport};
use crate::core::distributed::{DistributedError, DistributedResult};
use std::sync::Arc;

pub struct ManagerClient {
    transport: Arc<dyn Transport>,
    endpoint: String,
}

impl ManagerClient {
    pub fn new(transport: Arc<dyn Transport>, endpoint: impl Into<String>) -> Self {
        ManagerClient {
            transport,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, request: ManagerRequest) -> DistributedResult<MessageBody> {
        let reply = round_trip(
            self.transport.as_ref(),
            &self.endpoint,
            Message::request(request),
        )
        .await?;
        Ok(reply.body)
    }

    async fn simple(&self, request: ManagerRequest) -> DistributedResult<SimpleResult> {
        match self.request(request).await? {
            MessageBody::Result(result) => Ok(result),
            other => Err(DistributedError::protocol(format!(
                "Expected a result, got {}",
                other.kind()
            ))),
        }
    }

    pub async fn add_database(&self, database: &str) -> DistributedResult<SimpleResult> {
        self.simple(ManagerRequest::AddDatabase {
            database: database.to_string(),
        })
        .await
    }

    pub async fn add_set(
        &self,
        database: &str,
        set: &str,
        type_name: &str,
        page_size: u64,
    ) -> DistributedResult<SimpleResult> {
        self.simple(ManagerRequest::AddSet {
            database: database.to_string(),
            set: set.to_string(),
            type_name: type_name.to_string(),
            page_size,
        })
        .await
    }

    pub async fn add_temp_set(
        &self,
        database: &str,
        set: &str,
        type_name: &str,
        page_size: u64,
    ) -> DistributedResult<SimpleResult> {
        self.simple(ManagerRequest::AddTempSet {
            database: database.to_string(),
            set: set.to_string(),
            type_name: type_name.to_string(),
            page_size,
        })
        .await
    }

    pub async fn remove_temp_set(
        &self,
        database: &str,
        set: &str,
        type_name: &str,
    ) -> DistributedResult<SimpleResult> {
        self.simple(ManagerRequest::RemoveTempSet {
            database: database.to_string(),
            set: set.to_string(),
            type_name: type_name.to_string(),
        })
        .await
    }

    pub async fn remove_database(&self, database: &str) -> DistributedResult<SimpleResult> {
        self.simple(ManagerRequest::RemoveDatabase {
            database: database.to_string(),
        })
        .await
    }

    pub async fn remove_set(&self, database: &str, set: &str) -> DistributedResult<SimpleResult> {
        self.simple(ManagerRequest::RemoveSet {
            database: database.to_string(),
            set: set.to_string(),
        })
        .await
    }

    pub async fn clear_set(
        &self,
        database: &str,
        set: &str,
        type_name: &str,
    ) -> DistributedResult<SimpleResult> {
        self.simple(ManagerRequest::ClearSet {
            database: database.to_string(),
            set: set.to_string(),
            type_name: type_name.to_string(),
        })
        .await
    }

    pub async fn export_set(
        &self,
        database: &str,
        set: &str,
        output_path: &str,
        format: ExportFormat,
    ) -> DistributedResult<SimpleResult> {
        self.simple(ManagerRequest::ExportSet {
            database: database.to_string(),
            set: set.to_string(),
            output_path: output_path.to_string(),
            format,
        })
        .await
    }

    pub async fn cleanup(&self) -> DistributedResult<SimpleResult> {
        self.simple(ManagerRequest::Cleanup).await
    }

    pub async fn dispatch_data(
        &self,
        database: &str,
        set: &str,
        records: Vec<Vec<u8>>,
    ) -> DistributedResult<SimpleResult> {
        self.simple(ManagerRequest::DispatchData {
            database: database.to_string(),
            set: set.to_string(),
            records,
        })
        .await
    }

    /// Register a user type and return its id
    pub async fn register_type(&self, type_name: &str) -> DistributedResult<u32> {
        match self
            .request(ManagerRequest::RegisterType {
                type_name: type_name.to_string(),
            })
            .await?
        {
            MessageBody::TypeRegistered { type_id } => Ok(type_id),
            MessageBody::Result(result) => Err(DistributedError::RemoteError {
                message: result.error,
            }),
            other => Err(DistributedError::protocol(format!(
                "Expected a type id, got {}",
                other.kind()
            ))),
        }
    }

    pub async fn describe_catalog(&self) -> DistributedResult<String> {
        match self.request(ManagerRequest::DescribeCatalog).await? {
            MessageBody::CatalogListing { text } => Ok(text),
            MessageBody::Result(result) => Err(DistributedError::RemoteError {
                message: result.error,
            }),
            other => Err(DistributedError::protocol(format!(
                "Expected a catalog listing, got {}",
                other.kind()
            ))),
        }
    }

    /// Open a scan over `database:set`
    pub async fn scan(&self, database: &str, set: &str) -> DistributedResult<SetScanReader> {
        let connection = self.transport.connect(&self.endpoint).await?;
        let request = Message::request(ManagerRequest::SetScan {
            database: database.to_string(),
            set: set.to_string(),
        });
        if let Err(e) = self.transport.send(&connection, request).await {
            let _ = self.transport.close(connection).await;
            return Err(e);
        }
        Ok(SetScanReader {
            transport: Arc::clone(&self.transport),
            connection: Some(connection),
            awaiting_control: false,
            end: None,
        })
    }
}

/// How a scan stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEnd {
    Complete,
    /// Shards on these nodes were lost mid-scan
    Partial(Vec<String>),
}

/// Client side of a scan. Each chunk must be answered before the next one is
/// sent, which `next_chunk` does implicitly.
pub struct SetScanReader {
    transport: Arc<dyn Transport>,
    connection: Option<Connection>,
    /// A chunk was received and the manager is waiting for keep-going or done
    awaiting_control: bool,
    end: Option<ScanEnd>,
}

impl SetScanReader {
    /// Next page of the scan, `None` once the terminal frame arrives
    pub async fn next_chunk(&mut self) -> DistributedResult<Option<Vec<u8>>> {
        let Some(connection) = self.connection.as_ref() else {
            return Ok(None);
        };
        if self.awaiting_control {
            self.transport.send(connection, Message::keep_going()).await?;
            self.awaiting_control = false;
        }
        let message = self.transport.receive(connection).await?;
        self.accept(message.body).await
    }

    /// Stop the scan. Pages already in flight are discarded.
    pub async fn finish_early(&mut self) -> DistributedResult<ScanEnd> {
        while self.end.is_none() {
            let Some(connection) = self.connection.as_ref() else {
                break;
            };
            if self.awaiting_control {
                self.transport.send(connection, Message::done()).await?;
                self.awaiting_control = false;
            }
            let message = self.transport.receive(connection).await?;
            self.accept(message.body).await?;
        }
        Ok(self.end.clone().unwrap_or(ScanEnd::Complete))
    }

    /// Read the remaining pages
    pub async fn collect(&mut self) -> DistributedResult<Vec<Vec<u8>>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    /// Terminal status, once the stream has ended
    pub fn end(&self) -> Option<&ScanEnd> {
        self.end.as_ref()
    }

    async fn accept(&mut self, body: MessageBody) -> DistributedResult<Option<Vec<u8>>> {
        match body {
            MessageBody::DataChunk { bytes } => {
                self.awaiting_control = true;
                Ok(Some(bytes))
            }
            MessageBody::DoneWithResult => {
                self.terminate(ScanEnd::Complete).await;
                Ok(None)
            }
            MessageBody::PartialResult { failed_nodes } => {
                self.terminate(ScanEnd::Partial(failed_nodes)).await;
                Ok(None)
            }
            MessageBody::Result(result) => {
                self.close().await;
                Err(DistributedError::RemoteError {
                    message: result.error,
                })
            }
            other => {
                self.close().await;
                Err(DistributedError::protocol(format!(
                    "Unexpected {} frame in scan stream",
                    other.kind()
                )))
            }
        }
    }

    async fn terminate(&mut self, end: ScanEnd) {
        self.end = Some(end);
        self.close().await;
    }

    async fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(e) = self.transport.close(connection).await {
                log::debug!("Closing scan connection failed: {}", e);
            }
        }
    }
}
