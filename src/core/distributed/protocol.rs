// SPDX-License-Identifier: MIT OR Apache-2.0

// src/core/distributed/protocol.rs

//! Wire vocabulary shared by clients, the manager and storage nodes.
//!
//! Every frame on the wire is one bincode-encoded [`Message`]. Request/response
//! exchanges are a single request frame answered by a single [`SimpleResult`]
//! (or a typed reply such as [`MessageBody::TypeRegistered`]). A scan switches the
//! connection into streaming mode: [`MessageBody::DataChunk`] frames travelling
//! towards the client, each answered by exactly one [`MessageBody::KeepGoing`] or
//! [`MessageBody::Done`], and a single terminal [`MessageBody::DoneWithResult`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One frame on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub body: MessageBody,
}

impl Message {
    pub fn new(body: MessageBody) -> Self {
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            body,
        }
    }

    pub fn request(request: ManagerRequest) -> Self {
        Message::new(MessageBody::Request(request))
    }

    pub fn command(command: StorageCommand) -> Self {
        Message::new(MessageBody::Command(command))
    }

    pub fn result(result: SimpleResult) -> Self {
        Message::new(MessageBody::Result(result))
    }

    pub fn chunk(bytes: Vec<u8>) -> Self {
        Message::new(MessageBody::DataChunk { bytes })
    }

    pub fn keep_going() -> Self {
        Message::new(MessageBody::KeepGoing)
    }

    pub fn done() -> Self {
        Message::new(MessageBody::Done)
    }

    pub fn done_with_result() -> Self {
        Message::new(MessageBody::DoneWithResult)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MessageBody {
    /// Client to manager
    Request(ManagerRequest),
    /// Manager to storage node
    Command(StorageCommand),
    /// Generic acknowledgement
    Result(SimpleResult),
    TypeRegistered { type_id: u32 },
    CatalogListing { text: String },
    /// One page of set data, forwarded byte-for-byte
    DataChunk { bytes: Vec<u8> },
    KeepGoing,
    Done,
    /// Terminal frame of a scan stream
    DoneWithResult,
    /// Terminal frame of a scan that lost shards, sent only when partial
    /// results are reported explicitly
    PartialResult { failed_nodes: Vec<String> },
}

impl MessageBody {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::Request(_) => "request",
            MessageBody::Command(_) => "command",
            MessageBody::Result(_) => "result",
            MessageBody::TypeRegistered { .. } => "type-registered",
            MessageBody::CatalogListing { .. } => "catalog-listing",
            MessageBody::DataChunk { .. } => "data-chunk",
            MessageBody::KeepGoing => "keep-going",
            MessageBody::Done => "done",
            MessageBody::DoneWithResult => "done-with-result",
            MessageBody::PartialResult { .. } => "partial-result",
        }
    }
}

/// Requests accepted by the manager
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ManagerRequest {
    AddDatabase {
        database: String,
    },
    AddSet {
        database: String,
        set: String,
        type_name: String,
        page_size: u64,
    },
    AddTempSet {
        database: String,
        set: String,
        type_name: String,
        page_size: u64,
    },
    RemoveTempSet {
        database: String,
        set: String,
        type_name: String,
    },
    RemoveDatabase {
        database: String,
    },
    RemoveSet {
        database: String,
        set: String,
    },
    ClearSet {
        database: String,
        set: String,
        type_name: String,
    },
    ExportSet {
        database: String,
        set: String,
        output_path: String,
        format: ExportFormat,
    },
    Cleanup,
    SetScan {
        database: String,
        set: String,
    },
    RegisterType {
        type_name: String,
    },
    DispatchData {
        database: String,
        set: String,
        records: Vec<Vec<u8>>,
    },
    DescribeCatalog,
}

impl ManagerRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ManagerRequest::AddDatabase { .. } => "add-database",
            ManagerRequest::AddSet { .. } => "add-set",
            ManagerRequest::AddTempSet { .. } => "add-temp-set",
            ManagerRequest::RemoveTempSet { .. } => "remove-temp-set",
            ManagerRequest::RemoveDatabase { .. } => "remove-database",
            ManagerRequest::RemoveSet { .. } => "remove-set",
            ManagerRequest::ClearSet { .. } => "clear-set",
            ManagerRequest::ExportSet { .. } => "export-set",
            ManagerRequest::Cleanup => "cleanup",
            ManagerRequest::SetScan { .. } => "set-scan",
            ManagerRequest::RegisterType { .. } => "register-type",
            ManagerRequest::DispatchData { .. } => "dispatch-data",
            ManagerRequest::DescribeCatalog => "describe-catalog",
        }
    }
}

/// Commands broadcast by the manager to storage nodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StorageCommand {
    AddDatabase {
        database: String,
    },
    AddSet {
        database: String,
        set: String,
        type_name: String,
        page_size: u64,
    },
    RemoveDatabase {
        database: String,
    },
    RemoveSet {
        database: String,
        set: String,
        type_name: String,
    },
    ClearSet {
        database: String,
        set: String,
        type_name: String,
    },
    ExportSet {
        database: String,
        set: String,
        output_path: String,
        format: ExportFormat,
    },
    Cleanup,
    AppendRecords {
        database: String,
        set: String,
        records: Vec<Vec<u8>>,
    },
    SetScan {
        database: String,
        set: String,
    },
}

impl StorageCommand {
    pub fn name(&self) -> &'static str {
        match self {
            StorageCommand::AddDatabase { .. } => "storage-add-database",
            StorageCommand::AddSet { .. } => "storage-add-set",
            StorageCommand::RemoveDatabase { .. } => "storage-remove-database",
            StorageCommand::RemoveSet { .. } => "storage-remove-set",
            StorageCommand::ClearSet { .. } => "storage-clear-set",
            StorageCommand::ExportSet { .. } => "storage-export-set",
            StorageCommand::Cleanup => "storage-cleanup",
            StorageCommand::AppendRecords { .. } => "storage-append-records",
            StorageCommand::SetScan { .. } => "storage-set-scan",
        }
    }

    /// Whether the command changes node state
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            StorageCommand::SetScan { .. } | StorageCommand::ExportSet { .. }
        )
    }
}

/// Acknowledgement carrying a success flag and an error string on failure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimpleResult {
    pub success: bool,
    pub error: String,
}

impl SimpleResult {
    pub fn ok() -> Self {
        SimpleResult {
            success: true,
            error: String::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        SimpleResult {
            success: false,
            error: error.into(),
        }
    }

    pub fn from_result<E: fmt::Display>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => SimpleResult::ok(),
            Err(e) => SimpleResult::failure(e.to_string()),
        }
    }
}

/// Output format for exported sets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Page bytes written back to back
    #[default]
    Raw,
    /// One JSON document per page holding the decoded records
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Raw => "bin",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" | "bin" | "binary" => Ok(ExportFormat::Raw),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("Unknown export format: {}", other)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Raw => write!(f, "raw"),
            ExportFormat::Json => write!(f, "json"),
        }
    }
}
