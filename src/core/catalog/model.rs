// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// First identifier handed out to user-registered types
pub const FIRST_USER_TYPE_ID: u32 = 8192;

/// Types known to every cluster, with identifiers below [`FIRST_USER_TYPE_ID`]
pub const BUILTIN_TYPES: &[(u32, &str)] = &[
    (1, "bytes"),
    (2, "string"),
    (3, "int"),
    (4, "long"),
    (5, "double"),
];

/// Catalog key of a set
pub fn set_key(database: &str, set: &str) -> String {
    format!("{}:{}", database, set)
}

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseRecord {
    pub name: String,
    pub created_on: i64,
    pub modified_on: i64,
}

impl DatabaseRecord {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.created_on)
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.modified_on)
    }
}

/// One node's membership in a set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetMembership {
    pub node_id: String,
    pub has_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetRecord {
    pub database: String,
    pub name: String,
    pub type_id: u32,
    pub type_name: String,
    pub page_size: u64,
    pub num_pages: u64,
    pub num_bytes: u64,
    pub created_on: i64,
    /// Hosting nodes in the order they joined
    pub members: Vec<SetMembership>,
}

impl SetRecord {
    pub fn key(&self) -> String {
        set_key(&self.database, &self.name)
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.node_id.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeRecord {
    pub id: u32,
    pub name: String,
    pub category: String,
}

impl TypeRecord {
    pub fn is_builtin(&self) -> bool {
        self.id < FIRST_USER_TYPE_ID
    }
}
