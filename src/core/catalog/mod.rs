// SPDX-License-Identifier: MIT OR Apache-2.0

// src/core/catalog/mod.rs

//! Catalog
//!
//! Authoritative metadata for databases, sets, element types, nodes and the
//! set-to-node membership index, persisted in SQLite. Every mutation reports
//! failure through [`CatalogError`]; multi-row mutations run in a transaction.
//! Handlers share one connection behind a mutex, so updates to the same key are
//! serialized.

pub mod model;

pub use model::{
    set_key, DatabaseRecord, SetMembership, SetRecord, TypeRecord, BUILTIN_TYPES,
    FIRST_USER_TYPE_ID,
};

use crate::core::cluster::{NodeInfo, NodeStatus, NodeType};
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("Database {database} already exists")]
    DatabaseExists { database: String },

    #[error("Database {database} does not exist")]
    DatabaseNotFound { database: String },

    #[error("Set {database}:{set} already exists")]
    SetExists { database: String, set: String },

    #[error("Set {database}:{set} does not exist")]
    SetNotFound { database: String, set: String },

    #[error("Could not identify type={type_name}")]
    TypeNotFound { type_name: String },

    #[error("Type id {type_id} is not registered")]
    UnknownTypeId { type_id: u32 },

    #[error("Node {node_id} is not registered")]
    NodeNotFound { node_id: String },

    #[error("Catalog storage error: {message}")]
    Storage { message: String },
}

impl From<rusqlite::Error> for CatalogError {
    fn from(e: rusqlite::Error) -> Self {
        CatalogError::Storage {
            message: e.to_string(),
        }
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS databases (
    name        TEXT PRIMARY KEY,
    created_on  INTEGER NOT NULL,
    modified_on INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS types (
    id       INTEGER PRIMARY KEY,
    name     TEXT NOT NULL UNIQUE,
    category TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS nodes (
    node_id   TEXT PRIMARY KEY,
    address   TEXT NOT NULL,
    port      INTEGER NOT NULL,
    name      TEXT NOT NULL,
    node_type TEXT NOT NULL,
    status    INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS sets (
    set_id     TEXT PRIMARY KEY,
    database   TEXT NOT NULL,
    name       TEXT NOT NULL,
    type_id    INTEGER NOT NULL,
    type_name  TEXT NOT NULL,
    page_size  INTEGER NOT NULL,
    num_pages  INTEGER NOT NULL DEFAULT 0,
    num_bytes  INTEGER NOT NULL DEFAULT 0,
    created_on INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS database_nodes (
    seq      INTEGER PRIMARY KEY AUTOINCREMENT,
    database TEXT NOT NULL,
    node_id  TEXT NOT NULL,
    UNIQUE (database, node_id)
);
CREATE TABLE IF NOT EXISTS set_nodes (
    seq      INTEGER PRIMARY KEY AUTOINCREMENT,
    set_id   TEXT NOT NULL,
    node_id  TEXT NOT NULL,
    has_data INTEGER NOT NULL DEFAULT 1,
    UNIQUE (set_id, node_id)
);
";

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// SQLite-backed catalog. Cloning shares the connection.
#[derive(Clone, Debug)]
pub struct Catalog {
    conn: Arc<Mutex<Connection>>,
}

impl Catalog {
    /// Open (or create) a catalog file
    pub fn open(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        log::info!("Opening catalog at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Catalog that lives only as long as the process
    pub fn in_memory() -> CatalogResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> CatalogResult<Self> {
        conn.execute_batch(SCHEMA)?;
        for (id, name) in BUILTIN_TYPES {
            conn.execute(
                "INSERT OR IGNORE INTO types (id, name, category) VALUES (?1, ?2, 'builtin')",
                params![*id as i64, name],
            )?;
        }
        Ok(Catalog {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> CatalogResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CatalogError::Storage {
            message: "catalog connection lock poisoned".to_string(),
        })
    }

    // ---- databases ----

    pub fn database_exists(&self, name: &str) -> CatalogResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM databases WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn create_database(&self, name: &str) -> CatalogResult<()> {
        let conn = self.conn()?;
        let now = now_millis();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO databases (name, created_on, modified_on) VALUES (?1, ?2, ?2)",
            params![name, now],
        )?;
        if inserted == 0 {
            return Err(CatalogError::DatabaseExists {
                database: name.to_string(),
            });
        }
        log::debug!("Catalog: created database {}", name);
        Ok(())
    }

    pub fn get_database(&self, name: &str) -> CatalogResult<Option<DatabaseRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT name, created_on, modified_on FROM databases WHERE name = ?1",
                params![name],
                |row| {
                    Ok(DatabaseRecord {
                        name: row.get(0)?,
                        created_on: row.get(1)?,
                        modified_on: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_databases(&self) -> CatalogResult<Vec<DatabaseRecord>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT name, created_on, modified_on FROM databases ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(DatabaseRecord {
                name: row.get(0)?,
                created_on: row.get(1)?,
                modified_on: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete a database together with its sets and their memberships
    pub fn delete_database(&self, name: &str) -> CatalogResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM set_nodes WHERE set_id IN (SELECT set_id FROM sets WHERE database = ?1)",
            params![name],
        )?;
        tx.execute("DELETE FROM sets WHERE database = ?1", params![name])?;
        tx.execute(
            "DELETE FROM database_nodes WHERE database = ?1",
            params![name],
        )?;
        let deleted = tx.execute("DELETE FROM databases WHERE name = ?1", params![name])?;
        if deleted == 0 {
            return Err(CatalogError::DatabaseNotFound {
                database: name.to_string(),
            });
        }
        tx.commit()?;
        log::debug!("Catalog: deleted database {}", name);
        Ok(())
    }

    /// Nodes known to hold the database: those that acknowledged its creation,
    /// in order, then any other node hosting one of its sets
    pub fn get_nodes_with_database(&self, name: &str) -> CatalogResult<Vec<String>> {
        let conn = self.conn()?;
        let mut holders: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT node_id FROM database_nodes WHERE database = ?1 ORDER BY seq",
            )?;
            let rows = stmt.query_map(params![name], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut stmt = conn.prepare(
            "SELECT sn.node_id FROM set_nodes sn
             JOIN sets s ON s.set_id = sn.set_id
             WHERE s.database = ?1
             GROUP BY sn.node_id
             ORDER BY MIN(sn.seq)",
        )?;
        let rows = stmt.query_map(params![name], |row| row.get::<_, String>(0))?;
        for node in rows {
            let node = node?;
            if !holders.contains(&node) {
                holders.push(node);
            }
        }
        Ok(holders)
    }

    /// Record that a node holds a database
    pub fn add_node_to_database(&self, node_id: &str, database: &str) -> CatalogResult<()> {
        let conn = self.conn()?;
        let db_found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM databases WHERE name = ?1",
                params![database],
                |row| row.get(0),
            )
            .optional()?;
        if db_found.is_none() {
            return Err(CatalogError::DatabaseNotFound {
                database: database.to_string(),
            });
        }
        let node_found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM nodes WHERE node_id = ?1",
                params![node_id],
                |row| row.get(0),
            )
            .optional()?;
        if node_found.is_none() {
            return Err(CatalogError::NodeNotFound {
                node_id: node_id.to_string(),
            });
        }
        conn.execute(
            "INSERT OR IGNORE INTO database_nodes (database, node_id) VALUES (?1, ?2)",
            params![database, node_id],
        )?;
        log::debug!("Catalog: node {} holds database {}", node_id, database);
        Ok(())
    }

    // ---- sets ----

    pub fn set_exists(&self, database: &str, set: &str) -> CatalogResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sets WHERE set_id = ?1",
                params![set_key(database, set)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Register a set. The database and the type id must already exist.
    pub fn create_set(
        &self,
        type_id: u32,
        type_name: &str,
        database: &str,
        set: &str,
        page_size: u64,
    ) -> CatalogResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let db_found: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM databases WHERE name = ?1",
                params![database],
                |row| row.get(0),
            )
            .optional()?;
        if db_found.is_none() {
            return Err(CatalogError::DatabaseNotFound {
                database: database.to_string(),
            });
        }

        let type_found: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM types WHERE id = ?1",
                params![type_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        if type_found.is_none() {
            return Err(CatalogError::UnknownTypeId { type_id });
        }

        let now = now_millis();
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO sets
                (set_id, database, name, type_id, type_name, page_size, created_on)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                set_key(database, set),
                database,
                set,
                type_id as i64,
                type_name,
                page_size as i64,
                now
            ],
        )?;
        if inserted == 0 {
            return Err(CatalogError::SetExists {
                database: database.to_string(),
                set: set.to_string(),
            });
        }
        tx.execute(
            "UPDATE databases SET modified_on = ?2 WHERE name = ?1",
            params![database, now],
        )?;
        tx.commit()?;
        log::debug!("Catalog: created set {}:{} type={}", database, set, type_name);
        Ok(())
    }

    pub fn get_set(&self, database: &str, set: &str) -> CatalogResult<Option<SetRecord>> {
        let conn = self.conn()?;
        let key = set_key(database, set);
        let record = conn
            .query_row(
                "SELECT database, name, type_id, type_name, page_size, num_pages, num_bytes, created_on
                 FROM sets WHERE set_id = ?1",
                params![key],
                |row| {
                    Ok(SetRecord {
                        database: row.get(0)?,
                        name: row.get(1)?,
                        type_id: row.get::<_, i64>(2)? as u32,
                        type_name: row.get(3)?,
                        page_size: row.get::<_, i64>(4)? as u64,
                        num_pages: row.get::<_, i64>(5)? as u64,
                        num_bytes: row.get::<_, i64>(6)? as u64,
                        created_on: row.get(7)?,
                        members: Vec::new(),
                    })
                },
            )
            .optional()?;

        match record {
            Some(mut record) => {
                record.members = Self::members(&conn, &key)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn members(conn: &Connection, key: &str) -> CatalogResult<Vec<SetMembership>> {
        let mut stmt = conn
            .prepare("SELECT node_id, has_data FROM set_nodes WHERE set_id = ?1 ORDER BY seq")?;
        let rows = stmt.query_map(params![key], |row| {
            Ok(SetMembership {
                node_id: row.get(0)?,
                has_data: row.get::<_, i64>(1)? != 0,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_sets_for_database(&self, database: &str) -> CatalogResult<Vec<SetRecord>> {
        let names: Vec<String> = {
            let conn = self.conn()?;
            let mut stmt =
                conn.prepare("SELECT name FROM sets WHERE database = ?1 ORDER BY name")?;
            let rows = stmt.query_map(params![database], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let mut sets = Vec::with_capacity(names.len());
        for name in names {
            if let Some(record) = self.get_set(database, &name)? {
                sets.push(record);
            }
        }
        Ok(sets)
    }

    /// Delete a set and its membership
    pub fn delete_set(&self, database: &str, set: &str) -> CatalogResult<()> {
        let key = set_key(database, set);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM set_nodes WHERE set_id = ?1", params![key])?;
        let deleted = tx.execute("DELETE FROM sets WHERE set_id = ?1", params![key])?;
        if deleted == 0 {
            return Err(CatalogError::SetNotFound {
                database: database.to_string(),
                set: set.to_string(),
            });
        }
        tx.execute(
            "UPDATE databases SET modified_on = ?2 WHERE name = ?1",
            params![database, now_millis()],
        )?;
        tx.commit()?;
        log::debug!("Catalog: deleted set {}", key);
        Ok(())
    }

    /// Hosting nodes of a set in membership order
    pub fn get_nodes_with_set(&self, database: &str, set: &str) -> CatalogResult<Vec<String>> {
        let conn = self.conn()?;
        Ok(Self::members(&conn, &set_key(database, set))?
            .into_iter()
            .map(|m| m.node_id)
            .collect())
    }

    /// Add one node to a set's membership. Re-adding keeps the original position.
    pub fn add_node_to_set(&self, node_id: &str, database: &str, set: &str) -> CatalogResult<()> {
        let key = set_key(database, set);
        let conn = self.conn()?;
        Self::require_set_and_node(&conn, node_id, database, set)?;
        conn.execute(
            "INSERT INTO set_nodes (set_id, node_id, has_data) VALUES (?1, ?2, 1)
             ON CONFLICT (set_id, node_id) DO UPDATE SET has_data = 1",
            params![key, node_id],
        )?;
        log::debug!("Catalog: node {} joined set {}", node_id, key);
        Ok(())
    }

    pub fn remove_node_from_set(
        &self,
        node_id: &str,
        database: &str,
        set: &str,
    ) -> CatalogResult<()> {
        let key = set_key(database, set);
        let conn = self.conn()?;
        Self::require_set_and_node(&conn, node_id, database, set)?;
        conn.execute(
            "DELETE FROM set_nodes WHERE set_id = ?1 AND node_id = ?2",
            params![key, node_id],
        )?;
        log::debug!("Catalog: node {} left set {}", node_id, key);
        Ok(())
    }

    /// Retract a node from a database and every one of its sets
    pub fn remove_node_from_database(&self, node_id: &str, database: &str) -> CatalogResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM set_nodes WHERE node_id = ?1
             AND set_id IN (SELECT set_id FROM sets WHERE database = ?2)",
            params![node_id, database],
        )?;
        tx.execute(
            "DELETE FROM database_nodes WHERE node_id = ?1 AND database = ?2",
            params![node_id, database],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn require_set_and_node(
        conn: &Connection,
        node_id: &str,
        database: &str,
        set: &str,
    ) -> CatalogResult<()> {
        let set_found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sets WHERE set_id = ?1",
                params![set_key(database, set)],
                |row| row.get(0),
            )
            .optional()?;
        if set_found.is_none() {
            return Err(CatalogError::SetNotFound {
                database: database.to_string(),
                set: set.to_string(),
            });
        }
        let node_found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM nodes WHERE node_id = ?1",
                params![node_id],
                |row| row.get(0),
            )
            .optional()?;
        if node_found.is_none() {
            return Err(CatalogError::NodeNotFound {
                node_id: node_id.to_string(),
            });
        }
        Ok(())
    }

    /// Add to a set's page and byte counters
    pub fn update_set_statistics(
        &self,
        database: &str,
        set: &str,
        pages: u64,
        bytes: u64,
    ) -> CatalogResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sets SET num_pages = num_pages + ?2, num_bytes = num_bytes + ?3
             WHERE set_id = ?1",
            params![set_key(database, set), pages as i64, bytes as i64],
        )?;
        if updated == 0 {
            return Err(CatalogError::SetNotFound {
                database: database.to_string(),
                set: set.to_string(),
            });
        }
        Ok(())
    }

    pub fn reset_set_statistics(&self, database: &str, set: &str) -> CatalogResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sets SET num_pages = 0, num_bytes = 0 WHERE set_id = ?1",
            params![set_key(database, set)],
        )?;
        if updated == 0 {
            return Err(CatalogError::SetNotFound {
                database: database.to_string(),
                set: set.to_string(),
            });
        }
        Ok(())
    }

    // ---- types ----

    /// Register a user type, returning the existing id when the name is taken
    pub fn register_type(&self, name: &str, category: &str) -> CatalogResult<u32> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM types WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id as u32);
        }
        let next: i64 = tx.query_row(
            "SELECT COALESCE(MAX(id) + 1, ?1) FROM types WHERE id >= ?1",
            params![FIRST_USER_TYPE_ID as i64],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO types (id, name, category) VALUES (?1, ?2, ?3)",
            params![next, name, category],
        )?;
        tx.commit()?;
        log::info!("Catalog: registered type {} with id {}", name, next);
        Ok(next as u32)
    }

    pub fn resolve_type(&self, name: &str) -> CatalogResult<Option<TypeRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT id, name, category FROM types WHERE name = ?1",
                params![name],
                |row| {
                    Ok(TypeRecord {
                        id: row.get::<_, i64>(0)? as u32,
                        name: row.get(1)?,
                        category: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_type(&self, id: u32) -> CatalogResult<Option<TypeRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT id, name, category FROM types WHERE id = ?1",
                params![id as i64],
                |row| {
                    Ok(TypeRecord {
                        id: row.get::<_, i64>(0)? as u32,
                        name: row.get(1)?,
                        category: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_user_types(&self) -> CatalogResult<Vec<TypeRecord>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, name, category FROM types WHERE id >= ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![FIRST_USER_TYPE_ID as i64], |row| {
            Ok(TypeRecord {
                id: row.get::<_, i64>(0)? as u32,
                name: row.get(1)?,
                category: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ---- nodes ----

    /// Insert or refresh a node record
    pub fn register_node(&self, node: &NodeInfo) -> CatalogResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO nodes (node_id, address, port, name, node_type, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (node_id) DO UPDATE SET name = ?4, node_type = ?5, status = ?6",
            params![
                node.identity(),
                node.address,
                node.port as i64,
                node.name,
                node.node_type.to_string(),
                node.status.code()
            ],
        )?;
        Ok(())
    }

    pub fn node_exists(&self, node_id: &str) -> CatalogResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM nodes WHERE node_id = ?1",
                params![node_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_nodes(&self) -> CatalogResult<Vec<NodeInfo>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT address, port, name, node_type, status FROM nodes ORDER BY node_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let node_type: String = row.get(3)?;
            Ok(NodeInfo {
                address: row.get(0)?,
                port: row.get::<_, i64>(1)? as u16,
                name: row.get(2)?,
                node_type: if node_type == "manager" {
                    NodeType::Manager
                } else {
                    NodeType::Storage
                },
                status: NodeStatus::from_code(row.get(4)?),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ---- listings ----

    pub fn list_nodes_in_cluster(&self) -> CatalogResult<String> {
        let mut out = String::from("Nodes in cluster:\n");
        for node in self.get_nodes()? {
            let _ = writeln!(
                out,
                "  {} name={} type={} status={:?}",
                node.identity(),
                node.name,
                node.node_type,
                node.status
            );
        }
        Ok(out)
    }

    pub fn list_registered_databases(&self) -> CatalogResult<String> {
        let mut out = String::from("Databases:\n");
        for db in self.get_databases()? {
            let created = db
                .created_at()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| db.created_on.to_string());
            let _ = writeln!(out, "  {} created={}", db.name, created);
            out.push_str(&self.list_registered_sets_for_database(&db.name)?);
        }
        Ok(out)
    }

    pub fn list_registered_sets_for_database(&self, database: &str) -> CatalogResult<String> {
        let mut out = String::new();
        for set in self.get_sets_for_database(database)? {
            let _ = writeln!(
                out,
                "    {} type={} pages={} bytes={} nodes=[{}]",
                set.key(),
                set.type_name,
                set.num_pages,
                set.num_bytes,
                set.member_ids().join(", ")
            );
        }
        Ok(out)
    }

    pub fn list_user_defined_types(&self) -> CatalogResult<String> {
        let mut out = String::from("User-defined types:\n");
        for ty in self.get_user_types()? {
            let _ = writeln!(out, "  {} id={} category={}", ty.name, ty.id, ty.category);
        }
        Ok(out)
    }

    /// Full text dump used by the describe-catalog request
    pub fn describe(&self) -> CatalogResult<String> {
        Ok(format!(
            "{}{}{}",
            self.list_nodes_in_cluster()?,
            self.list_registered_databases()?,
            self.list_user_defined_types()?
        ))
    }
}
