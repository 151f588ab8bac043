//! # Relational Storage Engine
//!
//! A single-node, disk-backed storage engine: the layer that turns one
//! file on a host filesystem into a set of named tables and B+Tree
//! indexes.
//!
//! ## Architecture
//!
//! - **Storage Layer** (`storage`): disk I/O and bitmap-extent page allocation.
//! - **Buffer Pool** (`buffer`): LRU page cache with pin/dirty tracking.
//! - **Page Layer** (`page`): typed views over opaque page buffers.
//! - **B+Tree** (`btree`): generic-key index over the buffer pool.
//! - **Table Heap** (`table`): a linked chain of slotted pages holding rows.
//! - **Catalog** (`catalog`): tables, indexes, schemas, and their on-disk metadata.
//! - **Record layer** (`record`): columns, schemas, rows, and field values.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use btree_storage::{Config, Database};
//! use btree_storage::record::{Column, FieldType, Schema};
//!
//! let config = Config::new("my_database.db");
//! let db = Database::open(config)?;
//!
//! let schema = Schema::new(vec![Column::new("id", FieldType::Int32, 0, false, true)]);
//! db.create_table("accounts", schema)?;
//! db.create_index("accounts", "by_id", &["id"])?;
//! ```

pub mod btree;
pub mod buffer;
pub mod catalog;
pub mod error;
pub mod page;
pub mod record;
pub mod storage;
pub mod table;
pub mod types;

pub use error::{Result, StorageError};
pub use types::{PageId, PAGE_SIZE};

pub use buffer::{BufferPool, BufferPoolImpl};
pub use catalog::{CatalogManager, IndexInfo, TableInfo};
pub use storage::{DiskManager, DiskManagerImpl};

use record::Schema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Database configuration, loadable from/savable to JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Path to the backing database file.
    pub db_path: PathBuf,
    /// Number of frames in the buffer pool.
    pub buffer_pool_size: usize,
    /// Whether to create the database file if it doesn't already exist.
    pub create_if_missing: bool,
}

impl Config {
    /// Sane defaults for opening or creating a database at `path`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            db_path: path.into(),
            buffer_pool_size: 1000,
            create_if_missing: true,
        }
    }

    pub fn buffer_pool_size(mut self, size: usize) -> Self {
        self.buffer_pool_size = size;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

/// A snapshot of database-wide statistics, fit for serialisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    /// Total number of logical pages allocated on disk.
    pub page_count: u32,
    /// Number of frames in the buffer pool.
    pub buffer_pool_size: usize,
    /// Number of frames currently holding a resident page.
    pub buffer_pool_occupancy: usize,
    /// Number of registered tables.
    pub table_count: usize,
    /// Number of registered indexes, across all tables.
    pub index_count: usize,
}

/// Top-level database handle: wires the Disk Manager, Buffer Pool, and
/// Catalog Manager together behind a single value. No process-wide
/// singletons; every caller owns its own `Database`.
pub struct Database {
    disk_manager: Arc<dyn DiskManager>,
    buffer_pool: Arc<dyn BufferPool>,
    catalog: CatalogManager,
}

impl Database {
    /// Open a database at `config.db_path`, creating it (and an empty
    /// catalog) if it doesn't exist and `create_if_missing` is set;
    /// otherwise load the existing catalog from disk.
    pub fn open(config: Config) -> Result<Self> {
        let is_new = !config.db_path.exists();
        let disk_manager: Arc<dyn DiskManager> = Arc::new(DiskManagerImpl::open(
            &config.db_path,
            config.create_if_missing,
        )?);
        let buffer_pool: Arc<dyn BufferPool> =
            Arc::new(BufferPoolImpl::new(disk_manager.clone(), config.buffer_pool_size));

        let catalog = if is_new {
            CatalogManager::create(buffer_pool.clone())?
        } else {
            CatalogManager::load(buffer_pool.clone())?
        };

        log::info!(
            "opened database at {} ({} tables, {} indexes)",
            config.db_path.display(),
            catalog.table_count(),
            catalog.index_count()
        );

        Ok(Self {
            disk_manager,
            buffer_pool,
            catalog,
        })
    }

    pub fn create_table(&self, name: &str, schema: Schema) -> Result<Arc<TableInfo>> {
        self.catalog.create_table(name, schema)
    }

    pub fn get_table(&self, name: &str) -> Result<Arc<TableInfo>> {
        self.catalog.get_table(name)
    }

    pub fn get_tables(&self) -> Vec<Arc<TableInfo>> {
        self.catalog.get_tables()
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.catalog.drop_table(name)
    }

    pub fn create_index(&self, table_name: &str, index_name: &str, columns: &[&str]) -> Result<Arc<IndexInfo>> {
        self.catalog.create_index(table_name, index_name, columns)
    }

    pub fn get_index(&self, table_name: &str, index_name: &str) -> Result<Arc<IndexInfo>> {
        self.catalog.get_index(table_name, index_name)
    }

    pub fn get_table_indexes(&self, table_name: &str) -> Result<Vec<Arc<IndexInfo>>> {
        self.catalog.get_table_indexes(table_name)
    }

    pub fn drop_index(&self, table_name: &str, index_name: &str) -> Result<()> {
        self.catalog.drop_index(table_name, index_name)
    }

    /// Flush every dirty page to disk.
    pub fn flush(&self) -> Result<()> {
        self.buffer_pool.flush_all()
    }

    pub fn stats(&self) -> Result<DatabaseStats> {
        Ok(DatabaseStats {
            page_count: self.disk_manager.allocated_page_count()?,
            buffer_pool_size: self.buffer_pool.capacity(),
            buffer_pool_occupancy: self.buffer_pool.occupied(),
            table_count: self.catalog.table_count(),
            index_count: self.catalog.index_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use record::{Column, Field, FieldType, Row};
    use tempfile::tempdir;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", FieldType::Int32, 0, false, true),
            Column::new_char("label", 8, 1, true, false),
        ])
    }

    #[test]
    fn open_create_table_and_query() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().join("test.db"));
        let db = Database::open(config).unwrap();

        let table = db.create_table("accounts", schema()).unwrap();
        assert_eq!(db.get_tables().len(), 1);

        let row = Row::new(vec![Field::Int32(1), Field::Char("hello".to_string())]);
        let mut buf = Vec::new();
        row.serialize_to(&table.schema, &mut buf).unwrap();
        let rid = table.heap.insert_tuple(&buf).unwrap();
        assert_eq!(table.heap.get_tuple(rid).unwrap(), Some(buf));

        let stats = db.stats().unwrap();
        assert_eq!(stats.table_count, 1);
        assert!(stats.page_count >= 2);
    }

    #[test]
    fn reopen_recovers_catalog_and_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let db = Database::open(Config::new(&path)).unwrap();
            let table = db.create_table("accounts", schema()).unwrap();
            db.create_index("accounts", "by_label", &["label"]).unwrap();

            let row = Row::new(vec![Field::Int32(1), Field::Char("hello".to_string())]);
            let mut buf = Vec::new();
            row.serialize_to(&table.schema, &mut buf).unwrap();
            let rid = table.heap.insert_tuple(&buf).unwrap();

            let index = db.get_index("accounts", "by_label").unwrap();
            let key = index.encode_key(&row).unwrap();
            index.insert(&key, rid).unwrap();
            db.flush().unwrap();
        }

        let db = Database::open(Config::new(&path).create_if_missing(false)).unwrap();
        let table = db.get_table("accounts").unwrap();
        assert_eq!(table.schema.column_count(), 2);

        let index = db.get_index("accounts", "by_label").unwrap();
        let key = index
            .tree
            .keys()
            .encode(&Row::new(vec![Field::Char("hello".to_string())]));
        let rid = index.get_value(&key).unwrap().expect("indexed row should survive reopen");
        let bytes = table.heap.get_tuple(rid).unwrap().expect("row should still be in the heap");
        let decoded = Row::deserialize(&bytes, &table.schema).unwrap();
        assert_eq!(decoded.fields[1], Field::Char("hello".to_string()));
    }

    #[test]
    fn rejects_duplicate_table_name() {
        let dir = tempdir().unwrap();
        let db = Database::open(Config::new(dir.path().join("test.db"))).unwrap();
        db.create_table("accounts", schema()).unwrap();
        assert!(db.create_table("accounts", schema()).is_err());
    }
}
