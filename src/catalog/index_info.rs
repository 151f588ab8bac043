//! Metadata the catalog keeps for one index: its key schema, the parent
//! table it indexes, and the B+Tree itself.

use crate::btree::BPlusTree;
use crate::buffer::BufferPool;
use crate::catalog::table_info::TableInfo;
use crate::error::Result;
use crate::page::IndexRootsPage;
use crate::record::{Row, Schema};
use crate::types::{RowId, INDEX_ROOTS_PAGE_ID};
use std::sync::Arc;

/// A registered secondary index: a `BPlusTree` over `table`'s rows,
/// keyed by the columns named in `key_map`.
pub struct IndexInfo {
    pub index_id: u32,
    pub name: String,
    pub table_id: u32,
    pub key_map: Vec<u32>,
    pub key_schema: Arc<Schema>,
    pub table: Arc<TableInfo>,
    pub tree: BPlusTree,
    buffer_pool: Arc<dyn BufferPool>,
}

impl IndexInfo {
    pub fn new(
        index_id: u32,
        name: String,
        table_id: u32,
        key_map: Vec<u32>,
        key_schema: Arc<Schema>,
        table: Arc<TableInfo>,
        tree: BPlusTree,
        buffer_pool: Arc<dyn BufferPool>,
    ) -> Self {
        Self {
            index_id,
            name,
            table_id,
            key_map,
            key_schema,
            table,
            tree,
            buffer_pool,
        }
    }

    /// Project `row` (in the parent table's schema) onto this index's key
    /// schema and encode it as B+Tree key bytes.
    pub fn encode_key(&self, row: &Row) -> Result<Vec<u8>> {
        let key_row = row.get_key_from_row(&self.table.schema, &self.key_schema)?;
        Ok(self.tree.keys().encode(&key_row))
    }

    pub fn get_value(&self, key: &[u8]) -> Result<Option<RowId>> {
        self.tree.get_value(key)
    }

    pub fn insert(&self, key: &[u8], rid: RowId) -> Result<bool> {
        let inserted = self.tree.insert(key, rid)?;
        self.sync_root()?;
        Ok(inserted)
    }

    pub fn remove(&self, key: &[u8]) -> Result<()> {
        self.tree.remove(key)?;
        self.sync_root()?;
        Ok(())
    }

    /// The B+Tree's root can move on insert/remove (new root allocated on
    /// split, old root freed on collapse); persist it into the Index
    /// Roots Page so a reopened database finds the current root.
    fn sync_root(&self) -> Result<()> {
        let guard = self.buffer_pool.fetch_page_mut(INDEX_ROOTS_PAGE_ID)?;
        let mut data = *guard.read();
        let mut roots = IndexRootsPage::new(&mut data);
        roots.update(self.index_id, self.tree.root_page_id())?;
        *guard.write() = data;
        self.buffer_pool.flush_page(INDEX_ROOTS_PAGE_ID)
    }
}
