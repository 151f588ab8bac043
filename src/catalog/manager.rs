//! Catalog manager: the single owner of every table and index, and the
//! only writer of the Catalog Meta Page and Index Roots Page.

use crate::btree::{BPlusTree, KeyManager};
use crate::buffer::BufferPool;
use crate::catalog::index_info::IndexInfo;
use crate::catalog::table_info::TableInfo;
use crate::error::{EntityKind, Result, StorageError};
use crate::page::{CatalogMeta, IndexMetaPage, IndexRootsPage, TableMetaPage};
use crate::record::Schema;
use crate::table::TableHeap;
use crate::types::{PageId, CATALOG_META_PAGE_ID, INDEX_ROOTS_PAGE_ID};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

struct CatalogState {
    tables_by_id: HashMap<u32, Arc<TableInfo>>,
    tables_by_name: HashMap<String, u32>,
    indexes_by_id: HashMap<u32, Arc<IndexInfo>>,
    indexes_by_table: HashMap<u32, Vec<u32>>,
    table_meta_pages: HashMap<u32, PageId>,
    index_meta_pages: HashMap<u32, PageId>,
    next_table_id: u32,
    next_index_id: u32,
}

/// Tracks every table and index in a database, and is the single writer
/// of the catalog's own on-disk bookkeeping pages.
pub struct CatalogManager {
    buffer_pool: Arc<dyn BufferPool>,
    state: Mutex<CatalogState>,
}

impl CatalogManager {
    /// Initialise a brand-new, empty catalog: allocates the catalog meta
    /// page and index roots page, which must land at their well-known ids.
    pub fn create(buffer_pool: Arc<dyn BufferPool>) -> Result<Self> {
        let (meta_id, meta_guard) = buffer_pool.new_page()?;
        let mut meta_data = *meta_guard.read();
        CatalogMeta::new().write(&mut meta_data)?;
        *meta_guard.write() = meta_data;
        drop(meta_guard);

        let (roots_id, roots_guard) = buffer_pool.new_page()?;
        let mut roots_data = *roots_guard.read();
        IndexRootsPage::new(&mut roots_data).init();
        *roots_guard.write() = roots_data;
        drop(roots_guard);

        if meta_id != CATALOG_META_PAGE_ID || roots_id != INDEX_ROOTS_PAGE_ID {
            return Err(StorageError::corruption(
                "catalog meta / index roots pages did not land at their well-known ids",
            ));
        }

        log::info!("initialised empty catalog");
        Ok(Self {
            buffer_pool,
            state: Mutex::new(CatalogState {
                tables_by_id: HashMap::new(),
                tables_by_name: HashMap::new(),
                indexes_by_id: HashMap::new(),
                indexes_by_table: HashMap::new(),
                table_meta_pages: HashMap::new(),
                index_meta_pages: HashMap::new(),
                next_table_id: 0,
                next_index_id: 0,
            }),
        })
    }

    /// Reload a catalog from an existing database file.
    pub fn load(buffer_pool: Arc<dyn BufferPool>) -> Result<Self> {
        let catalog_meta = {
            let guard = buffer_pool.fetch_page(CATALOG_META_PAGE_ID)?;
            let data = *guard.read();
            CatalogMeta::read(&data)?
        };

        let mut tables_by_id = HashMap::new();
        let mut tables_by_name = HashMap::new();
        let mut table_meta_pages = HashMap::new();
        let mut next_table_id = 0u32;

        for &(table_id, meta_page_id) in &catalog_meta.tables {
            let table_meta = {
                let guard = buffer_pool.fetch_page(meta_page_id)?;
                let data = *guard.read();
                TableMetaPage::read(&data)?
            };
            let schema = Arc::new(table_meta.schema);
            let heap = TableHeap::with_first_page(buffer_pool.clone(), table_meta.first_page_id);
            let info = Arc::new(TableInfo {
                table_id,
                name: table_meta.name.clone(),
                schema,
                heap,
            });
            tables_by_name.insert(table_meta.name, table_id);
            tables_by_id.insert(table_id, info);
            table_meta_pages.insert(table_id, meta_page_id);
            next_table_id = next_table_id.max(table_id + 1);
        }

        let mut indexes_by_id = HashMap::new();
        let mut indexes_by_table: HashMap<u32, Vec<u32>> = HashMap::new();
        let mut index_meta_pages = HashMap::new();
        let mut next_index_id = 0u32;

        for &(index_id, meta_page_id) in &catalog_meta.indexes {
            let index_meta = {
                let guard = buffer_pool.fetch_page(meta_page_id)?;
                let data = *guard.read();
                IndexMetaPage::read(&data)?
            };
            let table = tables_by_id
                .get(&index_meta.table_id)
                .cloned()
                .ok_or_else(|| StorageError::corruption("index refers to a missing table"))?;
            let key_schema = Arc::new(Schema::new(
                index_meta
                    .key_map
                    .iter()
                    .map(|&i| table.schema.columns[i as usize].clone())
                    .collect(),
            ));
            let root_page_id = {
                let guard = buffer_pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
                let mut data = *guard.read();
                IndexRootsPage::new(&mut data).get(index_id).unwrap_or(PageId::INVALID)
            };
            let keys = KeyManager::new(key_schema.clone());
            let tree = BPlusTree::with_root(buffer_pool.clone(), keys, root_page_id);
            let info = Arc::new(IndexInfo::new(
                index_id,
                index_meta.name,
                index_meta.table_id,
                index_meta.key_map,
                key_schema,
                table,
                tree,
                buffer_pool.clone(),
            ));
            indexes_by_table.entry(index_meta.table_id).or_default().push(index_id);
            indexes_by_id.insert(index_id, info);
            index_meta_pages.insert(index_id, meta_page_id);
            next_index_id = next_index_id.max(index_id + 1);
        }

        log::info!(
            "loaded catalog: {} tables, {} indexes",
            tables_by_id.len(),
            indexes_by_id.len()
        );

        Ok(Self {
            buffer_pool,
            state: Mutex::new(CatalogState {
                tables_by_id,
                tables_by_name,
                indexes_by_id,
                indexes_by_table,
                table_meta_pages,
                index_meta_pages,
                next_table_id,
                next_index_id,
            }),
        })
    }

    fn write_catalog_meta(&self, state: &CatalogState) -> Result<()> {
        let meta = CatalogMeta {
            tables: state.table_meta_pages.iter().map(|(&id, &pg)| (id, pg)).collect(),
            indexes: state.index_meta_pages.iter().map(|(&id, &pg)| (id, pg)).collect(),
        };
        let guard = self.buffer_pool.fetch_page_mut(CATALOG_META_PAGE_ID)?;
        let mut data = *guard.read();
        meta.write(&mut data)?;
        *guard.write() = data;
        self.buffer_pool.flush_page(CATALOG_META_PAGE_ID)
    }

    pub fn create_table(&self, name: &str, schema: Schema) -> Result<Arc<TableInfo>> {
        let mut state = self.state.lock();
        if state.tables_by_name.contains_key(name) {
            return Err(StorageError::already_exists(EntityKind::Table, name));
        }

        let table_id = state.next_table_id;
        state.next_table_id += 1;

        let (meta_page_id, meta_guard) = self.buffer_pool.new_page()?;
        let heap = TableHeap::new(self.buffer_pool.clone())?;
        let meta = TableMetaPage {
            table_id,
            first_page_id: heap.first_page_id(),
            name: name.to_string(),
            schema: schema.clone(),
        };
        let mut meta_data = *meta_guard.read();
        meta.write(&mut meta_data)?;
        *meta_guard.write() = meta_data;
        drop(meta_guard);

        let info = Arc::new(TableInfo {
            table_id,
            name: name.to_string(),
            schema: Arc::new(schema),
            heap,
        });
        state.tables_by_name.insert(name.to_string(), table_id);
        state.tables_by_id.insert(table_id, info.clone());
        state.table_meta_pages.insert(table_id, meta_page_id);

        self.write_catalog_meta(&state)?;
        log::info!("created table '{name}' (id {table_id})");
        Ok(info)
    }

    pub fn get_table(&self, name: &str) -> Result<Arc<TableInfo>> {
        let state = self.state.lock();
        let id = *state
            .tables_by_name
            .get(name)
            .ok_or_else(|| StorageError::not_found(EntityKind::Table, name))?;
        Ok(state.tables_by_id[&id].clone())
    }

    pub fn get_tables(&self) -> Vec<Arc<TableInfo>> {
        self.state.lock().tables_by_id.values().cloned().collect()
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        let table_id = state
            .tables_by_name
            .remove(name)
            .ok_or_else(|| StorageError::not_found(EntityKind::Table, name))?;

        for index_id in state.indexes_by_table.remove(&table_id).unwrap_or_default() {
            if let Some(index) = state.indexes_by_id.remove(&index_id) {
                index.tree.destroy()?;
            }
            if let Some(meta_page) = state.index_meta_pages.remove(&index_id) {
                self.buffer_pool.delete_page(meta_page)?;
            }
            let guard = self.buffer_pool.fetch_page_mut(INDEX_ROOTS_PAGE_ID)?;
            let mut data = *guard.read();
            let _ = IndexRootsPage::new(&mut data).remove(index_id);
            *guard.write() = data;
        }

        let table_info = state
            .tables_by_id
            .remove(&table_id)
            .ok_or_else(|| StorageError::not_found(EntityKind::Table, name))?;
        table_info.heap.delete_table()?;
        if let Some(meta_page) = state.table_meta_pages.remove(&table_id) {
            self.buffer_pool.delete_page(meta_page)?;
        }

        self.write_catalog_meta(&state)?;
        log::info!("dropped table '{name}' (id {table_id})");
        Ok(())
    }

    pub fn create_index(&self, table_name: &str, index_name: &str, columns: &[&str]) -> Result<Arc<IndexInfo>> {
        let mut state = self.state.lock();
        let table_id = *state
            .tables_by_name
            .get(table_name)
            .ok_or_else(|| StorageError::not_found(EntityKind::Table, table_name))?;
        let table = state.tables_by_id[&table_id].clone();

        let duplicate = state
            .indexes_by_table
            .get(&table_id)
            .map(|ids| ids.iter().any(|id| state.indexes_by_id[id].name == index_name))
            .unwrap_or(false);
        if duplicate {
            return Err(StorageError::already_exists(EntityKind::Index, index_name));
        }

        let mut key_map = Vec::with_capacity(columns.len());
        for &col in columns {
            let idx = table
                .schema
                .index_of(col)
                .ok_or_else(|| StorageError::not_found(EntityKind::Column, col))?;
            key_map.push(idx as u32);
        }
        let key_schema = Arc::new(Schema::new(
            key_map.iter().map(|&i| table.schema.columns[i as usize].clone()).collect(),
        ));

        let index_id = state.next_index_id;
        state.next_index_id += 1;

        let (meta_page_id, meta_guard) = self.buffer_pool.new_page()?;
        let keys = KeyManager::new(key_schema.clone());
        let tree = BPlusTree::new(self.buffer_pool.clone(), keys);

        {
            let roots_guard = self.buffer_pool.fetch_page_mut(INDEX_ROOTS_PAGE_ID)?;
            let mut data = *roots_guard.read();
            IndexRootsPage::new(&mut data).insert(index_id, tree.root_page_id())?;
            *roots_guard.write() = data;
        }

        let meta = IndexMetaPage {
            index_id,
            table_id,
            name: index_name.to_string(),
            key_map: key_map.clone(),
        };
        let mut meta_data = *meta_guard.read();
        meta.write(&mut meta_data)?;
        *meta_guard.write() = meta_data;
        drop(meta_guard);

        let info = Arc::new(IndexInfo::new(
            index_id,
            index_name.to_string(),
            table_id,
            key_map,
            key_schema,
            table,
            tree,
            self.buffer_pool.clone(),
        ));
        state.indexes_by_id.insert(index_id, info.clone());
        state.indexes_by_table.entry(table_id).or_default().push(index_id);
        state.index_meta_pages.insert(index_id, meta_page_id);

        self.write_catalog_meta(&state)?;
        log::info!("created index '{index_name}' on table '{table_name}' (id {index_id})");
        Ok(info)
    }

    pub fn get_index(&self, table_name: &str, index_name: &str) -> Result<Arc<IndexInfo>> {
        let state = self.state.lock();
        let table_id = *state
            .tables_by_name
            .get(table_name)
            .ok_or_else(|| StorageError::not_found(EntityKind::Table, table_name))?;
        let ids = state.indexes_by_table.get(&table_id).cloned().unwrap_or_default();
        ids.into_iter()
            .find(|id| state.indexes_by_id[id].name == index_name)
            .map(|id| state.indexes_by_id[&id].clone())
            .ok_or_else(|| StorageError::not_found(EntityKind::Index, index_name))
    }

    pub fn get_table_indexes(&self, table_name: &str) -> Result<Vec<Arc<IndexInfo>>> {
        let state = self.state.lock();
        let table_id = *state
            .tables_by_name
            .get(table_name)
            .ok_or_else(|| StorageError::not_found(EntityKind::Table, table_name))?;
        Ok(state
            .indexes_by_table
            .get(&table_id)
            .map(|ids| ids.iter().map(|id| state.indexes_by_id[id].clone()).collect())
            .unwrap_or_default())
    }

    pub fn drop_index(&self, table_name: &str, index_name: &str) -> Result<()> {
        let mut state = self.state.lock();
        let table_id = *state
            .tables_by_name
            .get(table_name)
            .ok_or_else(|| StorageError::not_found(EntityKind::Table, table_name))?;
        let ids = state.indexes_by_table.get(&table_id).cloned().unwrap_or_default();
        let index_id = ids
            .into_iter()
            .find(|id| state.indexes_by_id[id].name == index_name)
            .ok_or_else(|| StorageError::not_found(EntityKind::Index, index_name))?;

        let info = state.indexes_by_id.remove(&index_id).expect("index_id came from indexes_by_id");
        info.tree.destroy()?;
        if let Some(ids_vec) = state.indexes_by_table.get_mut(&table_id) {
            ids_vec.retain(|&id| id != index_id);
        }
        if let Some(meta_page) = state.index_meta_pages.remove(&index_id) {
            self.buffer_pool.delete_page(meta_page)?;
        }
        {
            let guard = self.buffer_pool.fetch_page_mut(INDEX_ROOTS_PAGE_ID)?;
            let mut data = *guard.read();
            let _ = IndexRootsPage::new(&mut data).remove(index_id);
            *guard.write() = data;
        }

        self.write_catalog_meta(&state)?;
        log::info!("dropped index '{index_name}' on table '{table_name}'");
        Ok(())
    }

    pub fn table_count(&self) -> usize {
        self.state.lock().tables_by_id.len()
    }

    pub fn index_count(&self) -> usize {
        self.state.lock().indexes_by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolImpl;
    use crate::record::{Column, Field, FieldType, Row};
    use crate::storage::DiskManagerImpl;
    use tempfile::tempdir;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("a", FieldType::Int32, 0, false, true),
            Column::new_char("b", 8, 1, true, false),
        ])
    }

    #[test]
    fn create_table_then_get() {
        let dir = tempdir().unwrap();
        let dm = Arc::new(DiskManagerImpl::open(dir.path().join("t.db"), true).unwrap());
        let pool: Arc<dyn BufferPool> = Arc::new(BufferPoolImpl::new(dm, 16));
        let catalog = CatalogManager::create(pool).unwrap();

        catalog.create_table("t", schema()).unwrap();
        let table = catalog.get_table("t").unwrap();
        assert_eq!(table.schema.column_count(), 2);
        assert!(catalog.create_table("t", schema()).is_err());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");

        {
            let dm = Arc::new(DiskManagerImpl::open(&path, true).unwrap());
            let pool: Arc<dyn BufferPool> = Arc::new(BufferPoolImpl::new(dm, 16));
            let catalog = CatalogManager::create(pool.clone()).unwrap();
            catalog.create_table("t", schema()).unwrap();
            catalog.create_index("t", "i", &["b"]).unwrap();

            let table = catalog.get_table("t").unwrap();
            let index = catalog.get_index("t", "i").unwrap();
            let row = Row::new(vec![Field::Int32(1), Field::Char("hello".to_string())]);
            let mut buf = Vec::new();
            row.serialize_to(&table.schema, &mut buf).unwrap();
            let rid = table.heap.insert_tuple(&buf).unwrap();
            let key = index.encode_key(&row).unwrap();
            index.insert(&key, rid).unwrap();
            pool.flush_all().unwrap();
        }

        let dm = Arc::new(DiskManagerImpl::open(&path, false).unwrap());
        let pool: Arc<dyn BufferPool> = Arc::new(BufferPoolImpl::new(dm, 16));
        let catalog = CatalogManager::load(pool).unwrap();

        let table = catalog.get_table("t").unwrap();
        assert_eq!(table.schema.column_count(), 2);

        let index = catalog.get_index("t", "i").unwrap();
        let key = index
            .tree
            .keys()
            .encode(&Row::new(vec![Field::Char("hello".to_string())]));
        assert!(index.get_value(&key).unwrap().is_some());
    }
}
